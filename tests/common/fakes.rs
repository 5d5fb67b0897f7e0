//! In-process collaborators standing in for the hosting provider, image host, registrar
//! and credential store

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use epub_publish::bookmarks::{BookmarkInfo, BookmarkRegistrar};
use epub_publish::config::{Config, PaginationConfig};
use epub_publish::error::{Error, Result};
use epub_publish::extract::ImagePublisher;
use epub_publish::publisher::{
    CreatedPage, Credential, CredentialStore, ProviderError, PublishProvider, PublisherClient,
};
use epub_publish::{BookProcessor, PageBlock};
use tokio::sync::Semaphore;

/// A page as the fake provider holds it
#[derive(Clone, Debug)]
pub struct HostedPage {
    pub path: String,
    pub title: String,
    pub content: Vec<PageBlock>,
    pub owner: Credential,
}

/// Hosting provider keeping pages in memory
#[derive(Default)]
pub struct FakeProvider {
    pages: Mutex<Vec<HostedPage>>,
    /// 1-based create calls that are rejected
    reject_calls: Mutex<HashSet<usize>>,
    create_calls: Mutex<usize>,
    /// Paths whose edits are rejected
    reject_edits: Mutex<HashSet<String>>,
    edits: Mutex<Vec<String>>,
    accounts: Mutex<usize>,
    /// When set, every create call waits for a permit
    gate: Option<Arc<Semaphore>>,
}

impl FakeProvider {
    /// Provider whose create calls block until permits are added to the returned gate
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let provider = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (provider, gate)
    }

    /// Reject the n-th create call (1-based)
    pub fn reject_call(&self, n: usize) {
        self.reject_calls.lock().unwrap().insert(n);
    }

    /// Reject every edit of the page at `path`
    pub fn reject_edit(&self, path: &str) {
        self.reject_edits.lock().unwrap().insert(path.to_string());
    }

    /// Pages in creation order
    pub fn pages(&self) -> Vec<HostedPage> {
        self.pages.lock().unwrap().clone()
    }

    /// Page by public URL
    pub fn page_by_url(&self, url: &str) -> Option<HostedPage> {
        self.pages()
            .into_iter()
            .find(|p| url.ends_with(&format!("/{}", p.path)))
    }

    /// Paths of edited pages in edit order
    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }

    /// Number of accounts created
    pub fn accounts_created(&self) -> usize {
        *self.accounts.lock().unwrap()
    }
}

#[async_trait]
impl PublishProvider for FakeProvider {
    async fn create_account(&self) -> std::result::Result<Credential, ProviderError> {
        let mut accounts = self.accounts.lock().unwrap();
        *accounts += 1;
        Ok(Credential::new(format!("account-{}", *accounts)))
    }

    async fn create_page(
        &self,
        credential: &Credential,
        title: &str,
        content: &[PageBlock],
    ) -> std::result::Result<CreatedPage, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?
                .forget();
        }
        let call = {
            let mut calls = self.create_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.reject_calls.lock().unwrap().contains(&call) {
            return Err(ProviderError::Rejected("CONTENT_TOO_BIG".to_string()));
        }

        let path = format!("page-{call}");
        self.pages.lock().unwrap().push(HostedPage {
            path: path.clone(),
            title: title.to_string(),
            content: content.to_vec(),
            owner: credential.clone(),
        });
        Ok(CreatedPage {
            url: format!("https://pages.test/{path}"),
            path,
        })
    }

    async fn edit_page(
        &self,
        credential: &Credential,
        path: &str,
        title: &str,
        content: &[PageBlock],
    ) -> std::result::Result<(), ProviderError> {
        if self.reject_edits.lock().unwrap().contains(path) {
            return Err(ProviderError::Rejected("PAGE_SAVE_FAILED".to_string()));
        }
        let mut pages = self.pages.lock().unwrap();
        let page = pages
            .iter_mut()
            .find(|p| p.path == path)
            .ok_or_else(|| ProviderError::Rejected("PAGE_NOT_FOUND".to_string()))?;
        if &page.owner != credential {
            return Err(ProviderError::Rejected("PAGE_ACCESS_DENIED".to_string()));
        }
        page.title = title.to_string();
        page.content = content.to_vec();
        self.edits.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// Image host counting uploads
#[derive(Default)]
pub struct FakeImages {
    uploads: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeImages {
    /// Image host whose every upload fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Content types of the uploads made
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImagePublisher for FakeImages {
    async fn upload(&self, _data: Vec<u8>, content_type: &str) -> Result<String> {
        if self.fail {
            return Err(Error::ImageUpload("upload refused".to_string()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(content_type.to_string());
        Ok(format!("https://img.test/{}", uploads.len()))
    }
}

/// Registrar issuing sequential tokens
#[derive(Default)]
pub struct FakeRegistrar {
    tokens: Mutex<HashMap<String, BookmarkInfo>>,
}

impl FakeRegistrar {
    /// Number of tokens issued
    pub fn issued(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl BookmarkRegistrar for FakeRegistrar {
    async fn issue_token(&self, book_name: &str, page_title: &str, url: &str) -> Result<String> {
        let mut tokens = self.tokens.lock().unwrap();
        let token = format!("bm_{:08x}", tokens.len() + 1);
        tokens.insert(
            token.clone(),
            BookmarkInfo {
                book_name: book_name.to_string(),
                page_title: page_title.to_string(),
                url: url.to_string(),
            },
        );
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<BookmarkInfo>> {
        Ok(self.tokens.lock().unwrap().get(token).cloned())
    }
}

/// Credential store that keeps nothing
#[derive(Default)]
pub struct NullStore;

#[async_trait]
impl CredentialStore for NullStore {
    async fn load_all(&self) -> Result<Vec<Credential>> {
        Ok(Vec::new())
    }

    async fn append(&self, _credential: &Credential) -> Result<()> {
        Ok(())
    }
}

/// Configuration with a small page budget
pub fn test_config() -> Config {
    Config {
        pagination: PaginationConfig {
            chars_per_page: 100,
            min_page_chars: 50,
        },
        ..Default::default()
    }
}

/// Collaborators of one processor under test
pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub images: Arc<FakeImages>,
    pub registrar: Arc<FakeRegistrar>,
    pub processor: Arc<BookProcessor>,
}

impl Harness {
    /// Processor over fresh fakes with one starting credential
    pub fn new(config: &Config) -> Self {
        Self::with_images(config, FakeImages::default())
    }

    /// Processor over fresh fakes using the given image host
    pub fn with_images(config: &Config, images: FakeImages) -> Self {
        Self::build(config, FakeProvider::default(), images)
    }

    /// Processor over the given provider
    pub fn with_provider(config: &Config, provider: FakeProvider) -> Self {
        Self::build(config, provider, FakeImages::default())
    }

    fn build(config: &Config, provider: FakeProvider, images: FakeImages) -> Self {
        let provider = Arc::new(provider);
        let images = Arc::new(images);
        let registrar = Arc::new(FakeRegistrar::default());
        let publisher = Arc::new(PublisherClient::with_credentials(
            provider.clone(),
            Arc::new(NullStore),
            config.publisher.clone(),
            vec![Credential::new("seed-credential")],
        ));
        let processor = Arc::new(BookProcessor::new(
            config,
            publisher,
            images.clone(),
            registrar.clone(),
        ));

        Self {
            provider,
            images,
            registrar,
            processor,
        }
    }
}
