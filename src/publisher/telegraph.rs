//! Telegraph API provider and image uploader

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{PublisherConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::extract::ImagePublisher;
use crate::node::PageBlock;
use crate::retry::with_retry;

use super::credentials::Credential;
use super::provider::{CreatedPage, ProviderError, PublishProvider};

/// Wait assumed when a flood error carries no parsable duration
const DEFAULT_FLOOD_WAIT: Duration = Duration::from_secs(5);

/// Longest title the API accepts
const MAX_TITLE_CHARS: usize = 256;

#[allow(clippy::expect_used)]
static FLOOD_WAIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FLOOD_WAIT_(\d+)?").expect("flood wait pattern"));

/// Envelope of every API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResult {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    path: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct CreateAccountRequest<'a> {
    short_name: &'a str,
    author_name: &'a str,
}

#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    access_token: &'a str,
    title: &'a str,
    author_name: &'a str,
    content: &'a [PageBlock],
    return_content: bool,
}

/// Classify an API error string
pub fn classify_error(message: &str) -> ProviderError {
    match FLOOD_WAIT.captures(message) {
        Some(captures) => {
            let wait = captures
                .get(1)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FLOOD_WAIT);
            ProviderError::RateLimited(wait)
        }
        None => ProviderError::Rejected(message.to_string()),
    }
}

fn truncate_title(title: &str) -> &str {
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((idx, _)) => &title[..idx],
        None => title,
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("epub-publish/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}

/// Page provider backed by the Telegraph JSON API
pub struct TelegraphProvider {
    client: reqwest::Client,
    api_url: String,
    short_name: String,
    author_name: String,
}

impl TelegraphProvider {
    /// Create a provider from publisher settings
    pub fn new(config: &PublisherConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            short_name: config.short_name.clone(),
            author_name: config.author_name.clone(),
        })
    }

    async fn call<T, B>(&self, method: &str, body: &B) -> std::result::Result<T, ProviderError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.api_url, method);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Transport(format!("{method}: HTTP {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(DEFAULT_FLOOD_WAIT));
        }

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            if status.is_success() {
                ProviderError::Transport(format!("{method}: unreadable response: {e}"))
            } else {
                ProviderError::Rejected(format!("{method}: HTTP {status}"))
            }
        })?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { ok: true, .. } => Err(ProviderError::Transport(format!(
                "{method}: response without result"
            ))),
            ApiResponse { error, .. } => {
                let message = error.unwrap_or_else(|| "unknown error".to_string());
                debug!(method = %method, error = %message, "provider returned error");
                Err(classify_error(&message))
            }
        }
    }
}

#[async_trait]
impl PublishProvider for TelegraphProvider {
    async fn create_account(&self) -> std::result::Result<Credential, ProviderError> {
        let account: AccountResult = self
            .call(
                "createAccount",
                &CreateAccountRequest {
                    short_name: &self.short_name,
                    author_name: &self.author_name,
                },
            )
            .await?;
        Ok(Credential::new(account.access_token))
    }

    async fn create_page(
        &self,
        credential: &Credential,
        title: &str,
        content: &[PageBlock],
    ) -> std::result::Result<CreatedPage, ProviderError> {
        let page: PageResult = self
            .call(
                "createPage",
                &PageRequest {
                    access_token: credential.secret(),
                    title: truncate_title(title),
                    author_name: &self.author_name,
                    content,
                    return_content: false,
                },
            )
            .await?;
        Ok(CreatedPage {
            path: page.path,
            url: page.url,
        })
    }

    async fn edit_page(
        &self,
        credential: &Credential,
        path: &str,
        title: &str,
        content: &[PageBlock],
    ) -> std::result::Result<(), ProviderError> {
        let method = format!("editPage/{path}");
        let _: PageResult = self
            .call(
                &method,
                &PageRequest {
                    access_token: credential.secret(),
                    title: truncate_title(title),
                    author_name: &self.author_name,
                    content,
                    return_content: false,
                },
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadResponse {
    Files(Vec<UploadedFile>),
    Failure { error: String },
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    src: String,
}

/// Image host backed by the Telegraph upload endpoint
pub struct TelegraphImageUploader {
    client: reqwest::Client,
    upload_url: Url,
    retry: RetryConfig,
}

impl TelegraphImageUploader {
    /// Create an uploader from publisher settings
    pub fn new(config: &PublisherConfig) -> Result<Self> {
        let upload_url = Url::parse(&config.upload_url).map_err(|e| Error::Config {
            message: format!("invalid upload_url: {e}"),
            key: Some("publisher.upload_url".to_string()),
        })?;
        Ok(Self {
            client: http_client(config.request_timeout)?,
            upload_url,
            retry: config.account_retry.clone(),
        })
    }

    async fn try_upload(&self, data: Vec<u8>, content_type: &str) -> Result<String> {
        let part = Part::bytes(data)
            .file_name("file")
            .mime_str(content_type)
            .map_err(|e| Error::ImageUpload(format!("invalid content type {content_type}: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ImageUpload(format!("upload returned HTTP {}", status.as_u16())));
        }

        match response.json::<UploadResponse>().await? {
            UploadResponse::Files(files) => {
                let src = files
                    .into_iter()
                    .next()
                    .map(|f| f.src)
                    .ok_or_else(|| Error::ImageUpload("upload returned no files".to_string()))?;
                self.upload_url
                    .join(&src)
                    .map(String::from)
                    .map_err(|e| Error::ImageUpload(format!("invalid image path {src}: {e}")))
            }
            UploadResponse::Failure { error } => Err(Error::ImageUpload(error)),
        }
    }
}

#[async_trait]
impl ImagePublisher for TelegraphImageUploader {
    async fn upload(&self, data: Vec<u8>, content_type: &str) -> Result<String> {
        with_retry(&self.retry, || self.try_upload(data.clone(), content_type)).await
    }
}
