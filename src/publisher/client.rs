//! Rate-limit aware page publishing
//!
//! Page creation is driven by a small state machine over classified provider responses.
//! Short rate-limit waits are slept through; long ones put the credential into cooldown
//! and the next attempt picks another. When every credential is cooling down a new
//! account is created and joins the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::PublisherConfig;
use crate::error::{EditError, PublishError, Result};
use crate::node::PageBlock;
use crate::retry::with_retry;

use super::credentials::{Credential, CredentialPool, CredentialStore};
use super::provider::{CreatedPage, ProviderError, PublishProvider};

/// A page that exists on the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedPage {
    /// Provider-side path, used for edits
    pub path: String,
    /// Public URL
    pub url: String,
    /// Title the page was created with
    pub title: String,
    /// Content as published
    pub content: Vec<PageBlock>,
    /// Credential that owns the page
    pub credential: Credential,
}

/// Progress of one page creation
#[derive(Debug)]
enum PublishState {
    /// Needs a credential
    Pending,
    /// Ready to call the provider with this credential
    Publishing(Credential),
    /// Waiting before the next attempt
    RateLimited(Instant),
    /// Gave up
    Exhausted(PublishError),
    /// Created
    Done(CreatedPage, Credential),
}

/// Publishes and edits pages through a shared credential pool
pub struct PublisherClient {
    provider: Arc<dyn PublishProvider>,
    store: Arc<dyn CredentialStore>,
    pool: CredentialPool,
    // serializes account creation so a burst of exhausted publishes creates one account
    account_gate: Mutex<()>,
    config: PublisherConfig,
}

impl PublisherClient {
    /// Create a client whose pool is seeded from the store and the configured credential
    pub async fn new(
        provider: Arc<dyn PublishProvider>,
        store: Arc<dyn CredentialStore>,
        config: PublisherConfig,
    ) -> Result<Self> {
        let mut credentials = store.load_all().await?;
        if let Some(secret) = config.initial_credential.as_deref().map(str::trim)
            && !secret.is_empty()
        {
            credentials.push(Credential::new(secret));
        }

        let client = Self::with_credentials(provider, store, config, credentials);
        info!(credentials = client.pool.len(), "publisher client ready");
        Ok(client)
    }

    /// Create a client with an explicit starting pool
    pub fn with_credentials(
        provider: Arc<dyn PublishProvider>,
        store: Arc<dyn CredentialStore>,
        config: PublisherConfig,
        credentials: Vec<Credential>,
    ) -> Self {
        Self {
            provider,
            store,
            pool: CredentialPool::new(credentials),
            account_gate: Mutex::new(()),
            config,
        }
    }

    /// The shared credential pool
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Create a page
    ///
    /// Fails with [`PublishError::CredentialExhausted`] when no credential is usable and a
    /// new account cannot be created, [`PublishError::Rejected`] when the provider refuses
    /// the content, and [`PublishError::RetriesExhausted`] when transient failures or rate
    /// limits use up the attempt budget.
    pub async fn create_page(
        &self,
        title: &str,
        content: Vec<PageBlock>,
    ) -> std::result::Result<PublishedPage, PublishError> {
        let mut state = PublishState::Pending;
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut last_error = String::new();

        loop {
            state = match state {
                PublishState::Pending if attempts >= self.config.max_attempts => {
                    PublishState::Exhausted(PublishError::RetriesExhausted {
                        attempts,
                        last_error: last_error.clone(),
                    })
                }
                PublishState::Pending => match self.acquire_credential().await {
                    Ok(credential) => PublishState::Publishing(credential),
                    Err(e) => PublishState::Exhausted(e),
                },
                PublishState::Publishing(credential) => {
                    attempts += 1;
                    match self.provider.create_page(&credential, title, &content).await {
                        Ok(created) => PublishState::Done(created, credential),
                        Err(ProviderError::RateLimited(wait)) => {
                            last_error = format!("rate limited for {}s", wait.as_secs());
                            self.on_rate_limited(&credential, wait, title)
                        }
                        Err(ProviderError::Rejected(reason)) => {
                            PublishState::Exhausted(PublishError::Rejected { reason })
                        }
                        Err(ProviderError::Transport(message)) => {
                            transient_failures += 1;
                            warn!(
                                title = %title,
                                credential = %credential,
                                attempt = attempts,
                                error = %message,
                                "page creation failed"
                            );
                            last_error = message;
                            if transient_failures > self.config.transient_retries {
                                PublishState::Exhausted(PublishError::RetriesExhausted {
                                    attempts,
                                    last_error: last_error.clone(),
                                })
                            } else {
                                PublishState::RateLimited(Instant::now() + self.config.transient_delay)
                            }
                        }
                    }
                }
                PublishState::RateLimited(until) => {
                    sleep_until(until).await;
                    PublishState::Pending
                }
                PublishState::Exhausted(e) => {
                    warn!(title = %title, attempts = attempts, error = %e, "page not published");
                    return Err(e);
                }
                PublishState::Done(created, credential) => {
                    debug!(title = %title, url = %created.url, credential = %credential, "page created");
                    return Ok(PublishedPage {
                        path: created.path,
                        url: created.url,
                        title: title.to_string(),
                        content,
                        credential,
                    });
                }
            };
        }
    }

    fn on_rate_limited(&self, credential: &Credential, wait: Duration, title: &str) -> PublishState {
        if wait < self.config.short_wait_threshold {
            debug!(
                title = %title,
                credential = %credential,
                wait_secs = wait.as_secs(),
                "short rate limit, waiting"
            );
            return PublishState::RateLimited(Instant::now() + wait + self.config.short_wait_margin);
        }

        let until = Instant::now() + wait + self.config.cooldown_margin;
        self.pool.record_cooldown(credential, until);
        warn!(
            title = %title,
            credential = %credential,
            wait_secs = wait.as_secs(),
            "credential cooling down, switching"
        );
        PublishState::Pending
    }

    /// A usable credential, creating a new account when every one is cooling down
    async fn acquire_credential(&self) -> std::result::Result<Credential, PublishError> {
        if let Some(credential) = self.pool.select(Instant::now()) {
            return Ok(credential);
        }

        let _gate = self.account_gate.lock().await;
        // another task may have created an account while this one waited
        if let Some(credential) = self.pool.select(Instant::now()) {
            return Ok(credential);
        }

        info!(pool_size = self.pool.len(), "no usable credential, creating account");
        let created =
            with_retry(&self.config.account_retry, || self.provider.create_account()).await;

        match created {
            Ok(credential) => {
                self.pool.add(credential.clone());
                if let Err(e) = self.store.append(&credential).await {
                    warn!(credential = %credential, error = %e, "failed to persist new credential");
                }
                info!(credential = %credential, pool_size = self.pool.len(), "account created");
                Ok(credential)
            }
            Err(e) => {
                error!(error = %e, "account creation failed");
                Err(PublishError::CredentialExhausted)
            }
        }
    }

    /// Replace a page's content using the credential that created it
    ///
    /// Waits for the owning credential's cooldown when it ends within
    /// `edit_max_cooldown_wait`; otherwise the edit is abandoned. A rate-limit response
    /// records a cooldown and abandons the edit.
    pub async fn edit_page(
        &self,
        path: &str,
        title: &str,
        content: &[PageBlock],
        credential: &Credential,
    ) -> std::result::Result<(), EditError> {
        if let Some(remaining) = self.pool.cooldown_remaining(credential, Instant::now()) {
            if remaining > self.config.edit_max_cooldown_wait {
                warn!(
                    path = %path,
                    credential = %credential,
                    remaining_secs = remaining.as_secs(),
                    "owning credential cooling down too long, skipping edit"
                );
                return Err(EditError::CooldownTooLong { remaining });
            }
            debug!(path = %path, remaining_secs = remaining.as_secs(), "waiting for owning credential");
            sleep(remaining).await;
        }

        let mut transient_failures = 0u32;
        loop {
            match self.provider.edit_page(credential, path, title, content).await {
                Ok(()) => {
                    debug!(path = %path, "page edited");
                    return Ok(());
                }
                Err(ProviderError::RateLimited(wait)) => {
                    self.pool
                        .record_cooldown(credential, Instant::now() + wait + self.config.cooldown_margin);
                    warn!(path = %path, credential = %credential, wait_secs = wait.as_secs(), "edit rate limited");
                    return Err(EditError::RateLimited { retry_after: wait });
                }
                Err(ProviderError::Transport(message))
                    if transient_failures < self.config.transient_retries =>
                {
                    transient_failures += 1;
                    debug!(path = %path, attempt = transient_failures, error = %message, "edit failed, retrying");
                    sleep(self.config.transient_delay).await;
                }
                Err(ProviderError::Transport(message)) | Err(ProviderError::Rejected(message)) => {
                    warn!(path = %path, error = %message, "edit failed");
                    return Err(EditError::Provider(message));
                }
            }
        }
    }
}
