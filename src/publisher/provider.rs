//! Remote publishing provider interface

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::node::PageBlock;
use crate::retry::IsRetryable;

use super::credentials::Credential;

/// A page as created by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedPage {
    /// Provider-side page path, used for edits
    pub path: String,
    /// Public URL of the page
    pub url: String,
}

/// Classified provider failure
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The credential is rate limited; the provider asks to wait this long
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    /// The request was refused and will not succeed on retry
    #[error("rejected: {0}")]
    Rejected(String),

    /// The request did not complete (network failure, server error)
    #[error("transport failure: {0}")]
    Transport(String),
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        // rate limits carry their own wait and are handled by the caller
        matches!(self, ProviderError::Transport(_))
    }
}

/// Remote page-hosting provider
#[async_trait]
pub trait PublishProvider: Send + Sync {
    /// Create a new account and return its credential
    async fn create_account(&self) -> Result<Credential, ProviderError>;

    /// Create a page owned by `credential`
    async fn create_page(
        &self,
        credential: &Credential,
        title: &str,
        content: &[PageBlock],
    ) -> Result<CreatedPage, ProviderError>;

    /// Replace the content of a page owned by `credential`
    async fn edit_page(
        &self,
        credential: &Credential,
        path: &str,
        title: &str,
        content: &[PageBlock],
    ) -> Result<(), ProviderError>;
}
