//! Page publishing against a rate-limited provider
//!
//! [`PublisherClient`] owns the process-wide [`CredentialPool`] and turns page drafts
//! into [`PublishedPage`]s through a [`PublishProvider`]. [`TelegraphProvider`] and
//! [`TelegraphImageUploader`] implement the provider and image collaborators over HTTP.

/// Rate-limit aware client
pub mod client;
/// Credentials, the credential pool and credential storage
pub mod credentials;
/// Provider interface and error classification
pub mod provider;
/// Telegraph HTTP implementations
pub mod telegraph;

pub use client::{PublishedPage, PublisherClient};
pub use credentials::{Credential, CredentialPool, CredentialStore};
pub use provider::{CreatedPage, ProviderError, PublishProvider};
pub use telegraph::{TelegraphImageUploader, TelegraphProvider};
