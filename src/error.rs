//! Error types for epub-publish
//!
//! This module provides the error taxonomy of the publishing pipeline:
//! - [`ParseError`]: the archive is unreadable even after salvage (book aborts)
//! - [`ResourceError`]: one chapter could not be extracted (chapter skipped)
//! - [`PublishError`]: a page could not be created (page dropped)
//! - [`EditError`]: a footer back-patch was abandoned (page keeps its old content)
//!
//! Book-level failures are surfaced to the caller; chapter, page, and footer failures are
//! recovered locally by the pipeline and only logged.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for epub-publish operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for epub-publish
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chars_per_page")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Archive could not be parsed, even after salvage
    #[error("archive error: {0}")]
    Parse(#[from] ParseError),

    /// A single chapter failed extraction
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// A page could not be published
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// A published page could not be edited
    #[error("edit error: {0}")]
    Edit(#[from] EditError),

    /// Image upload failed
    #[error("image upload failed: {0}")]
    ImageUpload(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The user already has a book being processed
    #[error("user {user_id} already has a book in progress")]
    AlreadyProcessing {
        /// The user whose upload was rejected
        user_id: i64,
    },

    /// Shutdown in progress - not accepting new books
    #[error("shutdown in progress: not accepting new books")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Archive-level parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not a readable zip package
    #[error("not a readable package: {0}")]
    Unreadable(String),

    /// No OPF package document could be located
    #[error("package document not found")]
    MissingPackageDocument,

    /// The package document exists but is malformed
    #[error("invalid package document {path}: {reason}")]
    InvalidPackageDocument {
        /// Archive path of the package document
        path: String,
        /// The reason parsing failed
        reason: String,
    },

    /// An archive entry could not be read during the primary parse
    #[error("entry {path} is unreadable: {reason}")]
    EntryUnreadable {
        /// Archive path of the entry
        path: String,
        /// The underlying read failure
        reason: String,
    },

    /// Salvage produced nothing parseable
    #[error("salvage failed: {reason}")]
    SalvageFailed {
        /// Why the reassembled package could not be used
        reason: String,
    },
}

/// Per-chapter extraction errors
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The chapter is listed in the package but its bytes are absent
    #[error("resource {path} is missing from the archive")]
    Missing {
        /// Archive path of the resource
        path: String,
    },

    /// The chapter is not a markup document
    #[error("resource {path} has non-markup media type {media_type}")]
    NotMarkup {
        /// Archive path of the resource
        path: String,
        /// The declared media type
        media_type: String,
    },
}

/// Page creation errors
#[derive(Debug, Error)]
pub enum PublishError {
    /// No credential is usable and creating a new account failed
    #[error("no usable credential: every account is cooling down and account creation failed")]
    CredentialExhausted,

    /// The provider rejected the page permanently
    #[error("provider rejected the page: {reason}")]
    Rejected {
        /// The provider's error message
        reason: String,
    },

    /// Transient failures or rate limits exhausted the retry budget
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of provider calls made
        attempts: u32,
        /// The last failure observed
        last_error: String,
    },
}

/// Footer back-patch errors
#[derive(Debug, Error)]
pub enum EditError {
    /// The owning credential is cooling down for longer than the edit is willing to wait
    #[error("owning credential cools down for another {remaining:?}")]
    CooldownTooLong {
        /// Remaining cooldown at the time the edit was abandoned
        remaining: Duration,
    },

    /// The provider rate-limited the edit; cooldown was recorded
    #[error("edit rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Wait requested by the provider
        retry_after: Duration,
    },

    /// The provider refused the edit or the request failed
    #[error("edit failed: {0}")]
    Provider(String),
}

impl Error {
    /// Machine-readable error code, suitable for event payloads
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Parse(_) => "parse_error",
            Error::Resource(_) => "resource_error",
            Error::Publish(PublishError::CredentialExhausted) => "credential_exhausted",
            Error::Publish(_) => "publish_error",
            Error::Edit(_) => "edit_error",
            Error::ImageUpload(_) => "image_upload_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::AlreadyProcessing { .. } => "already_processing",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_exhausted_has_its_own_code() {
        let err = Error::Publish(PublishError::CredentialExhausted);
        assert_eq!(err.error_code(), "credential_exhausted");

        let other = Error::Publish(PublishError::Rejected {
            reason: "CONTENT_TOO_BIG".into(),
        });
        assert_eq!(other.error_code(), "publish_error");
    }

    #[test]
    fn parse_error_converts_into_error() {
        let err: Error = ParseError::MissingPackageDocument.into();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.error_code(), "parse_error");
        assert_eq!(
            err.to_string(),
            "archive error: package document not found"
        );
    }

    #[test]
    fn already_processing_message_names_user() {
        let err = Error::AlreadyProcessing { user_id: 42 };
        assert_eq!(err.to_string(), "user 42 already has a book in progress");
        assert_eq!(err.error_code(), "already_processing");
    }

    #[test]
    fn edit_error_messages_include_durations() {
        let err = EditError::RateLimited {
            retry_after: Duration::from_secs(7),
        };
        assert_eq!(err.to_string(), "edit rate limited, retry after 7s");
    }

    #[test]
    fn retries_exhausted_reports_attempts() {
        let err = PublishError::RetriesExhausted {
            attempts: 4,
            last_error: "connection reset".into(),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 4 attempts: connection reset"
        );
    }
}
