//! # epub-publish
//!
//! Turns uploaded EPUB books into sequences of linked pages on a rate-limited hosting provider.
//!
//! ## Design Philosophy
//!
//! epub-publish is designed to be:
//! - **Resilient** - Corrupted archives are salvaged, broken chapters are skipped, pages that
//!   cannot be published leave a gap instead of failing the book
//! - **Rate-limit aware** - A shared pool of provider credentials absorbs short waits and rotates
//!   away from long cooldowns
//! - **Library-first** - No chat transport or HTTP routes, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to book events, no polling required
//!
//! ## Pipeline
//!
//! [`archive`] → [`extract`] (per chapter) → [`paginate`] (across chapters) →
//! [`publisher`] (per closed page) → [`linker`] (footer back-patch of the previous page).
//!
//! ## Quick Start
//!
//! ```no_run
//! use epub_publish::{BookService, Config, UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = BookService::from_config(Config::default()).await?;
//!
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let bytes = std::fs::read("book.epub")?;
//!     service.submit(UserId::new(42), bytes, "book.epub")?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// EPUB loading and salvage of corrupted archives
pub mod archive;
/// Bookmark tokens and the registrar collaborator
pub mod bookmarks;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Chapter content extraction
pub mod extract;
/// Footer back-patching between consecutive pages
pub mod linker;
/// Content node tree shared by extraction, pagination and publishing
pub mod node;
/// Cross-chapter pagination
pub mod paginate;
/// Book processing pipeline
pub mod pipeline;
/// Rate-limit aware publishing client
pub mod publisher;
/// Retry logic with exponential backoff
pub mod retry;
/// Background book processing service
pub mod service;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use archive::{Archive, ContentResource};
pub use bookmarks::{BookmarkInfo, BookmarkRegistrar};
pub use config::Config;
pub use db::Database;
pub use error::{
    DatabaseError, EditError, Error, ParseError, PublishError, ResourceError, Result,
};
pub use extract::{Extractor, ImagePublisher};
pub use node::{Element, Node, PageBlock};
pub use paginate::{PageDraft, Paginator, paginate};
pub use pipeline::{BookProcessor, PublishedBook};
pub use publisher::{
    Credential, CredentialStore, PublishProvider, PublishedPage, PublisherClient,
    TelegraphImageUploader, TelegraphProvider,
};
pub use service::BookService;
pub use types::{BookEvent, UserId};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use epub_publish::{BookService, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = BookService::from_config(Config::default()).await?;
///
///     // hand `service` submissions from the chat transport here
///
///     run_with_shutdown(service).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: BookService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
