//! Background book processing
//!
//! [`BookService`] runs one pipeline per submitted book on the tokio runtime. A user may
//! have only one book in flight; a second submission is rejected until the first
//! finishes, fails or is cancelled. Progress is broadcast as [`BookEvent`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bookmarks::{BookmarkInfo, BookmarkRegistrar};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extract::ImagePublisher;
use crate::pipeline::BookProcessor;
use crate::publisher::{PublisherClient, TelegraphImageUploader, TelegraphProvider};
use crate::types::{BookEvent, UserId};

/// How long shutdown waits for cancelled books to wind down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type InFlight = Arc<Mutex<HashMap<UserId, CancellationToken>>>;

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<UserId, CancellationToken>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a user's in-flight slot when the book's task ends, however it ends
struct InFlightGuard {
    user: UserId,
    in_flight: InFlight,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.user);
        debug!(user = %self.user, "released in-flight slot");
    }
}

/// Runs book pipelines in the background
pub struct BookService {
    processor: Arc<BookProcessor>,
    registrar: Arc<dyn BookmarkRegistrar>,
    in_flight: InFlight,
    concurrent_limit: Arc<Semaphore>,
    event_tx: broadcast::Sender<BookEvent>,
    accepting: AtomicBool,
}

impl BookService {
    /// Create a service around an existing processor
    pub fn new(
        config: &Config,
        processor: Arc<BookProcessor>,
        registrar: Arc<dyn BookmarkRegistrar>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(config.service.event_capacity.max(1));
        Self {
            processor,
            registrar,
            in_flight: Arc::default(),
            concurrent_limit: Arc::new(Semaphore::new(config.service.max_concurrent_books.max(1))),
            event_tx,
            accepting: AtomicBool::new(true),
        }
    }

    /// Build the full production stack from configuration
    ///
    /// Opens the database, seeds the credential pool from it and wires the Telegraph
    /// provider and image uploader.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let provider = Arc::new(TelegraphProvider::new(&config.publisher)?);
        let images: Arc<dyn ImagePublisher> =
            Arc::new(TelegraphImageUploader::new(&config.publisher)?);
        let publisher = Arc::new(
            PublisherClient::new(provider, db.clone(), config.publisher.clone()).await?,
        );
        let processor = Arc::new(BookProcessor::new(&config, publisher, images, db.clone()));

        Ok(Self::new(&config, processor, db))
    }

    /// Subscribe to book events
    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: BookEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Accept a book for background processing
    ///
    /// Returns immediately. Fails with [`Error::AlreadyProcessing`] when the user already
    /// has a book in flight and [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown).
    pub fn submit(&self, user: UserId, bytes: Vec<u8>, title_hint: impl Into<String>) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let title_hint = title_hint.into();
        let token = CancellationToken::new();
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.contains_key(&user) {
                info!(user = %user, "rejecting upload, book already in progress");
                return Err(Error::AlreadyProcessing { user_id: user.get() });
            }
            in_flight.insert(user, token.clone());
        }
        let guard = InFlightGuard {
            user,
            in_flight: self.in_flight.clone(),
        };

        info!(user = %user, title_hint = %title_hint, size = bytes.len(), "book accepted");
        self.emit(BookEvent::Accepted {
            user,
            title_hint: title_hint.clone(),
        });

        let processor = self.processor.clone();
        let limit = self.concurrent_limit.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let _guard = guard;

            let _permit = tokio::select! {
                _ = token.cancelled() => {
                    info!(user = %user, "book cancelled while queued");
                    let _ = event_tx.send(BookEvent::Cancelled { user });
                    return;
                }
                permit = limit.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let page_tx = event_tx.clone();
            let mut sequence = 0;
            let work = processor.process(bytes, &title_hint, move |page| {
                sequence += 1;
                let _ = page_tx.send(BookEvent::PagePublished {
                    user,
                    sequence,
                    url: page.url.clone(),
                });
            });

            let event = tokio::select! {
                _ = token.cancelled() => {
                    info!(user = %user, "book cancelled");
                    BookEvent::Cancelled { user }
                }
                result = work => match result {
                    Ok(book) => BookEvent::Completed {
                        user,
                        title: book.title,
                        page_urls: book.page_urls,
                        dropped_pages: book.dropped_pages,
                    },
                    Err(e) => {
                        warn!(user = %user, error = %e, "book failed");
                        BookEvent::Failed {
                            user,
                            code: e.error_code().to_string(),
                            error: e.to_string(),
                        }
                    }
                },
            };
            let _ = event_tx.send(event);
        });

        Ok(())
    }

    /// Cancel the user's book in flight; returns false when there is none
    pub fn cancel(&self, user: UserId) -> bool {
        match lock(&self.in_flight).get(&user) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether the user has a book in flight
    pub fn is_processing(&self, user: UserId) -> bool {
        lock(&self.in_flight).contains_key(&user)
    }

    /// Number of books in flight
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Resolve a bookmark token to the page it points at
    pub async fn resolve_bookmark(&self, token: &str) -> Result<Option<BookmarkInfo>> {
        self.registrar.resolve(token).await
    }

    /// Stop accepting books and cancel everything in flight
    ///
    /// Waits up to 30 seconds for the cancelled tasks to release their slots.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating shutdown");
        self.accepting.store(false, Ordering::SeqCst);

        for token in lock(&self.in_flight).values() {
            token.cancel();
        }

        let wait = async {
            while self.in_flight_count() > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await.is_err() {
            warn!(
                in_flight = self.in_flight_count(),
                "Timeout waiting for books to stop, proceeding with shutdown"
            );
        }

        info!("Shutdown complete");
        Ok(())
    }
}
