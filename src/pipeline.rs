//! Book processing pipeline
//!
//! Load → extract each chapter → paginate across chapters → publish each closed page →
//! back-patch the previous page's footer. Chapters are processed strictly in reading order.
//! A chapter that cannot be extracted is skipped and a page that cannot be published is
//! dropped; only an unreadable archive fails the book.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::bookmarks::BookmarkRegistrar;
use crate::config::{Config, PaginationConfig};
use crate::error::{Error, Result};
use crate::extract::{Extractor, ImageCache, ImagePublisher};
use crate::linker::{LinkedPage, PageLinker};
use crate::paginate::{PageDraft, Paginator};
use crate::publisher::{PublishedPage, PublisherClient};

/// Outcome of processing one book
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishedBook {
    /// Book title
    pub title: String,
    /// URLs of the published pages in reading order
    pub page_urls: Vec<String>,
    /// Pages that could not be published
    pub dropped_pages: usize,
    /// Pages whose footer could not be added
    pub links_failed: usize,
    /// Chapters skipped because they could not be extracted
    pub skipped_chapters: usize,
    /// Whether the archive had to be salvaged
    pub salvaged: bool,
}

/// Title of the page with the given sequence number
pub fn page_title(book_title: &str, sequence: u32, is_last: bool) -> String {
    if is_last {
        format!("{book_title} ({sequence}) - End")
    } else {
        format!("{book_title} ({sequence})")
    }
}

/// Runs the pipeline for one book at a time; shareable across tasks
pub struct BookProcessor {
    extractor: Extractor,
    pagination: PaginationConfig,
    publisher: Arc<PublisherClient>,
    images: Arc<dyn ImagePublisher>,
    linker: PageLinker,
}

/// Mutable state of one book run
struct BookRun {
    title: String,
    previous: Option<LinkedPage>,
    result: PublishedBook,
}

impl BookProcessor {
    /// Create a processor from configuration and collaborators
    pub fn new(
        config: &Config,
        publisher: Arc<PublisherClient>,
        images: Arc<dyn ImagePublisher>,
        registrar: Arc<dyn BookmarkRegistrar>,
    ) -> Self {
        Self {
            extractor: Extractor::new(&config.extraction),
            pagination: config.pagination.clone(),
            linker: PageLinker::new(publisher.clone(), registrar, config.linker.clone()),
            publisher,
            images,
        }
    }

    /// Process an uploaded archive and return the published page URLs in order
    ///
    /// An empty list means nothing could be published; a short list means some chapters
    /// or pages were dropped (each logged with its cause).
    pub async fn process_archive(&self, bytes: Vec<u8>, title_hint: &str) -> Result<Vec<String>> {
        Ok(self.process(bytes, title_hint, |_| {}).await?.page_urls)
    }

    /// Process an archive, calling `on_page` after each page is published
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the archive cannot be read even after salvage.
    pub async fn process<F>(&self, bytes: Vec<u8>, title_hint: &str, mut on_page: F) -> Result<PublishedBook>
    where
        F: FnMut(&PublishedPage) + Send,
    {
        let hint = title_hint.to_string();
        let archive = tokio::task::spawn_blocking(move || Archive::load(bytes, &hint))
            .await
            .map_err(|e| Error::Other(format!("archive loading task failed: {}", e)))??;

        let title = archive.title();
        info!(
            title = %title,
            chapters = archive.chapter_count(),
            salvaged = archive.was_salvaged(),
            "processing book"
        );

        let mut run = BookRun {
            title: title.clone(),
            previous: None,
            result: PublishedBook {
                title,
                salvaged: archive.was_salvaged(),
                ..Default::default()
            },
        };
        let mut paginator = Paginator::new(&self.pagination);
        let mut cache = ImageCache::new();

        for chapter in archive.chapters() {
            let chapter = match chapter {
                Ok(chapter) => chapter,
                Err(e) => {
                    warn!(title = %run.title, error = %e, "skipping chapter");
                    run.result.skipped_chapters += 1;
                    continue;
                }
            };

            let blocks = self
                .extractor
                .extract(&archive, chapter, self.images.as_ref(), &mut cache)
                .await;
            for block in blocks {
                if let Some(draft) = paginator.push(block) {
                    self.publish_draft(&mut run, draft, &mut on_page).await;
                }
            }
        }

        if let Some(draft) = paginator.finish() {
            self.publish_draft(&mut run, draft, &mut on_page).await;
        }

        // the last page that made it gets the end-of-book footer
        if let Some(last) = run.previous.take()
            && let Err(e) = self.linker.link(&last, None).await
        {
            debug!(url = %last.page.url, error = %e, "last page left without end footer");
            run.result.links_failed += 1;
        }

        let result = run.result;
        info!(
            title = %result.title,
            pages = result.page_urls.len(),
            dropped_pages = result.dropped_pages,
            links_failed = result.links_failed,
            skipped_chapters = result.skipped_chapters,
            images = cache.len(),
            "book processed"
        );
        Ok(result)
    }

    async fn publish_draft<F>(&self, run: &mut BookRun, draft: PageDraft, on_page: &mut F)
    where
        F: FnMut(&PublishedPage) + Send,
    {
        let title = page_title(&run.title, draft.sequence, draft.is_last);
        let page = match self.publisher.create_page(&title, draft.blocks).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    page_title = %title,
                    sequence = draft.sequence,
                    error = %e,
                    "dropping page"
                );
                run.result.dropped_pages += 1;
                return;
            }
        };

        on_page(&page);
        run.result.page_urls.push(page.url.clone());
        let linked = self.linker.register(&run.title, page).await;

        if let Some(previous) = run.previous.replace(linked)
            && let Some(current) = &run.previous
            && let Err(e) = self.linker.link(&previous, Some(&current.page.url)).await
        {
            debug!(url = %previous.page.url, error = %e, "page left without next link");
            run.result.links_failed += 1;
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_titles() {
        assert_eq!(page_title("Moby Dick", 3, false), "Moby Dick (3)");
        assert_eq!(page_title("Moby Dick", 12, true), "Moby Dick (12) - End");
    }
}
