//! Chapter image rehosting
//!
//! Images referenced by archive-relative paths are uploaded through an [`ImagePublisher`]
//! and their `src` rewritten to the returned URL. Absolute web references are left as
//! they are. An image that cannot be resolved or uploaded is removed from the chapter.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::archive::{resolve_path, Archive};
use crate::error::Result;

use super::dom::{Dom, NodeId};

/// Content type assumed when the manifest declares none
pub const FALLBACK_IMAGE_TYPE: &str = "image/jpeg";

/// Hosts image bytes and returns a public URL
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    /// Upload `data` and return the hosted URL
    async fn upload(&self, data: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Per-book map from resolved archive path to hosted URL
///
/// Shared by every chapter of one book so an image is uploaded at most once.
#[derive(Debug, Default)]
pub struct ImageCache {
    urls: HashMap<String, String>,
}

impl ImageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosted URL for an archive path
    pub fn get(&self, path: &str) -> Option<&str> {
        self.urls.get(path).map(String::as_str)
    }

    /// Record a hosted URL
    pub fn insert(&mut self, path: String, url: String) {
        self.urls.insert(path, url);
    }

    /// Number of cached images
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether nothing has been uploaded yet
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Outcome counts of one chapter's image pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    /// Images uploaded during this pass
    pub uploaded: usize,
    /// Images served from the cache
    pub cached: usize,
    /// Images removed because they could not be resolved or uploaded
    pub removed: usize,
}

/// Whether an image reference already points at the web
pub fn is_remote(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Rehost every `img` beneath `scope`
pub async fn rehost_images(
    dom: &mut Dom,
    scope: NodeId,
    archive: &Archive,
    chapter_path: &str,
    publisher: &dyn ImagePublisher,
    cache: &mut ImageCache,
) -> ImageStats {
    let mut stats = ImageStats::default();

    for img in dom.elements_by_tag(scope, "img") {
        let src = dom.attr(img, "src").unwrap_or_default().trim().to_string();
        if is_remote(&src) {
            continue;
        }

        let Some(path) = (!src.is_empty())
            .then(|| resolve_path(chapter_path, &src))
            .flatten()
        else {
            debug!(chapter = %chapter_path, src = %src, "removing image without a local source");
            dom.detach(img);
            stats.removed += 1;
            continue;
        };

        if let Some(url) = cache.get(&path) {
            let url = url.to_string();
            dom.set_attr(img, "src", &url);
            stats.cached += 1;
            continue;
        }

        let Some(resource) = archive.resource(&path) else {
            debug!(chapter = %chapter_path, path = %path, "removing image missing from archive");
            dom.detach(img);
            stats.removed += 1;
            continue;
        };

        let content_type = if resource.media_type.is_empty() {
            FALLBACK_IMAGE_TYPE
        } else {
            resource.media_type.as_str()
        };

        match publisher.upload(resource.data.clone(), content_type).await {
            Ok(url) => {
                debug!(path = %path, url = %url, "image uploaded");
                dom.set_attr(img, "src", &url);
                cache.insert(path, url);
                stats.uploaded += 1;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "image upload failed, removing image");
                dom.detach(img);
                stats.removed += 1;
            }
        }
    }

    stats
}
