//! Chapter content extraction
//!
//! Turns one chapter's markup into an ordered list of [`PageBlock`]s: non-content markup
//! is stripped, footnotes are inlined, internal links dissolved, images rehosted, and the
//! remaining tree flattened into provider-renderable blocks.

/// Arena DOM and the html5ever tree sink
pub mod dom;
/// Footnote detection strategies and inlining
pub mod footnotes;
/// Page-block flattening
pub mod flatten;
/// Image rehosting
pub mod images;
/// Text normalization
pub mod text;

use tracing::debug;

use crate::archive::{Archive, ContentResource};
use crate::config::ExtractionConfig;
use crate::node::PageBlock;

pub use dom::{Dom, NodeData, NodeId};
pub use footnotes::{FootnoteInliner, FootnoteStrategy, NoteMatch};
pub use images::{ImageCache, ImagePublisher, ImageStats};

/// Elements that never contribute visible content
const NON_CONTENT_TAGS: &[&str] = &[
    "head", "title", "script", "style", "meta", "link", "iframe", "frame", "frameset",
    "noscript", "template", "object", "embed",
];

/// Chapter extractor
pub struct Extractor {
    footnotes: FootnoteInliner,
}

impl Extractor {
    /// Create an extractor with the default footnote strategies
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            footnotes: FootnoteInliner::new(config),
        }
    }

    /// Create an extractor with a custom footnote inliner
    pub fn with_footnotes(footnotes: FootnoteInliner) -> Self {
        Self { footnotes }
    }

    /// Extract the page blocks of one chapter
    ///
    /// Images are uploaded through `images` and remembered in `cache` so a picture shared
    /// by several chapters is uploaded once. A chapter with no visible text and no images
    /// yields no blocks.
    pub async fn extract(
        &self,
        archive: &Archive,
        chapter: &ContentResource,
        images: &dyn ImagePublisher,
        cache: &mut ImageCache,
    ) -> Vec<PageBlock> {
        let mut dom = Dom::parse(&chapter.data);
        let body = dom.body();

        strip_non_content(&mut dom, body);
        normalize_svg_images(&mut dom, body);

        if !has_visible_content(&dom, body) {
            debug!(chapter = %chapter.path, "chapter has no visible content");
            return Vec::new();
        }

        let notes = self.footnotes.inline(&mut dom, body);
        dissolve_internal_links(&mut dom, body);
        let stats =
            images::rehost_images(&mut dom, body, archive, &chapter.path, images, cache).await;

        let blocks = flatten::flatten(&dom, body);
        debug!(
            chapter = %chapter.path,
            blocks = blocks.len(),
            footnotes = notes,
            images_uploaded = stats.uploaded,
            images_cached = stats.cached,
            images_removed = stats.removed,
            "extracted chapter"
        );
        blocks
    }
}

fn strip_non_content(dom: &mut Dom, scope: NodeId) {
    for &tag in NON_CONTENT_TAGS {
        for id in dom.elements_by_tag(scope, tag) {
            dom.detach(id);
        }
    }
}

/// Replace an `svg` wrapping a raster `image` with a plain `img`
fn normalize_svg_images(dom: &mut Dom, scope: NodeId) {
    for svg in dom.elements_by_tag(scope, "svg") {
        let href = dom.elements_by_tag(svg, "image").into_iter().find_map(|image| {
            dom.attr(image, "xlink:href")
                .or_else(|| dom.attr(image, "href"))
                .map(str::to_string)
        });
        if let Some(href) = href {
            let img = dom.create_element("img", vec![("src".to_string(), href)]);
            dom.replace(svg, img);
        }
    }
}

/// Whether a chapter has any non-whitespace text or any image
fn has_visible_content(dom: &Dom, scope: NodeId) -> bool {
    dom.descendants(scope).into_iter().any(|id| match dom.data(id) {
        NodeData::Text(text) => !text.trim().is_empty(),
        NodeData::Element { name, .. } => matches!(name.as_str(), "img" | "svg" | "image"),
        _ => false,
    })
}

fn is_external_link(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("mailto:")
}

/// Replace links into the book itself with their content
fn dissolve_internal_links(dom: &mut Dom, scope: NodeId) {
    for anchor in dom.elements_by_tag(scope, "a") {
        let external = dom.attr(anchor, "href").is_some_and(is_external_link);
        if !external {
            dom.unwrap(anchor);
        }
    }
}
