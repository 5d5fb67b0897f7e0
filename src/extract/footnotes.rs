//! Footnote inlining
//!
//! Footnote references are detected by an ordered list of independent strategies. The
//! first strategy that recognizes an anchor supplies the note text (and, for fragment
//! references, the target element to remove); the anchor is then replaced by an inline
//! "(label: text)" text node.

use tracing::debug;

use crate::config::ExtractionConfig;

use super::dom::{Dom, NodeId};
use super::text::{clean_text, contains_cjk};

/// Note text found for an anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteMatch {
    /// Text to inline
    pub text: String,
    /// Element holding the note body, removed after inlining when small
    pub target: Option<NodeId>,
}

/// One way of recognizing a footnote reference
pub trait FootnoteStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Inspect `anchor`; return the note when it is a footnote reference
    fn detect(&self, dom: &Dom, anchor: NodeId) -> Option<NoteMatch>;
}

/// Image inside the anchor whose alt text is the note
///
/// The alt must be longer than `min_chars` characters or contain CJK ideographs.
pub struct ImageAltStrategy {
    min_chars: usize,
}

impl FootnoteStrategy for ImageAltStrategy {
    fn name(&self) -> &'static str {
        "image-alt"
    }

    fn detect(&self, dom: &Dom, anchor: NodeId) -> Option<NoteMatch> {
        let img = first_image(dom, anchor)?;
        let alt = dom.attr(img, "alt")?.trim();
        if alt.is_empty() {
            return None;
        }
        if alt.chars().count() > self.min_chars || contains_cjk(alt) {
            return Some(NoteMatch {
                text: alt.to_string(),
                target: None,
            });
        }
        None
    }
}

/// Image inside the anchor carrying the note in a dedicated attribute
pub struct ImageAttributeStrategy {
    attribute: String,
}

impl FootnoteStrategy for ImageAttributeStrategy {
    fn name(&self) -> &'static str {
        "image-attribute"
    }

    fn detect(&self, dom: &Dom, anchor: NodeId) -> Option<NoteMatch> {
        let img = first_image(dom, anchor)?;
        let text = dom.attr(img, &self.attribute)?.trim();
        if text.is_empty() {
            return None;
        }
        Some(NoteMatch {
            text: text.to_string(),
            target: None,
        })
    }
}

/// Internal fragment link to the note body
///
/// The anchor must carry a footnote class, be marked `epub:type="noteref"`, or have purely
/// numeric link text (brackets allowed, superscript optional).
pub struct FragmentTargetStrategy {
    classes: Vec<String>,
}

impl FragmentTargetStrategy {
    fn looks_like_reference(&self, dom: &Dom, anchor: NodeId) -> bool {
        if self.classes.iter().any(|class| dom.has_class(anchor, class)) {
            return true;
        }
        if dom
            .attr(anchor, "epub:type")
            .is_some_and(|t| t.split_ascii_whitespace().any(|t| t == "noteref"))
        {
            return true;
        }
        is_numeric_label(&dom.text_content(anchor))
    }
}

impl FootnoteStrategy for FragmentTargetStrategy {
    fn name(&self) -> &'static str {
        "fragment-target"
    }

    fn detect(&self, dom: &Dom, anchor: NodeId) -> Option<NoteMatch> {
        let fragment = dom.attr(anchor, "href")?.strip_prefix('#')?;
        if fragment.is_empty() || !self.looks_like_reference(dom, anchor) {
            return None;
        }

        let fragment = urlencoding::decode(fragment)
            .map(|f| f.into_owned())
            .unwrap_or_else(|_| fragment.to_string());
        let target = dom.element_by_id(dom.root(), &fragment)?;

        // a link back to the reference, or a target enclosing the anchor, is not a note body
        if dom.is(target, "a") || dom.is(target, "sup") || is_ancestor(dom, target, anchor) {
            return None;
        }

        let text = clean_text(&dom.text_content(target)).trim().to_string();
        if text.is_empty() {
            return None;
        }
        Some(NoteMatch {
            text,
            target: Some(target),
        })
    }
}

/// Inlines footnotes into the text that references them
pub struct FootnoteInliner {
    strategies: Vec<Box<dyn FootnoteStrategy>>,
    label: String,
    max_target_delete_chars: usize,
}

impl FootnoteInliner {
    /// Build the default strategy list from configuration
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            strategies: vec![
                Box::new(ImageAltStrategy {
                    min_chars: config.min_alt_note_chars,
                }),
                Box::new(ImageAttributeStrategy {
                    attribute: config.footnote_attribute.clone(),
                }),
                Box::new(FragmentTargetStrategy {
                    classes: config.footnote_classes.clone(),
                }),
            ],
            label: config.note_label.clone(),
            max_target_delete_chars: config.max_target_delete_chars,
        }
    }

    /// Append a strategy, evaluated after the existing ones
    pub fn with_strategy(mut self, strategy: Box<dyn FootnoteStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Inline every footnote reference beneath `scope`; returns the number inlined
    ///
    /// Anchors are visited in reverse document order so removing a note body never
    /// affects anchors still to be visited. Anchors detached by an earlier removal are
    /// skipped.
    pub fn inline(&self, dom: &mut Dom, scope: NodeId) -> usize {
        let anchors = dom.elements_by_tag(scope, "a");
        let mut inlined = 0;

        for &anchor in anchors.iter().rev() {
            if !dom.is_attached(anchor) {
                continue;
            }
            let Some((strategy, note)) = self
                .strategies
                .iter()
                .find_map(|s| s.detect(dom, anchor).map(|note| (s.name(), note)))
            else {
                continue;
            };

            if let Some(target) = note.target {
                let removable = dom.is(target, "li")
                    || dom.text_content(target).chars().count() < self.max_target_delete_chars;
                if removable {
                    dom.detach(target);
                }
            }

            let replaced = enclosing_superscript(dom, anchor).unwrap_or(anchor);
            let text = dom.create_text(&format!("({}: {})", self.label, note.text));
            dom.replace(replaced, text);
            inlined += 1;

            debug!(
                strategy = strategy,
                note = %truncate(&note.text, 20),
                "inlined footnote"
            );
        }

        inlined
    }
}

fn first_image(dom: &Dom, anchor: NodeId) -> Option<NodeId> {
    dom.elements_by_tag(anchor, "img").into_iter().next()
}

/// The `sup` directly wrapping `anchor` when it holds nothing else
fn enclosing_superscript(dom: &Dom, anchor: NodeId) -> Option<NodeId> {
    let parent = dom.parent(anchor)?;
    if !dom.is(parent, "sup") {
        return None;
    }
    let only_anchor = dom.text_content(parent).trim() == dom.text_content(anchor).trim();
    only_anchor.then_some(parent)
}

fn is_ancestor(dom: &Dom, candidate: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == candidate {
            return true;
        }
        current = dom.parent(id);
    }
    false
}

/// "1", "[12]", "【3】", "(4)"
fn is_numeric_label(text: &str) -> bool {
    let stripped: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '【' | '】' | '(' | ')' | '（' | '）'))
        .collect();
    let stripped = stripped.trim();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
