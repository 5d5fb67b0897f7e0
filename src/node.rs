//! Content nodes and page blocks
//!
//! A chapter is flattened into a list of [`PageBlock`]s, each a top-level element whose
//! children are inline content. Nodes serialize to the provider's node JSON: a bare string
//! for text, `{"tag", "attrs", "children"}` for elements.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// Length charged for a node without visible text (rules, images, empty wrappers)
pub const EMPTY_NODE_LEN: usize = 20;

/// A node of flattened content
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Markup element with children
    Element(Element),
    /// A run of text
    Text(String),
    /// An image, by URL
    Image(String),
}

/// Markup element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    /// Tag name, lowercase
    pub tag: String,
    /// Attributes kept for the provider (`href`, `src`)
    pub attrs: BTreeMap<String, String>,
    /// Child nodes in document order
    pub children: Vec<Node>,
}

/// A top-level block of a page
pub type PageBlock = Element;

impl Element {
    /// Create an element without attributes
    pub fn new(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children,
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Estimated rendered length of this element
    ///
    /// The sum of the lengths of its children, where text counts its characters and
    /// nested elements and images count their own estimate. An element whose sum is zero
    /// is charged [`EMPTY_NODE_LEN`].
    pub fn estimated_len(&self) -> usize {
        // post-order over an explicit stack so deep nesting cannot overflow
        enum Step<'a> {
            Enter(&'a Element),
            Exit,
        }

        let mut totals: Vec<usize> = vec![0];
        let mut stack = vec![Step::Enter(self)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(el) => {
                    totals.push(0);
                    stack.push(Step::Exit);
                    for child in el.children.iter().rev() {
                        match child {
                            Node::Element(inner) => stack.push(Step::Enter(inner)),
                            Node::Text(text) => {
                                if let Some(top) = totals.last_mut() {
                                    *top += text.chars().count();
                                }
                            }
                            Node::Image(_) => {
                                if let Some(top) = totals.last_mut() {
                                    *top += EMPTY_NODE_LEN;
                                }
                            }
                        }
                    }
                }
                Step::Exit => {
                    let own = totals.pop().unwrap_or(0);
                    let own = if own == 0 { EMPTY_NODE_LEN } else { own };
                    if let Some(parent) = totals.last_mut() {
                        *parent += own;
                    }
                }
            }
        }

        totals.pop().unwrap_or(EMPTY_NODE_LEN)
    }

    /// Concatenated text of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<&Node> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) => stack.extend(el.children.iter().rev()),
                Node::Image(_) => {}
            }
        }
        out
    }

    /// Whether this element has nothing worth rendering
    ///
    /// Horizontal rules and line breaks are never empty.
    pub fn is_empty(&self) -> bool {
        if self.tag == "hr" || self.tag == "br" {
            return false;
        }
        let mut stack: Vec<&Node> = self.children.iter().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text(t) if !t.trim().is_empty() => return false,
                Node::Text(_) => {}
                Node::Image(_) => return false,
                Node::Element(el) if el.tag == "hr" => return false,
                Node::Element(el) => stack.extend(el.children.iter()),
            }
        }
        true
    }
}

impl Node {
    /// Estimated rendered length of this node
    pub fn estimated_len(&self) -> usize {
        match self {
            Node::Element(el) => el.estimated_len(),
            Node::Text(t) => t.chars().count(),
            Node::Image(_) => EMPTY_NODE_LEN,
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Text(text) => serializer.serialize_str(text),
            Node::Element(el) => el.serialize(serializer),
            Node::Image(src) => {
                let mut attrs = BTreeMap::new();
                attrs.insert("src", src.as_str());
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("tag", "img")?;
                map.serialize_entry("attrs", &attrs)?;
                map.end()
            }
        }
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(!self.attrs.is_empty()) + usize::from(!self.children.is_empty());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("tag", &self.tag)?;
        if !self.attrs.is_empty() {
            map.serialize_entry("attrs", &self.attrs)?;
        }
        if !self.children.is_empty() {
            map.serialize_entry("children", &self.children)?;
        }
        map.end()
    }
}
