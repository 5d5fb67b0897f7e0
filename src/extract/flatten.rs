//! Flattening chapter markup into page blocks
//!
//! Block-level elements become [`PageBlock`]s. Loose inline content between blocks is
//! gathered into synthetic paragraphs, loose images become figures, and every other
//! container is dissolved. Inside a block only the inline vocabulary the provider renders
//! survives; unknown elements are replaced by their children.

use std::collections::{BTreeMap, HashSet};

use crate::node::{Element, Node, PageBlock};

use super::dom::{Dom, NodeData, NodeId};
use super::text::clean_text;

/// Nesting depth past which further elements inside a block are dissolved
const MAX_INLINE_DEPTH: usize = 32;

/// Top-level block tag for an element, after heading normalization
fn block_tag(name: &str) -> Option<&'static str> {
    Some(match name {
        "p" => "p",
        "h1" | "h2" | "h3" => "h3",
        "h4" | "h5" | "h6" => "h4",
        "blockquote" => "blockquote",
        "ul" => "ul",
        "ol" => "ol",
        "pre" => "pre",
        "figure" => "figure",
        "hr" => "hr",
        "aside" => "aside",
        _ => return None,
    })
}

/// Tag kept for an element nested inside a block
fn inner_tag(name: &str) -> Option<&'static str> {
    Some(match name {
        "a" => "a",
        "b" | "strong" => "b",
        "i" | "em" => "i",
        "u" => "u",
        "s" | "strike" | "del" => "s",
        "code" => "code",
        "li" => "li",
        "figcaption" => "figcaption",
        other => return block_tag(other),
    })
}

fn is_inline(name: &str) -> bool {
    matches!(
        name,
        "a" | "b" | "strong" | "i" | "em" | "u" | "s" | "strike" | "del" | "code" | "sub" | "sup"
            | "span" | "small" | "big" | "font" | "abbr" | "cite" | "q" | "mark" | "ruby" | "rt"
            | "rb" | "label" | "time" | "var" | "kbd" | "samp" | "bdi" | "bdo"
    )
}

/// Attributes the provider accepts for a kept tag
fn kept_attrs(dom: &Dom, id: NodeId, tag: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    if tag == "a"
        && let Some(href) = dom.attr(id, "href")
    {
        attrs.insert("href".to_string(), href.trim().to_string());
    }
    attrs
}

/// Flatten the content beneath `scope` into page blocks in document order
pub fn flatten(dom: &Dom, scope: NodeId) -> Vec<PageBlock> {
    enum Visit {
        Node(NodeId),
        Boundary,
    }

    let bearing = block_bearing(dom, scope);
    let mut blocks = Vec::new();
    let mut pending: Vec<Node> = Vec::new();
    let mut stack: Vec<Visit> = dom.children(scope).iter().rev().map(|&c| Visit::Node(c)).collect();

    while let Some(visit) = stack.pop() {
        let id = match visit {
            Visit::Boundary => {
                flush(&mut pending, &mut blocks);
                continue;
            }
            Visit::Node(id) => id,
        };

        match dom.data(id) {
            NodeData::Text(text) => {
                let text = clean_text(text);
                if !text.trim().is_empty() || (!text.is_empty() && !pending.is_empty()) {
                    pending.push(Node::Text(text));
                }
            }
            NodeData::Element { name, .. } => {
                let name = name.as_str();
                if name == "br" {
                    flush(&mut pending, &mut blocks);
                } else if let Some(tag) = block_tag(name) {
                    flush(&mut pending, &mut blocks);
                    if let Some(block) = convert(dom, id, tag) {
                        blocks.push(block);
                    }
                } else if name == "img" {
                    flush(&mut pending, &mut blocks);
                    if let Some(src) = image_src(dom, id) {
                        blocks.push(Element::new("figure", vec![Node::Image(src)]));
                    }
                } else if is_inline(name) && !bearing.contains(&id) {
                    if let Some(tag) = inner_tag(name) {
                        if let Some(el) = convert(dom, id, tag) {
                            pending.push(Node::Element(el));
                        }
                    } else {
                        stack.extend(dom.children(id).iter().rev().map(|&c| Visit::Node(c)));
                    }
                } else if is_inline(name) {
                    stack.extend(dom.children(id).iter().rev().map(|&c| Visit::Node(c)));
                } else {
                    // containers end any loose run on both sides
                    flush(&mut pending, &mut blocks);
                    stack.push(Visit::Boundary);
                    stack.extend(dom.children(id).iter().rev().map(|&c| Visit::Node(c)));
                }
            }
            NodeData::Document | NodeData::Other => {}
        }
    }

    flush(&mut pending, &mut blocks);
    blocks
}

/// Nodes beneath `scope` whose subtree holds a block, an image or a `div`
fn block_bearing(dom: &Dom, scope: NodeId) -> HashSet<NodeId> {
    let mut bearing = HashSet::new();
    // reversed pre-order visits every child before its parent
    for id in dom.descendants(scope).into_iter().rev() {
        let is_block = dom
            .tag(id)
            .is_some_and(|t| block_tag(t).is_some() || t == "img" || t == "div");
        if is_block || dom.children(id).iter().any(|c| bearing.contains(c)) {
            bearing.insert(id);
        }
    }
    bearing
}

fn image_src(dom: &Dom, id: NodeId) -> Option<String> {
    let src = dom.attr(id, "src")?.trim();
    (!src.is_empty()).then(|| src.to_string())
}

/// Close the loose inline run as a paragraph
fn flush(pending: &mut Vec<Node>, blocks: &mut Vec<PageBlock>) {
    if pending.is_empty() {
        return;
    }
    let mut children = std::mem::take(pending);
    trim_edges(&mut children);
    let paragraph = Element::new("p", children);
    if !paragraph.is_empty() {
        blocks.push(paragraph);
    }
}

/// Trim whitespace at the outer edges of a child list
fn trim_edges(children: &mut Vec<Node>) {
    if let Some(Node::Text(first)) = children.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Node::Text(last)) = children.last_mut() {
        *last = last.trim_end().to_string();
    }
    children.retain(|c| !matches!(c, Node::Text(t) if t.is_empty()));
}

/// Convert the subtree at `id` into an element tagged `tag`; `None` when it renders nothing
fn convert(dom: &Dom, id: NodeId, tag: &str) -> Option<Element> {
    struct Frame {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<Node>,
    }

    enum Step {
        Enter { id: NodeId, pre: bool },
        Close,
    }

    let root_pre = tag == "pre";
    let mut frames = vec![Frame {
        tag: tag.to_string(),
        attrs: kept_attrs(dom, id, tag),
        children: Vec::new(),
    }];
    let mut stack: Vec<Step> = dom
        .children(id)
        .iter()
        .rev()
        .map(|&c| Step::Enter { id: c, pre: root_pre })
        .collect();

    while let Some(step) = stack.pop() {
        match step {
            Step::Close => {
                let Some(frame) = frames.pop() else { break };
                let mut el = Element {
                    tag: frame.tag,
                    attrs: frame.attrs,
                    children: frame.children,
                };
                if el.tag != "pre" && el.tag != "code" {
                    collapse_adjacent_spaces(&mut el.children);
                }
                if !el.is_empty()
                    && let Some(parent) = frames.last_mut()
                {
                    parent.children.push(Node::Element(el));
                }
            }
            Step::Enter { id: child, pre } => {
                let Some(parent) = frames.last_mut() else { break };
                match dom.data(child) {
                    NodeData::Text(text) => {
                        let text = if pre { text.clone() } else { clean_text(text) };
                        if !text.is_empty() {
                            parent.children.push(Node::Text(text));
                        }
                    }
                    NodeData::Element { name, .. } => match name.as_str() {
                        "img" => {
                            if let Some(src) = image_src(dom, child) {
                                parent.children.push(Node::Image(src));
                            }
                        }
                        "br" if pre => parent.children.push(Node::Text("\n".to_string())),
                        "br" => parent.children.push(Node::Element(Element::new("br", Vec::new()))),
                        name => {
                            let kept = inner_tag(name).filter(|_| frames.len() < MAX_INLINE_DEPTH);
                            let pre = pre || name == "pre";
                            if let Some(inner) = kept {
                                frames.push(Frame {
                                    tag: inner.to_string(),
                                    attrs: kept_attrs(dom, child, inner),
                                    children: Vec::new(),
                                });
                                stack.push(Step::Close);
                            }
                            stack.extend(
                                dom.children(child)
                                    .iter()
                                    .rev()
                                    .map(|&c| Step::Enter { id: c, pre }),
                            );
                        }
                    },
                    NodeData::Document | NodeData::Other => {}
                }
            }
        }
    }

    let frame = frames.pop()?;
    let mut children = frame.children;
    if !root_pre {
        collapse_adjacent_spaces(&mut children);
        trim_edges(&mut children);
    }
    let el = Element {
        tag: frame.tag,
        attrs: frame.attrs,
        children,
    };
    (!el.is_empty()).then_some(el)
}

/// Drop whitespace-only text runs that would double up with a neighbour's space
fn collapse_adjacent_spaces(children: &mut Vec<Node>) {
    let mut previous_ends_with_space = true;
    children.retain(|child| match child {
        Node::Text(t) if t.trim().is_empty() => {
            let keep = !previous_ends_with_space;
            previous_ends_with_space = true;
            keep
        }
        Node::Text(t) => {
            previous_ends_with_space = t.ends_with(' ');
            true
        }
        _ => {
            previous_ends_with_space = false;
            true
        }
    });
}
