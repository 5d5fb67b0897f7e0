//! Arena DOM for chapter markup
//!
//! Chapters are parsed with html5ever into a flat arena of nodes addressed by index. The
//! arena owns only plain strings so it can be held across await points; the parser's
//! interned names live in the sink and are dropped once parsing finishes.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, QualName};

/// Index of a node in the arena
pub type NodeId = usize;

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Document root
    Document,
    /// Element with lowercase local name and attributes in source order
    Element {
        /// Lowercase tag name without namespace prefix
        name: String,
        /// Attribute name/value pairs; prefixed attributes keep their prefix ("xlink:href")
        attrs: Vec<(String, String)>,
    },
    /// Text run
    Text(String),
    /// Comments, doctypes and processing instructions
    Other,
}

#[derive(Debug, Clone)]
struct DomNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Parsed chapter document
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<DomNode>,
}

impl Dom {
    fn new() -> Self {
        Self {
            nodes: vec![DomNode {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    /// Parse markup bytes (lossily decoded as UTF-8)
    pub fn parse(bytes: &[u8]) -> Self {
        let sink = ArenaSink::default();
        parse_document(sink, ParseOpts::default())
            .from_utf8()
            .one(bytes)
            .into_dom()
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        0
    }

    /// The `body` element, or the document node when there is none
    pub fn body(&self) -> NodeId {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.tag(id) == Some("body"))
            .unwrap_or_else(|| self.root())
    }

    /// Payload of a node
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id].data
    }

    /// Parent of a node, `None` for the root and for detached nodes
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Children of a node in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Tag name of an element
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether `id` is an element named `tag`
    pub fn is(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    /// Attribute value of an element
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Set (or add) an attribute on an element
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            match attrs.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some(attr) => attr.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Rename an element
    pub fn rename(&mut self, id: NodeId, tag: &str) {
        if let NodeData::Element { name, .. } = &mut self.nodes[id].data {
            *name = tag.to_string();
        }
    }

    /// Whether the element's class list contains `class`
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    /// `id` and all nodes beneath it, in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev());
        }
        out
    }

    /// Elements named `tag` beneath `id` (inclusive), in document order
    pub fn elements_by_tag(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is(n, tag))
            .collect()
    }

    /// First element beneath `id` (inclusive) whose `id` attribute equals `element_id`
    pub fn element_by_id(&self, id: NodeId, element_id: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(element_id))
    }

    /// Concatenated text beneath a node
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(id) {
            if let NodeData::Text(text) = &self.nodes[n].data {
                out.push_str(text);
            }
        }
        out
    }

    /// Whether the node is still reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes[current].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_string(),
            attrs,
        })
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(DomNode {
            parent: None,
            children: Vec::new(),
            data,
        });
        self.nodes.len() - 1
    }

    /// Append a detached node as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Append text to `parent`, merging with a trailing text child
    fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(&last) = self.nodes[parent].children.last()
            && let NodeData::Text(existing) = &mut self.nodes[last].data
        {
            existing.push_str(text);
            return;
        }
        let id = self.create_text(text);
        self.append(parent, id);
    }

    /// Insert `node` immediately before `sibling`
    pub fn insert_before(&mut self, sibling: NodeId, node: NodeId) {
        let Some(parent) = self.nodes[sibling].parent else {
            return;
        };
        self.detach(node);
        let position = self.position_in_parent(parent, sibling).unwrap_or(0);
        self.nodes[parent].children.insert(position, node);
        self.nodes[node].parent = Some(parent);
    }

    fn position_in_parent(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent].children.iter().position(|&c| c == child)
    }

    /// Remove a node (and its subtree) from its parent
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take()
            && let Some(position) = self.position_in_parent(parent, id)
        {
            self.nodes[parent].children.remove(position);
        }
    }

    /// Replace a node with another, detached node
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.nodes[old].parent else {
            return;
        };
        self.detach(new);
        if let Some(position) = self.position_in_parent(parent, old) {
            self.nodes[parent].children[position] = new;
            self.nodes[new].parent = Some(parent);
            self.nodes[old].parent = None;
        }
    }

    /// Replace an element with its children
    pub fn unwrap(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        let Some(position) = self.position_in_parent(parent, id) else {
            return;
        };
        let children = std::mem::take(&mut self.nodes[id].children);
        for &child in &children {
            self.nodes[child].parent = Some(parent);
        }
        self.nodes[parent]
            .children
            .splice(position..=position, children);
        self.nodes[id].parent = None;
    }
}

/// Parser-side handle: arena index plus the element's qualified name
#[derive(Clone, Debug)]
struct SinkHandle {
    id: NodeId,
    name: Option<Rc<QualName>>,
}

/// TreeSink that builds a [`Dom`]
///
/// html5ever's TreeSink takes `&self`, so the arena sits behind a RefCell.
#[derive(Default)]
struct ArenaSink {
    dom: RefCell<Option<Dom>>,
}

static EMPTY_NAME: QualName = QualName {
    prefix: None,
    ns: html5ever::ns!(),
    local: html5ever::local_name!(""),
};

impl ArenaSink {
    fn with_dom<T>(&self, f: impl FnOnce(&mut Dom) -> T) -> T {
        let mut guard = self.dom.borrow_mut();
        f(guard.get_or_insert_with(Dom::new))
    }

    fn into_dom(self) -> Dom {
        self.dom.into_inner().unwrap_or_else(Dom::new)
    }

    fn append_child(&self, parent: NodeId, child: NodeOrText<SinkHandle>) {
        self.with_dom(|dom| match child {
            NodeOrText::AppendNode(node) => dom.append(parent, node.id),
            NodeOrText::AppendText(text) => dom.append_text(parent, &text),
        });
    }
}

fn attr_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

impl TreeSink for ArenaSink {
    type Handle = SinkHandle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Self::Handle {
        SinkHandle {
            id: self.with_dom(|dom| dom.root()),
            name: None,
        }
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        target.name.as_deref().unwrap_or(&EMPTY_NAME)
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let attrs = attrs
            .into_iter()
            .map(|a| (attr_name(&a.name), a.value.to_string()))
            .collect();
        let tag = name.local.to_ascii_lowercase();
        let id = self.with_dom(|dom| dom.create_element(&tag, attrs));
        SinkHandle {
            id,
            name: Some(Rc::new(name)),
        }
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        SinkHandle {
            id: self.with_dom(|dom| dom.push(NodeData::Other)),
            name: None,
        }
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        self.create_comment(StrTendril::new())
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        self.append_child(parent.id, child);
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let parent = self.with_dom(|dom| dom.parent(element.id));
        match parent {
            Some(parent) => self.append_child(parent, child),
            None => self.append_child(prev_element.id, child),
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x.id == y.id
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        self.with_dom(|dom| {
            let node = match new_node {
                NodeOrText::AppendNode(node) => node.id,
                NodeOrText::AppendText(text) => dom.create_text(&text),
            };
            dom.insert_before(sibling.id, node);
        });
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        self.with_dom(|dom| {
            for attr in attrs {
                let name = attr_name(&attr.name);
                if dom.attr(target.id, &name).is_none() {
                    dom.set_attr(target.id, &name, &attr.value);
                }
            }
        });
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        self.with_dom(|dom| dom.detach(target.id));
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        self.with_dom(|dom| {
            let children = std::mem::take(&mut dom.nodes[node.id].children);
            for child in children {
                dom.nodes[child].parent = Some(new_parent.id);
                dom.nodes[new_parent.id].children.push(child);
            }
        });
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_body_and_attributes() {
        let dom = Dom::parse(br#"<html><body><p id="a" class="x y">Hello <b>world</b></p></body></html>"#);
        let body = dom.body();
        assert!(dom.is(body, "body"));

        let p = dom.element_by_id(body, "a").unwrap();
        assert!(dom.has_class(p, "y"));
        assert!(!dom.has_class(p, "z"));
        assert_eq!(dom.text_content(p), "Hello world");
    }

    #[test]
    fn xhtml_prolog_and_namespaced_attributes() {
        let dom = Dom::parse(
            br##"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>T</title></head>
<body><a epub:type="noteref" href="#n1">1</a>
<svg xmlns:xlink="http://www.w3.org/1999/xlink"><image xlink:href="cover.jpg"/></svg></body></html>"##,
        );
        let a = dom.elements_by_tag(dom.root(), "a")[0];
        assert_eq!(dom.attr(a, "epub:type"), Some("noteref"));

        let image = dom.elements_by_tag(dom.root(), "image")[0];
        assert_eq!(dom.attr(image, "xlink:href"), Some("cover.jpg"));
    }

    #[test]
    fn adjacent_text_is_merged() {
        let dom = Dom::parse(b"<p>a&amp;b</p>");
        let p = dom.elements_by_tag(dom.root(), "p")[0];
        assert_eq!(dom.children(p).len(), 1);
        assert_eq!(dom.text_content(p), "a&b");
    }

    #[test]
    fn unwrap_keeps_children_in_place() {
        let mut dom = Dom::parse(b"<p>x<a href='#'>y<i>z</i></a>w</p>");
        let p = dom.elements_by_tag(dom.root(), "p")[0];
        let a = dom.elements_by_tag(p, "a")[0];
        dom.unwrap(a);

        assert_eq!(dom.text_content(p), "xyzw");
        assert!(dom.elements_by_tag(p, "a").is_empty());
        assert!(!dom.is_attached(a));
        let i = dom.elements_by_tag(p, "i")[0];
        assert_eq!(dom.parent(i), Some(p));
    }

    #[test]
    fn replace_and_detach() {
        let mut dom = Dom::parse(b"<p>a<sup>1</sup>b</p>");
        let p = dom.elements_by_tag(dom.root(), "p")[0];
        let sup = dom.elements_by_tag(p, "sup")[0];
        let text = dom.create_text("(note)");
        dom.replace(sup, text);

        assert_eq!(dom.text_content(p), "a(note)b");
        assert!(!dom.is_attached(sup));

        dom.detach(text);
        assert_eq!(dom.text_content(p), "ab");
    }
}
