//! Arena-backed in-memory document.
//!
//! Used where no browser is attached: headless relays, benches and tests.
//! Nodes are never freed; removal only detaches, so stale handles stay
//! valid and simply stop matching selectors. Replacing an element's lone
//! text child rewrites it in place, so repeated `SET_TEXT` on the same
//! element does not grow the arena. Replaced subtrees and inserted markup
//! do, which makes this a test double rather than a long-lived page.
//!
//! Interactions that a real page would turn into script-visible side
//! effects (click, focus, synthetic events, scrolling) are recorded as
//! [`DomEvent`]s.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::NodeId;
use crate::protocol::{InsertPosition, ScrollBehavior, ScrollBlock};

use super::html::{self, ParsedNode};
use super::selector::{Selector, SelectorContext};
use super::{Document, PageInfo, Viewport};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "about:blank";
const DEFAULT_VIEWPORT: Viewport = Viewport {
    width: 1280,
    height: 720,
};

/// Elements that carry a `value` property.
const FORM_CONTROLS: &[&str] = &["input", "textarea", "select"];

// ============================================================================
// Types
// ============================================================================

/// Side effect observed by the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    /// Synthetic event dispatched on a node.
    Dispatched {
        /// Target node.
        node: NodeId,
        /// Event type, e.g. `input`.
        event: String,
    },
    /// Element was clicked.
    Clicked(NodeId),
    /// Element received focus.
    Focused(NodeId),
    /// Element was scrolled into view.
    Scrolled {
        /// Target node.
        node: NodeId,
        /// Requested animation.
        behavior: ScrollBehavior,
        /// Requested alignment.
        block: ScrollBlock,
    },
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

// ============================================================================
// MemoryDocument
// ============================================================================

/// In-memory [`Document`] with `html`, `head` and `body` elements.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    url: String,
    title: String,
    viewport: Viewport,
    values: FxHashMap<NodeId, String>,
    focused: Option<NodeId>,
    events: Vec<DomEvent>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemoryDocument - Constructors
// ============================================================================

impl MemoryDocument {
    /// Creates an empty document at `about:blank`.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            url: DEFAULT_URL.to_string(),
            title: String::new(),
            viewport: DEFAULT_VIEWPORT,
            values: FxHashMap::default(),
            focused: None,
            events: Vec::new(),
        };
        let root = doc.alloc(NodeKind::Element {
            tag: "html".to_string(),
            attrs: Vec::new(),
        });
        let head = doc.alloc(NodeKind::Element {
            tag: "head".to_string(),
            attrs: Vec::new(),
        });
        let body = doc.alloc(NodeKind::Element {
            tag: "body".to_string(),
            attrs: Vec::new(),
        });
        doc.append_child(root, head);
        doc.append_child(root, body);
        doc.root = root;
        doc.head = head;
        doc.body = body;
        doc
    }

    /// Creates a document whose body holds the parsed `html`.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let mut doc = Self::new();
        let body = doc.body;
        for parsed in html::parse_fragment(html) {
            let node = doc.build(parsed);
            doc.append_child(body, node);
        }
        doc
    }

    /// Sets the location.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the viewport.
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }
}

// ============================================================================
// MemoryDocument - Inspection
// ============================================================================

impl MemoryDocument {
    /// The `<body>` element.
    #[inline]
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// The `<head>` element.
    #[inline]
    #[must_use]
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// Currently focused element.
    #[inline]
    #[must_use]
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Recorded side effects, oldest first.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }

    /// Drains recorded side effects.
    pub fn take_events(&mut self) -> Vec<DomEvent> {
        std::mem::take(&mut self.events)
    }

    /// Returns `true` if the node is reachable from the root.
    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.data(id).and_then(|d| d.parent);
        }
        false
    }

    /// Serialized body content.
    #[must_use]
    pub fn body_html(&self) -> String {
        self.inner_html(self.body)
    }
}

// ============================================================================
// MemoryDocument - Internals
// ============================================================================

impl MemoryDocument {
    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0)
    }

    fn data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(node.0)
    }

    fn build(&mut self, parsed: ParsedNode) -> NodeId {
        match parsed {
            ParsedNode::Text(text) => self.alloc(NodeKind::Text(text)),
            ParsedNode::Element {
                tag,
                attrs,
                children,
            } => {
                let node = self.alloc(NodeKind::Element { tag, attrs });
                for child in children {
                    let child = self.build(child);
                    self.append_child(node, child);
                }
                node
            }
        }
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.data(node).and_then(|d| d.parent) else {
            return;
        };
        if let Some(data) = self.data_mut(parent) {
            data.children.retain(|c| *c != node);
        }
        if let Some(data) = self.data_mut(node) {
            data.parent = None;
        }
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_child(parent, child, usize::MAX);
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, at: usize) {
        self.detach(child);
        if let Some(data) = self.data_mut(parent) {
            let at = at.min(data.children.len());
            data.children.insert(at, child);
        }
        if let Some(data) = self.data_mut(child) {
            data.parent = Some(parent);
        }
    }

    fn attrs(&self, node: NodeId) -> Option<&Vec<(String, String)>> {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Element { attrs, .. }) => Some(attrs),
            _ => None,
        }
    }

    fn attrs_mut(&mut self, node: NodeId) -> Option<&mut Vec<(String, String)>> {
        match self.data_mut(node).map(|d| &mut d.kind) {
            Some(NodeKind::Element { attrs, .. }) => Some(attrs),
            _ => None,
        }
    }

    fn collect_elements(&self, node: NodeId, out: &mut Vec<NodeId>) {
        let Some(data) = self.data(node) else { return };
        if matches!(data.kind, NodeKind::Element { .. }) {
            out.push(node);
        }
        for child in &data.children {
            self.collect_elements(*child, out);
        }
    }

    fn write_text(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.data(node) else { return };
        match &data.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element { .. } => {
                for child in &data.children {
                    self.write_text(*child, out);
                }
            }
        }
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.data(node) else { return };
        match &data.kind {
            NodeKind::Text(text) => {
                let raw_parent = data
                    .parent
                    .and_then(|p| self.element_tag(p))
                    .is_some_and(|t| t == "script" || t == "style");
                if raw_parent {
                    out.push_str(text);
                } else {
                    out.push_str(&html::escape_text(text));
                }
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html::escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if html::is_void(tag) {
                    return;
                }
                for child in &data.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

// ============================================================================
// SelectorContext
// ============================================================================

impl SelectorContext for MemoryDocument {
    fn element_tag(&self, node: NodeId) -> Option<&str> {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    fn element_attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attrs(node)?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).and_then(|d| d.parent)
    }
}

// ============================================================================
// Document
// ============================================================================

impl Document for MemoryDocument {
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let parsed = Selector::parse(selector)?;
        let mut elements = Vec::new();
        self.collect_elements(self.root, &mut elements);
        Ok(elements
            .into_iter()
            .filter(|node| parsed.matches(self, *node))
            .collect())
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.element_tag(node).unwrap_or_default().to_string()
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_text(node, &mut out);
        out
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) {
        let children = self
            .data(node)
            .map(|d| d.children.clone())
            .unwrap_or_default();
        if let [only] = children[..]
            && !text.is_empty()
            && let Some(NodeData {
                kind: NodeKind::Text(existing),
                ..
            }) = self.data_mut(only)
        {
            text.clone_into(existing);
            return;
        }
        for child in children {
            self.detach(child);
        }
        if !text.is_empty() {
            let text_node = self.alloc(NodeKind::Text(text.to_string()));
            self.append_child(node, text_node);
        }
    }

    fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(data) = self.data(node) {
            for child in &data.children {
                self.write_html(*child, &mut out);
            }
        }
        out
    }

    fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element_attr(node, &name.to_ascii_lowercase())
            .map(str::to_string)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.attrs(node).cloned().unwrap_or_default()
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let Some(attrs) = self.attrs_mut(node) else {
            return;
        };
        match attrs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => attrs.push((name, value.to_string())),
        }
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        let Some(attrs) = self.attrs_mut(node) else {
            return false;
        };
        let before = attrs.len();
        attrs.retain(|(n, _)| *n != name);
        attrs.len() != before
    }

    fn is_form_control(&self, node: NodeId) -> bool {
        self.element_tag(node)
            .is_some_and(|tag| FORM_CONTROLS.contains(&tag))
    }

    fn value(&self, node: NodeId) -> Option<String> {
        if !self.is_form_control(node) {
            return None;
        }
        if let Some(value) = self.values.get(&node) {
            return Some(value.clone());
        }
        match self.element_tag(node) {
            Some("textarea") => Some(self.text_content(node)),
            _ => Some(self.attribute(node, "value").unwrap_or_default()),
        }
    }

    fn set_value(&mut self, node: NodeId, value: &str) {
        self.values.insert(node, value.to_string());
    }

    fn dispatch_event(&mut self, node: NodeId, event: &str) {
        trace!(%node, event, "Dispatching synthetic event");
        self.events.push(DomEvent::Dispatched {
            node,
            event: event.to_string(),
        });
    }

    fn click(&mut self, node: NodeId) {
        self.events.push(DomEvent::Clicked(node));
    }

    fn focus(&mut self, node: NodeId) {
        self.focused = Some(node);
        self.events.push(DomEvent::Focused(node));
    }

    fn scroll_into_view(&mut self, node: NodeId, behavior: ScrollBehavior, block: ScrollBlock) {
        self.events.push(DomEvent::Scrolled {
            node,
            behavior,
            block,
        });
    }

    fn insert_adjacent_html(
        &mut self,
        node: NodeId,
        position: InsertPosition,
        html: &str,
    ) -> Result<()> {
        let parent = self.data(node).and_then(|d| d.parent);
        let (parent, mut at) = match position {
            InsertPosition::AfterBegin => (node, 0),
            InsertPosition::BeforeEnd => (node, usize::MAX),
            InsertPosition::BeforeBegin | InsertPosition::AfterEnd => {
                let parent = parent.ok_or_else(|| {
                    Error::invalid_command(format!(
                        "cannot insert {position:?} of a node without a parent"
                    ))
                })?;
                let index = self
                    .data(parent)
                    .and_then(|d| d.children.iter().position(|c| *c == node))
                    .unwrap_or(0);
                let at = if position == InsertPosition::AfterEnd {
                    index + 1
                } else {
                    index
                };
                (parent, at)
            }
        };

        for parsed in html::parse_fragment(html) {
            let child = self.build(parsed);
            self.insert_child(parent, child, at);
            at = at.saturating_add(1);
        }
        Ok(())
    }

    fn remove(&mut self, node: NodeId) {
        self.detach(node);
        if self.focused == Some(node) {
            self.focused = None;
        }
    }

    fn add_class(&mut self, node: NodeId, class: &str) {
        let current = self.attribute(node, "class").unwrap_or_default();
        if current.split_whitespace().any(|c| c == class) {
            return;
        }
        let updated = if current.trim().is_empty() {
            class.to_string()
        } else {
            format!("{} {class}", current.trim())
        };
        self.set_attribute(node, "class", &updated);
    }

    fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(current) = self.attribute(node, "class") else {
            return;
        };
        let updated: Vec<&str> = current.split_whitespace().filter(|c| *c != class).collect();
        self.set_attribute(node, "class", &updated.join(" "));
    }

    fn has_style(&self, id: &str) -> bool {
        self.data(self.head).is_some_and(|head| {
            head.children.iter().any(|child| {
                self.element_tag(*child) == Some("style")
                    && self.element_attr(*child, "id") == Some(id)
            })
        })
    }

    fn inject_style(&mut self, id: &str, css: &str) {
        let style = self.alloc(NodeKind::Element {
            tag: "style".to_string(),
            attrs: vec![("id".to_string(), id.to_string())],
        });
        let text = self.alloc(NodeKind::Text(css.to_string()));
        self.append_child(style, text);
        let head = self.head;
        self.append_child(head, style);
    }

    fn page_info(&self) -> PageInfo {
        PageInfo {
            url: self.url.clone(),
            title: self.title.clone(),
            viewport: self.viewport,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> MemoryDocument {
        MemoryDocument::from_html(
            r#"<h1>Hello</h1>
<ul id="list"><li class="item">a</li><li class="item done">b</li></ul>
<form id="f"><input name="q" value="init"><textarea>notes</textarea></form>"#,
        )
    }

    #[test]
    fn test_query_in_document_order() {
        let d = doc();
        let items = d.query_selector_all("li.item").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(d.text_content(items[0]), "a");
        assert_eq!(d.text_content(items[1]), "b");
    }

    #[test]
    fn test_query_combinators() {
        let d = doc();
        assert_eq!(d.query_selector_all("ul > li").unwrap().len(), 2);
        assert_eq!(d.query_selector_all("body li.done").unwrap().len(), 1);
        assert_eq!(d.query_selector_all("form > li").unwrap().len(), 0);
        assert_eq!(d.query_selector_all("input[name=q], h1").unwrap().len(), 2);
    }

    #[test]
    fn test_attribute_value_with_comma_matches() {
        let d = MemoryDocument::from_html(r#"<p data-x="a,b">one</p><p data-x="a">two</p>"#);
        let hits = d.query_selector_all(r#"[data-x="a,b"]"#).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(d.text_content(hits[0]), "one");
    }

    #[test]
    fn test_removed_nodes_stop_matching() {
        let mut d = doc();
        let h1 = d.query_selector_all("h1").unwrap()[0];
        d.remove(h1);
        assert!(!d.is_connected(h1));
        assert!(d.query_selector_all("h1").unwrap().is_empty());
        assert_eq!(d.text_content(h1), "Hello");
    }

    #[test]
    fn test_set_text_replaces_children() {
        let mut d = doc();
        let list = d.query_selector_all("#list").unwrap()[0];
        d.set_text_content(list, "<gone>");
        assert_eq!(d.inner_html(list), "&lt;gone&gt;");
        assert!(d.query_selector_all("li").unwrap().is_empty());
    }

    #[test]
    fn test_repeated_set_text_reuses_text_node() {
        let mut d = doc();
        let h1 = d.query_selector_all("h1").unwrap()[0];
        d.set_text_content(h1, "first");
        let size = d.nodes.len();

        for i in 0..100 {
            d.set_text_content(h1, &format!("update {i}"));
        }
        assert_eq!(d.nodes.len(), size);
        assert_eq!(d.text_content(h1), "update 99");

        d.set_text_content(h1, "");
        assert_eq!(d.inner_html(h1), "");
        d.set_text_content(h1, "back");
        assert_eq!(d.nodes.len(), size + 1);
    }

    #[test]
    fn test_form_values() {
        let mut d = doc();
        let input = d.query_selector_all("input").unwrap()[0];
        let textarea = d.query_selector_all("textarea").unwrap()[0];
        let h1 = d.query_selector_all("h1").unwrap()[0];

        assert_eq!(d.value(input).as_deref(), Some("init"));
        assert_eq!(d.value(textarea).as_deref(), Some("notes"));
        assert_eq!(d.value(h1), None);

        d.set_value(input, "typed");
        assert_eq!(d.value(input).as_deref(), Some("typed"));
        assert_eq!(d.attribute(input, "value").as_deref(), Some("init"));
    }

    #[test]
    fn test_insert_adjacent_positions() {
        let mut d = MemoryDocument::from_html("<div id=t><p>mid</p></div>");
        let t = d.query_selector_all("#t").unwrap()[0];
        d.insert_adjacent_html(t, InsertPosition::AfterBegin, "<i>1</i>").unwrap();
        d.insert_adjacent_html(t, InsertPosition::BeforeEnd, "<i>2</i>").unwrap();
        d.insert_adjacent_html(t, InsertPosition::BeforeBegin, "<b>0</b>").unwrap();
        d.insert_adjacent_html(t, InsertPosition::AfterEnd, "<b>3</b>").unwrap();

        assert_eq!(
            d.body_html(),
            r#"<b>0</b><div id="t"><i>1</i><p>mid</p><i>2</i></div><b>3</b>"#
        );
    }

    #[test]
    fn test_insert_sibling_of_detached_fails() {
        let mut d = doc();
        let h1 = d.query_selector_all("h1").unwrap()[0];
        d.remove(h1);
        let err = d
            .insert_adjacent_html(h1, InsertPosition::AfterEnd, "<p>x</p>")
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_class_helpers() {
        let mut d = doc();
        let li = d.query_selector_all(".done").unwrap()[0];
        d.add_class(li, "hl");
        d.add_class(li, "hl");
        assert_eq!(d.attribute(li, "class").as_deref(), Some("item done hl"));
        d.remove_class(li, "done");
        assert_eq!(d.attribute(li, "class").as_deref(), Some("item hl"));
    }

    #[test]
    fn test_style_injection() {
        let mut d = doc();
        assert!(!d.has_style("marker"));
        d.inject_style("marker", ".x { outline: 1px solid red }");
        assert!(d.has_style("marker"));
        assert!(d.query_selector_all("body style").unwrap().is_empty());
    }

    #[test]
    fn test_page_info_defaults() {
        let info = MemoryDocument::new().page_info();
        assert_eq!(info.url, "about:blank");
        assert_eq!(info.viewport.width, 1280);
    }
}
