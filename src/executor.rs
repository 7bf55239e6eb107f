//! Command executor.
//!
//! Runs one [`DomCommand`] against a [`Document`] and returns a JSON result.
//! Execution is synchronous; the only deferred work is removing a
//! transient highlight, which is scheduled on the ambient tokio runtime.
//!
//! # Validation order
//!
//! 1. The command is a JSON object
//! 2. `action` is present and known
//! 3. Unless the action is `PAGE_INFO`, `selector` is present and matches
//! 4. Action-specific fields (`attribute`, `html`) are checked just before use
//!
//! # Result shapes
//!
//! | Action | Result |
//! |--------|--------|
//! | `READ_TEXT`, `READ_HTML` | string, or array of strings with `all` |
//! | `READ_ATTR` | string or `null` |
//! | `SET_TEXT`, `SET_VALUE`, `SET_ATTR`, `REMOVE_ATTR` | `{"updated": n}` |
//! | `CLICK`, `FOCUS`, `SCROLL_INTO_VIEW`, `INSERT_HTML` | `{"clicked": true}` etc. |
//! | `REMOVE` | `{"removed": n}` |
//! | `HIGHLIGHT` | `{"highlighted": n}` |
//! | `QUERY_ALL` | `{"total": n, "elements": [ElementSummary]}` |
//! | `PAGE_INFO` | `{"url", "title", "viewport"}` |
//!
//! Batch actions (`all: true`) apply element by element. If a later element
//! fails, earlier elements keep their mutation.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::dom::Document;
use crate::error::{Error, Result};
use crate::identifiers::NodeId;
use crate::protocol::{Action, DomCommand};

// ============================================================================
// Constants
// ============================================================================

/// Id of the style element injected on first highlight.
pub const HIGHLIGHT_STYLE_ID: &str = "dom-bridge-highlight-style";

/// Marker class applied to highlighted elements.
pub const HIGHLIGHT_CLASS: &str = "dom-bridge-highlight";

const HIGHLIGHT_CSS: &str = ".dom-bridge-highlight { \
outline: 3px solid #ff9800 !important; \
outline-offset: 2px !important; \
background-color: rgba(255, 152, 0, 0.15) !important; \
transition: outline-color 0.2s ease-in-out; }";

// ============================================================================
// ElementSummary
// ============================================================================

/// JSON projection of one element for inspection results.
///
/// Element handles never leave the page context; callers get this instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSummary {
    /// Position among all matches.
    pub index: usize,
    /// Lowercase tag name.
    pub tag: String,
    /// Trimmed, truncated text content.
    pub text: String,
    /// Truncated outer HTML.
    pub html: String,
    /// Attributes by name.
    pub attributes: BTreeMap<String, String>,
}

// ============================================================================
// CommandExecutor
// ============================================================================

/// Executes DOM commands against a shared document.
///
/// Cloning is cheap; clones share the document.
pub struct CommandExecutor<D> {
    document: Arc<Mutex<D>>,
    highlight_duration: Duration,
    query_limit: usize,
    text_snippet_len: usize,
    html_snippet_len: usize,
}

impl<D> Clone for CommandExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            document: Arc::clone(&self.document),
            highlight_duration: self.highlight_duration,
            query_limit: self.query_limit,
            text_snippet_len: self.text_snippet_len,
            html_snippet_len: self.html_snippet_len,
        }
    }
}

impl<D: Document + 'static> CommandExecutor<D> {
    /// Creates an executor with default limits.
    #[must_use]
    pub fn new(document: D) -> Self {
        Self::with_config(document, &BridgeConfig::default())
    }

    /// Creates an executor using the limits from `config`.
    #[must_use]
    pub fn with_config(document: D, config: &BridgeConfig) -> Self {
        Self::from_shared(Arc::new(Mutex::new(document)), config)
    }

    /// Creates an executor over an already shared document.
    #[must_use]
    pub fn from_shared(document: Arc<Mutex<D>>, config: &BridgeConfig) -> Self {
        Self {
            document,
            highlight_duration: config.highlight_duration(),
            query_limit: config.query_limit,
            text_snippet_len: config.text_snippet_len,
            html_snippet_len: config.html_snippet_len,
        }
    }

    /// Returns the shared document.
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Arc<Mutex<D>> {
        &self.document
    }

    /// Validates and executes a wire command.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed commands, a not-found error
    /// when the selector matches nothing, or whatever the document reports.
    pub fn execute(&self, command: &Value) -> Result<Value> {
        let command = DomCommand::from_value(command)?;
        self.execute_command(&command)
    }

    /// Executes an already typed command.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub fn execute_command(&self, command: &DomCommand) -> Result<Value> {
        trace!(action = %command.action, selector = ?command.selector, "Executing command");

        let mut doc = self.document.lock();

        let (selector, matches) = if command.action.requires_selector() {
            select(&*doc, command)?
        } else {
            ("", Vec::new())
        };
        let result = match command.action {
            Action::PageInfo => serde_json::to_value(doc.page_info())?,
            Action::ReadText => read_each(&*doc, command, &matches, selector, |d, n| {
                d.text_content(n)
            })?,
            Action::ReadHtml => read_each(&*doc, command, &matches, selector, |d, n| {
                d.inner_html(n)
            })?,
            Action::ReadAttr => {
                let attribute = require_attribute(command)?;
                let node = pick(command, &matches, selector)?;
                doc.attribute(node, attribute)
                    .map_or(Value::Null, Value::String)
            }
            Action::SetText => {
                let text = command.value_string();
                let nodes = targets(command, &matches, selector)?;
                for node in &nodes {
                    doc.set_text_content(*node, &text);
                }
                json!({ "updated": nodes.len() })
            }
            Action::SetValue => {
                let value = command.value_string();
                let nodes = targets(command, &matches, selector)?;
                for node in &nodes {
                    set_value(&mut *doc, *node, &value);
                }
                json!({ "updated": nodes.len() })
            }
            Action::SetAttr => {
                let attribute = require_attribute(command)?;
                let value = command.value_string();
                let nodes = targets(command, &matches, selector)?;
                for node in &nodes {
                    doc.set_attribute(*node, attribute, &value);
                }
                json!({ "updated": nodes.len() })
            }
            Action::RemoveAttr => {
                let attribute = require_attribute(command)?;
                let nodes = targets(command, &matches, selector)?;
                for node in &nodes {
                    doc.remove_attribute(*node, attribute);
                }
                json!({ "updated": nodes.len() })
            }
            Action::Click => {
                doc.click(pick(command, &matches, selector)?);
                json!({ "clicked": true })
            }
            Action::Focus => {
                doc.focus(pick(command, &matches, selector)?);
                json!({ "focused": true })
            }
            Action::ScrollIntoView => {
                let node = pick(command, &matches, selector)?;
                doc.scroll_into_view(
                    node,
                    command.behavior.unwrap_or_default(),
                    command.block.unwrap_or_default(),
                );
                json!({ "scrolled": true })
            }
            Action::InsertHtml => {
                let html = command
                    .html
                    .as_deref()
                    .ok_or_else(|| Error::missing_field("html", command.action.as_str()))?;
                let node = pick(command, &matches, selector)?;
                doc.insert_adjacent_html(node, command.position.unwrap_or_default(), html)?;
                json!({ "inserted": true })
            }
            Action::Remove => {
                let nodes = targets(command, &matches, selector)?;
                for node in &nodes {
                    doc.remove(*node);
                }
                json!({ "removed": nodes.len() })
            }
            Action::Highlight => {
                let nodes = targets(command, &matches, selector)?;
                if !doc.has_style(HIGHLIGHT_STYLE_ID) {
                    doc.inject_style(HIGHLIGHT_STYLE_ID, HIGHLIGHT_CSS);
                }
                for node in &nodes {
                    doc.add_class(*node, HIGHLIGHT_CLASS);
                }
                let count = nodes.len();
                if !command.persistent.unwrap_or(false) {
                    let duration = command
                        .duration
                        .map_or(self.highlight_duration, Duration::from_millis);
                    self.schedule_unhighlight(nodes, duration);
                }
                json!({ "highlighted": count })
            }
            Action::QueryAll => {
                let limit = command.limit.unwrap_or(self.query_limit);
                let elements: Vec<ElementSummary> = matches
                    .iter()
                    .take(limit)
                    .enumerate()
                    .map(|(index, node)| self.summarize(&*doc, index, *node))
                    .collect();
                json!({ "total": matches.len(), "elements": elements })
            }
        };

        debug!(action = %command.action, matched = matches.len(), "Command executed");
        Ok(result)
    }

    /// Projects one element into a summary.
    fn summarize(&self, doc: &D, index: usize, node: NodeId) -> ElementSummary {
        ElementSummary {
            index,
            tag: doc.tag_name(node),
            text: truncate(doc.text_content(node).trim(), self.text_snippet_len),
            html: truncate(&doc.outer_html(node), self.html_snippet_len),
            attributes: doc.attributes(node).into_iter().collect(),
        }
    }

    /// Removes the highlight class after `duration`.
    fn schedule_unhighlight(&self, nodes: Vec<NodeId>, duration: Duration) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime; highlight will not be cleared");
            return;
        };
        let document = Arc::clone(&self.document);
        handle.spawn(async move {
            tokio::time::sleep(duration).await;
            let mut doc = document.lock();
            for node in &nodes {
                doc.remove_class(*node, HIGHLIGHT_CLASS);
            }
            trace!(count = nodes.len(), "Highlight cleared");
        });
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves the selector to its matches, failing when there are none.
fn select<'c, D: Document>(doc: &D, command: &'c DomCommand) -> Result<(&'c str, Vec<NodeId>)> {
    let selector = command
        .selector
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::missing_field("selector", command.action.as_str()))?;
    let matches = doc.query_selector_all(selector)?;
    if matches.is_empty() {
        return Err(Error::no_elements(selector));
    }
    Ok((selector, matches))
}

/// The element at `index`.
fn pick(command: &DomCommand, matches: &[NodeId], selector: &str) -> Result<NodeId> {
    let index = command.target_index();
    matches
        .get(index)
        .copied()
        .ok_or_else(|| Error::index_out_of_range(selector, index, matches.len()))
}

/// Every match with `all`, otherwise the indexed one.
fn targets(command: &DomCommand, matches: &[NodeId], selector: &str) -> Result<Vec<NodeId>> {
    if command.targets_all() {
        Ok(matches.to_vec())
    } else {
        pick(command, matches, selector).map(|node| vec![node])
    }
}

fn read_each<D: Document>(
    doc: &D,
    command: &DomCommand,
    matches: &[NodeId],
    selector: &str,
    read: impl Fn(&D, NodeId) -> String,
) -> Result<Value> {
    if command.targets_all() {
        let values: Vec<Value> = matches
            .iter()
            .map(|node| Value::String(read(doc, *node)))
            .collect();
        return Ok(Value::Array(values));
    }
    let node = pick(command, matches, selector)?;
    Ok(Value::String(read(doc, node)))
}

fn require_attribute(command: &DomCommand) -> Result<&str> {
    command
        .attribute
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::missing_field("attribute", command.action.as_str()))
}

/// Form controls get a property write plus `input` and `change`; anything
/// else gets its text replaced.
fn set_value<D: Document>(doc: &mut D, node: NodeId, value: &str) {
    if doc.is_form_control(node) {
        doc.set_value(node, value);
        doc.dispatch_event(node, "input");
        doc.dispatch_event(node, "change");
    } else {
        doc.set_text_content(node, value);
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((end, _)) => input[..end].to_string(),
        None => input.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dom::{DomEvent, MemoryDocument};
    use crate::protocol::InsertPosition;

    const PAGE: &str = r#"<h1>Hello</h1>
<ul><li class="item">one</li><li class="item">two</li><li class="item">three</li></ul>
<form><input id="q" name="q" value=""><div id="x" data-k="v">box</div></form>"#;

    fn executor() -> CommandExecutor<MemoryDocument> {
        CommandExecutor::new(
            MemoryDocument::from_html(PAGE)
                .with_url("https://example.test/page")
                .with_title("Example"),
        )
    }

    #[test]
    fn test_read_text_round_trip() {
        let exec = executor();
        let result = exec.execute(&json!({"action": "READ_TEXT", "selector": "h1"})).unwrap();
        assert_eq!(result, json!("Hello"));
    }

    #[test]
    fn test_action_is_case_insensitive() {
        let exec = executor();
        let result = exec.execute(&json!({"action": "read_text", "selector": "h1"})).unwrap();
        assert_eq!(result, json!("Hello"));
    }

    #[test]
    fn test_read_text_all() {
        let exec = executor();
        let result = exec
            .execute(&json!({"action": "READ_TEXT", "selector": ".item", "all": true}))
            .unwrap();
        assert_eq!(result, json!(["one", "two", "three"]));
    }

    #[test]
    fn test_unsupported_action_does_not_mutate() {
        let exec = executor();
        let before = exec.document().lock().body_html();
        let err = exec.execute(&json!({"action": "EXPLODE", "selector": "h1"})).unwrap_err();
        assert_eq!(err.to_string(), "unsupported action: EXPLODE");
        assert_eq!(exec.document().lock().body_html(), before);
    }

    #[test]
    fn test_non_object_command() {
        let exec = executor();
        assert!(exec.execute(&Value::Null).unwrap_err().is_validation());
        assert!(exec.execute(&json!("READ_TEXT")).unwrap_err().is_validation());
    }

    #[test]
    fn test_no_elements() {
        let exec = executor();
        let err = exec.execute(&json!({"action": "CLICK", "selector": ".missing"})).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no elements found for selector: .missing");
    }

    #[test]
    fn test_missing_selector() {
        let exec = executor();
        let err = exec.execute(&json!({"action": "READ_TEXT"})).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_page_info_ignores_selector() {
        let exec = executor();
        let result = exec
            .execute(&json!({"action": "PAGE_INFO", "selector": ".does-not-exist"}))
            .unwrap();
        assert_eq!(result["url"], "https://example.test/page");
        assert_eq!(result["title"], "Example");
        assert_eq!(result["viewport"]["width"], 1280);
    }

    #[test]
    fn test_index_selects_match() {
        let exec = executor();
        let result = exec
            .execute(&json!({"action": "READ_TEXT", "selector": ".item", "index": 2}))
            .unwrap();
        assert_eq!(result, json!("three"));

        let err = exec
            .execute(&json!({"action": "READ_TEXT", "selector": ".item", "index": 3}))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_attr_idempotent() {
        let exec = executor();
        let cmd = json!({"action": "SET_ATTR", "selector": "#x", "attribute": "data-y", "value": "1"});
        exec.execute(&cmd).unwrap();
        exec.execute(&cmd).unwrap();
        let read = exec
            .execute(&json!({"action": "READ_ATTR", "selector": "#x", "attribute": "data-y"}))
            .unwrap();
        assert_eq!(read, json!("1"));
    }

    #[test]
    fn test_read_attr_missing_is_null() {
        let exec = executor();
        let read = exec
            .execute(&json!({"action": "READ_ATTR", "selector": "#x", "attribute": "nope"}))
            .unwrap();
        assert_eq!(read, Value::Null);
    }

    #[test]
    fn test_attribute_required_after_selector() {
        let exec = executor();
        let err = exec.execute(&json!({"action": "READ_ATTR", "selector": "#x"})).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "attribute", .. }));

        let err = exec.execute(&json!({"action": "READ_ATTR", "selector": "#nope"})).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_text_batch() {
        let exec = executor();
        let result = exec
            .execute(&json!({"action": "SET_TEXT", "selector": ".item", "all": true, "value": "done"}))
            .unwrap();
        assert_eq!(result, json!({"updated": 3}));
        let texts = exec
            .execute(&json!({"action": "READ_TEXT", "selector": ".item", "all": true}))
            .unwrap();
        assert_eq!(texts, json!(["done", "done", "done"]));
    }

    #[test]
    fn test_set_value_dispatches_events() {
        let exec = executor();
        exec.execute(&json!({"action": "SET_VALUE", "selector": "#q", "value": 42}))
            .unwrap();

        let doc = exec.document().lock();
        let input = doc.query_selector_all("#q").unwrap()[0];
        assert_eq!(doc.value(input).as_deref(), Some("42"));
        let kinds: Vec<&str> = doc
            .events()
            .iter()
            .filter_map(|e| match e {
                DomEvent::Dispatched { event, .. } => Some(event.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, ["input", "change"]);
    }

    #[test]
    fn test_set_value_on_plain_element_sets_text() {
        let exec = executor();
        exec.execute(&json!({"action": "SET_VALUE", "selector": "#x", "value": "hi"}))
            .unwrap();
        let text = exec.execute(&json!({"action": "READ_TEXT", "selector": "#x"})).unwrap();
        assert_eq!(text, json!("hi"));
    }

    #[test]
    fn test_remove_attr_and_remove() {
        let exec = executor();
        let result = exec
            .execute(&json!({"action": "REMOVE_ATTR", "selector": "#x", "attribute": "data-k"}))
            .unwrap();
        assert_eq!(result, json!({"updated": 1}));

        let result = exec
            .execute(&json!({"action": "REMOVE", "selector": ".item", "all": true}))
            .unwrap();
        assert_eq!(result, json!({"removed": 3}));
        assert!(exec.execute(&json!({"action": "READ_TEXT", "selector": ".item"})).is_err());
    }

    #[test]
    fn test_interactions() {
        let exec = executor();
        assert_eq!(
            exec.execute(&json!({"action": "CLICK", "selector": "h1"})).unwrap(),
            json!({"clicked": true})
        );
        assert_eq!(
            exec.execute(&json!({"action": "FOCUS", "selector": "#q"})).unwrap(),
            json!({"focused": true})
        );
        assert_eq!(
            exec.execute(&json!({"action": "SCROLL_INTO_VIEW", "selector": "#x", "block": "end"}))
                .unwrap(),
            json!({"scrolled": true})
        );
        let doc = exec.document().lock();
        assert_eq!(doc.events().len(), 3);
        assert!(doc.focused().is_some());
    }

    #[test]
    fn test_insert_html() {
        let exec = executor();
        let err = exec.execute(&json!({"action": "INSERT_HTML", "selector": "h1"})).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "html", .. }));

        let cmd = DomCommand::new(Action::InsertHtml)
            .with_selector("h1")
            .with_html("<p id=\"after\">x</p>", InsertPosition::AfterEnd);
        assert_eq!(exec.execute_command(&cmd).unwrap(), json!({"inserted": true}));
        assert!(exec.execute(&json!({"action": "READ_TEXT", "selector": "#after"})).is_ok());
    }

    #[test]
    fn test_query_all_projection() {
        let exec = CommandExecutor::with_config(
            MemoryDocument::from_html(PAGE),
            &BridgeConfig::builder().snippet_lengths(3, 300).build().unwrap(),
        );
        let result = exec
            .execute(&json!({"action": "INSPECT", "selector": ".item", "limit": 2}))
            .unwrap();
        assert_eq!(result["total"], 3);
        let elements = result["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1]["index"], 1);
        assert_eq!(elements[1]["tag"], "li");
        assert_eq!(elements[1]["text"], "two");
        assert_eq!(elements[0]["html"], r#"<li class="item">one</li>"#);
        assert_eq!(elements[0]["attributes"]["class"], "item");
    }

    #[test]
    fn test_persistent_highlight() {
        let exec = executor();
        let result = exec
            .execute(&json!({"action": "HIGHLIGHT", "selector": ".item", "all": true, "persistent": true}))
            .unwrap();
        assert_eq!(result, json!({"highlighted": 3}));
        let doc = exec.document().lock();
        assert!(doc.has_style(HIGHLIGHT_STYLE_ID));
        assert_eq!(doc.query_selector_all(".dom-bridge-highlight").unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_highlight_is_cleared() {
        let exec = executor();
        exec.execute(&json!({"action": "HIGHLIGHT", "selector": "h1", "duration": 500}))
            .unwrap();
        assert_eq!(
            exec.document().lock().query_selector_all(".dom-bridge-highlight").unwrap().len(),
            1
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(
            exec.document()
                .lock()
                .query_selector_all(".dom-bridge-highlight")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
