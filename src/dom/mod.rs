//! Page execution context.
//!
//! The executor never touches a concrete DOM. It drives a [`Document`],
//! which is whatever the hosting page provides: a `web-sys` document in a
//! content script, or the in-memory [`MemoryDocument`] used headless and in
//! tests.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `html` | Fragment parser and serializer |
//! | `memory` | Arena-backed [`MemoryDocument`] |
//! | `selector` | CSS selector subset |

// ============================================================================
// Submodules
// ============================================================================

/// HTML fragment parser and serializer.
pub mod html;

/// Arena-backed in-memory document.
pub mod memory;

/// CSS selector subset.
pub mod selector;

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::NodeId;
use crate::protocol::{InsertPosition, ScrollBehavior, ScrollBlock};

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{DomEvent, MemoryDocument};
pub use selector::Selector;

// ============================================================================
// Types
// ============================================================================

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Inner width.
    pub width: u32,
    /// Inner height.
    pub height: u32,
}

/// Snapshot reported by the page-info action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Current location.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Viewport dimensions.
    pub viewport: Viewport,
}

// ============================================================================
// Document
// ============================================================================

/// The live document a command runs against.
///
/// Node handles are only meaningful to the document that produced them.
/// Implementations must tolerate handles to nodes that were detached by an
/// earlier operation in the same batch.
pub trait Document: Send {
    /// Returns every element matching `selector`, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelector`](crate::Error::InvalidSelector) if the
    /// selector cannot be parsed.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>>;

    /// Lowercase tag name.
    fn tag_name(&self, node: NodeId) -> String;

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> String;

    /// Replaces all children with a single text node.
    fn set_text_content(&mut self, node: NodeId, text: &str);

    /// Serialized children.
    fn inner_html(&self, node: NodeId) -> String;

    /// Serialized node including its own tag.
    fn outer_html(&self, node: NodeId) -> String;

    /// One attribute value.
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// All attributes in source order.
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    /// Sets or replaces an attribute.
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    /// Removes an attribute, returning whether it existed.
    fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool;

    /// Returns `true` for elements with a `value` property (input, textarea, select).
    fn is_form_control(&self, node: NodeId) -> bool;

    /// Current `value` property of a form control.
    fn value(&self, node: NodeId) -> Option<String>;

    /// Sets the `value` property without dispatching events.
    fn set_value(&mut self, node: NodeId, value: &str);

    /// Dispatches a synthetic bubbling event.
    fn dispatch_event(&mut self, node: NodeId, event: &str);

    /// Activates the element.
    fn click(&mut self, node: NodeId);

    /// Moves focus to the element.
    fn focus(&mut self, node: NodeId);

    /// Scrolls the element into view.
    fn scroll_into_view(&mut self, node: NodeId, behavior: ScrollBehavior, block: ScrollBlock);

    /// Parses `html` and inserts it relative to `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is impossible (e.g. a sibling of the
    /// root element).
    fn insert_adjacent_html(
        &mut self,
        node: NodeId,
        position: InsertPosition,
        html: &str,
    ) -> Result<()>;

    /// Detaches the node from the document.
    fn remove(&mut self, node: NodeId);

    /// Adds a class token.
    fn add_class(&mut self, node: NodeId, class: &str);

    /// Removes a class token.
    fn remove_class(&mut self, node: NodeId, class: &str);

    /// Returns `true` if a style element with this id exists.
    fn has_style(&self, id: &str) -> bool;

    /// Appends a `<style id=...>` element to the head.
    fn inject_style(&mut self, id: &str, css: &str);

    /// URL, title and viewport.
    fn page_info(&self) -> PageInfo;
}
