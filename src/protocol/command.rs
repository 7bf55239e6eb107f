//! DOM command definitions.
//!
//! A [`DomCommand`] asks the page context to act on its document. On the
//! wire it is a loose JSON object; [`DomCommand::from_value`] validates it in
//! a fixed order so the first problem found is the one reported:
//!
//! 1. the command must be a JSON object
//! 2. `action` must be present and name a known [`Action`]
//! 3. typed optional fields must have the right shape
//!
//! Selector presence and action-specific fields are checked by the executor,
//! right before use.
//!
//! # Wire Format
//!
//! ```json
//! { "action": "set_text", "selector": ".item", "all": true, "value": "done" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Action
// ============================================================================

/// Every action the executor understands.
///
/// Names are case-insensitive on receipt and normalized to uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Report URL, title and viewport. Ignores `selector`.
    PageInfo,
    /// Text content of one or all matches.
    ReadText,
    /// Inner HTML of one or all matches.
    ReadHtml,
    /// One attribute of the selected match.
    ReadAttr,
    /// Replace text content.
    SetText,
    /// Set a form value and synthesize `input`/`change`.
    SetValue,
    /// Set one attribute.
    SetAttr,
    /// Remove one attribute.
    RemoveAttr,
    /// Click the selected match.
    Click,
    /// Focus the selected match.
    Focus,
    /// Scroll the selected match into view.
    ScrollIntoView,
    /// Insert raw HTML relative to the selected match.
    InsertHtml,
    /// Remove one or all matches from the document.
    Remove,
    /// Apply the visual highlight marker.
    Highlight,
    /// Enumerate matches as serializable summaries.
    #[serde(alias = "INSPECT")]
    QueryAll,
}

impl Action {
    /// All actions, in catalog order.
    pub const ALL: [Action; 15] = [
        Self::PageInfo,
        Self::ReadText,
        Self::ReadHtml,
        Self::ReadAttr,
        Self::SetText,
        Self::SetValue,
        Self::SetAttr,
        Self::RemoveAttr,
        Self::Click,
        Self::Focus,
        Self::ScrollIntoView,
        Self::InsertHtml,
        Self::Remove,
        Self::Highlight,
        Self::QueryAll,
    ];

    /// Parses an action name, ignoring case and surrounding whitespace.
    ///
    /// `INSPECT` is accepted as an alias of [`Action::QueryAll`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAction`] for unknown names.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_uppercase();
        let action = match normalized.as_str() {
            "PAGE_INFO" => Self::PageInfo,
            "READ_TEXT" => Self::ReadText,
            "READ_HTML" => Self::ReadHtml,
            "READ_ATTR" => Self::ReadAttr,
            "SET_TEXT" => Self::SetText,
            "SET_VALUE" => Self::SetValue,
            "SET_ATTR" => Self::SetAttr,
            "REMOVE_ATTR" => Self::RemoveAttr,
            "CLICK" => Self::Click,
            "FOCUS" => Self::Focus,
            "SCROLL_INTO_VIEW" => Self::ScrollIntoView,
            "INSERT_HTML" => Self::InsertHtml,
            "REMOVE" => Self::Remove,
            "HIGHLIGHT" => Self::Highlight,
            "QUERY_ALL" | "INSPECT" => Self::QueryAll,
            _ => return Err(Error::unsupported_action(normalized)),
        };
        Ok(action)
    }

    /// Returns the canonical uppercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PageInfo => "PAGE_INFO",
            Self::ReadText => "READ_TEXT",
            Self::ReadHtml => "READ_HTML",
            Self::ReadAttr => "READ_ATTR",
            Self::SetText => "SET_TEXT",
            Self::SetValue => "SET_VALUE",
            Self::SetAttr => "SET_ATTR",
            Self::RemoveAttr => "REMOVE_ATTR",
            Self::Click => "CLICK",
            Self::Focus => "FOCUS",
            Self::ScrollIntoView => "SCROLL_INTO_VIEW",
            Self::InsertHtml => "INSERT_HTML",
            Self::Remove => "REMOVE",
            Self::Highlight => "HIGHLIGHT",
            Self::QueryAll => "QUERY_ALL",
        }
    }

    /// Returns `true` unless this is the page-info query.
    #[inline]
    #[must_use]
    pub const fn requires_selector(self) -> bool {
        !matches!(self, Self::PageInfo)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Option Enums
// ============================================================================

/// Where [`Action::InsertHtml`] places the fragment, relative to the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    /// Before the target, as a sibling.
    BeforeBegin,
    /// First child of the target.
    AfterBegin,
    /// Last child of the target.
    #[default]
    BeforeEnd,
    /// After the target, as a sibling.
    AfterEnd,
}

/// Scroll animation for [`Action::ScrollIntoView`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    /// Jump immediately.
    Auto,
    /// Animate.
    #[default]
    Smooth,
}

/// Vertical alignment for [`Action::ScrollIntoView`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBlock {
    /// Align to the top of the viewport.
    Start,
    /// Center in the viewport.
    #[default]
    Center,
    /// Align to the bottom of the viewport.
    End,
}

// ============================================================================
// DomCommand
// ============================================================================

/// A request to act on the DOM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomCommand {
    /// What to do.
    pub action: Action,

    /// CSS selector; required for everything except [`Action::PageInfo`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Zero-based match index (defaults to 0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Apply to every match instead of only the selected one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<bool>,

    /// Attribute name for attribute actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Value for set actions; any JSON value, stringified on use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Raw HTML for insertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// Insertion position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<InsertPosition>,

    /// Highlight duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Keep the highlight instead of scheduling its removal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,

    /// Maximum number of summaries for [`Action::QueryAll`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Scroll animation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior: Option<ScrollBehavior>,

    /// Scroll alignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<ScrollBlock>,
}

/// Typed view of everything except `action`.
#[derive(Debug, Default, Deserialize)]
struct CommandFields {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    all: Option<bool>,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    position: Option<InsertPosition>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    persistent: Option<bool>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    behavior: Option<ScrollBehavior>,
    #[serde(default)]
    block: Option<ScrollBlock>,
}

impl DomCommand {
    /// Creates a bare command for an action.
    #[must_use]
    pub fn new(action: Action) -> Self {
        Self {
            action,
            selector: None,
            index: None,
            all: None,
            attribute: None,
            value: None,
            html: None,
            position: None,
            duration: None,
            persistent: None,
            limit: None,
            behavior: None,
            block: None,
        }
    }

    /// Validates and normalizes a wire command.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCommand`] if `value` is not an object or a field has the wrong type
    /// - [`Error::UnsupportedAction`] if `action` is missing or unknown
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_command("command must be a JSON object"))?;

        let action = match object.get("action") {
            Some(Value::String(name)) => Action::parse(name)?,
            Some(Value::Null) | None => {
                return Err(Error::invalid_command("missing action"));
            }
            Some(other) => return Err(Error::unsupported_action(other.to_string())),
        };

        let fields: CommandFields = serde_json::from_value(value.clone())
            .map_err(|e| Error::invalid_command(e.to_string()))?;

        Ok(Self {
            action,
            selector: fields.selector,
            index: fields.index,
            all: fields.all,
            attribute: fields.attribute,
            value: fields.value,
            html: fields.html,
            position: fields.position,
            duration: fields.duration,
            persistent: fields.persistent,
            limit: fields.limit,
            behavior: fields.behavior,
            block: fields.block,
        })
    }

    /// Serializes the command into its wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Returns `true` when the command targets every match.
    #[inline]
    #[must_use]
    pub fn targets_all(&self) -> bool {
        self.all.unwrap_or(false)
    }

    /// Returns the selected match index.
    #[inline]
    #[must_use]
    pub fn target_index(&self) -> usize {
        self.index.unwrap_or(0)
    }

    /// Returns `value` as a string, stringifying non-string JSON.
    ///
    /// A missing or `null` value is the empty string.
    #[must_use]
    pub fn value_string(&self) -> String {
        match &self.value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

// ============================================================================
// DomCommand - Builders
// ============================================================================

impl DomCommand {
    /// Page URL, title and viewport.
    #[inline]
    #[must_use]
    pub fn page_info() -> Self {
        Self::new(Action::PageInfo)
    }

    /// Text of the first match.
    #[inline]
    #[must_use]
    pub fn read_text(selector: impl Into<String>) -> Self {
        Self::new(Action::ReadText).with_selector(selector)
    }

    /// Sets the selector.
    #[inline]
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Sets the match index.
    #[inline]
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Applies the action to every match.
    #[inline]
    #[must_use]
    pub fn with_all(mut self) -> Self {
        self.all = Some(true);
        self
    }

    /// Sets the attribute name.
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Sets the value.
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the HTML fragment and its position.
    #[inline]
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>, position: InsertPosition) -> Self {
        self.html = Some(html.into());
        self.position = Some(position);
        self
    }

    /// Sets the highlight duration in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, millis: u64) -> Self {
        self.duration = Some(millis);
        self
    }

    /// Keeps the highlight.
    #[inline]
    #[must_use]
    pub fn with_persistent(mut self) -> Self {
        self.persistent = Some(true);
        self
    }

    /// Caps the number of inspection summaries.
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
