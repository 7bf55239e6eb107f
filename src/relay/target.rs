//! Target controllability and remembered-target tracking.
//!
//! A page is controllable when it is an ordinary web page. Browser-internal
//! pages, extension pages, local files and the extension store never
//! receive commands.
//!
//! [`TargetTracker`] caches the last controllable tab seen through browser
//! events. It is a hint only; the relay re-validates it before use.
//!
//! # State machine
//!
//! ```text
//!            activated / navigated / focused (controllable)
//!   Idle ──────────────────────────────────────────────► Updated(tab)
//!   Cleared ───────────────────────────────────────────► Updated(tab)
//!   Updated(a) ────────────────────────────────────────► Updated(b)
//!   Updated(tab) ── tab closed ────────────────────────► Cleared
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use crate::identifiers::TabId;

// ============================================================================
// Constants
// ============================================================================

/// URL prefixes that are never controllable.
const BANNED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "chromewebstore.google.com",
    "edge://",
    "about:",
    "file://",
];

/// Extension store host.
const STORE_HOST: &str = "chromewebstore.google.com";

// ============================================================================
// Controllability
// ============================================================================

/// Returns `true` if `url` is an ordinary `http(s)` page outside the store.
#[must_use]
pub fn is_controllable(url: &str) -> bool {
    if url.is_empty() || BANNED_PREFIXES.iter().any(|p| url.starts_with(p)) {
        return false;
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return false;
    }
    Url::parse(url).is_ok_and(|parsed| parsed.host_str().is_some_and(|h| h != STORE_HOST))
}

// ============================================================================
// TabInfo
// ============================================================================

/// What the relay needs to know about a browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    /// Browser tab ID.
    pub id: TabId,
    /// Current location; `None` when the browser withholds it.
    #[serde(default)]
    pub url: Option<String>,
    /// Active tab of its window.
    #[serde(default)]
    pub active: bool,
}

impl TabInfo {
    /// Creates an active tab at `url`.
    #[must_use]
    pub fn active(id: TabId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: Some(url.into()),
            active: true,
        }
    }

    /// Returns `true` if the tab's location is controllable.
    #[inline]
    #[must_use]
    pub fn is_controllable(&self) -> bool {
        self.url.as_deref().is_some_and(is_controllable)
    }
}

// ============================================================================
// TargetTracker
// ============================================================================

/// Remembered-target state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackerState {
    /// Nothing observed yet.
    #[default]
    Idle,
    /// Last controllable tab seen.
    Updated(TabId),
    /// The remembered tab was closed.
    Cleared,
}

/// Event-driven cache of the most recent controllable tab.
#[derive(Debug, Default)]
pub struct TargetTracker {
    state: Mutex<TrackerState>,
}

impl TargetTracker {
    /// Creates an idle tracker.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TrackerState {
        *self.state.lock()
    }

    /// The remembered tab, if any.
    #[inline]
    #[must_use]
    pub fn remembered(&self) -> Option<TabId> {
        match self.state() {
            TrackerState::Updated(id) => Some(id),
            TrackerState::Idle | TrackerState::Cleared => None,
        }
    }

    /// A tab became active.
    pub fn on_activated(&self, tab: &TabInfo) {
        self.observe(tab, "activated");
    }

    /// A tab finished loading.
    pub fn on_navigation_complete(&self, tab: &TabInfo) {
        self.observe(tab, "navigation complete");
    }

    /// Window focus moved; `tab` is the focused window's active tab.
    pub fn on_focus_changed(&self, tab: Option<&TabInfo>) {
        if let Some(tab) = tab {
            self.observe(tab, "focus changed");
        }
    }

    /// A tab was closed.
    pub fn on_closed(&self, id: TabId) {
        let mut state = self.state.lock();
        if *state == TrackerState::Updated(id) {
            *state = TrackerState::Cleared;
            trace!(tab = %id, "Remembered tab closed");
        }
    }

    fn observe(&self, tab: &TabInfo, event: &'static str) {
        if !tab.is_controllable() {
            return;
        }
        *self.state.lock() = TrackerState::Updated(tab.id);
        trace!(tab = %tab.id, event, "Remembered tab updated");
    }
}

// ============================================================================
// Tests
// ============================================================================
