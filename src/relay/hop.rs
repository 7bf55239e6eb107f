//! Relay hop.
//!
//! Forwards a command from a context with no DOM access (side panel,
//! popup window) into whichever browser tab is currently controllable.
//!
//! # Resolution order
//!
//! 1. The explicitly requested tab, if still controllable
//! 2. The tab remembered by the [`TargetTracker`]
//! 3. The active tab of the focused window
//! 4. Any active tab
//! 5. Otherwise [`Error::NoControllableTarget`]
//!
//! Every candidate is re-fetched and re-validated before use. Dispatch
//! failures are folded into the returned [`Envelope`], so callers always
//! get a structured outcome.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::{RequestId, TabId};
use crate::protocol::{BridgeMessage, Envelope};

use super::target::{TabInfo, TargetTracker};

// ============================================================================
// TabBrowser
// ============================================================================

/// Browser tab API the relay drives.
#[async_trait]
pub trait TabBrowser: Send + Sync {
    /// Looks up one tab; `None` if it no longer exists.
    async fn get_tab(&self, id: TabId) -> Option<TabInfo>;

    /// Active tabs, restricted to the focused window when `current_window`.
    async fn query_active(&self, current_window: bool) -> Vec<TabInfo>;

    /// Delivers a message to the tab's content script and returns its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] when the tab is gone or nothing listens.
    async fn send_to_tab(&self, id: TabId, message: BridgeMessage) -> Result<Envelope>;
}

// ============================================================================
// RelayOptions
// ============================================================================

/// Per-call relay options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOptions {
    /// Tab the caller wants; falls back through the resolution order.
    pub tab_id: Option<TabId>,
}

impl RelayOptions {
    /// Targets a specific tab.
    #[inline]
    #[must_use]
    pub fn tab(id: TabId) -> Self {
        Self { tab_id: Some(id) }
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Resolves a controllable tab and forwards commands to it.
pub struct Relay<B> {
    browser: B,
    tracker: Arc<TargetTracker>,
    dispatch_timeout: Duration,
}

impl<B: TabBrowser> Relay<B> {
    /// Creates a relay over `browser` using an injected tracker.
    #[must_use]
    pub fn new(browser: B, tracker: Arc<TargetTracker>, config: &BridgeConfig) -> Self {
        Self {
            browser,
            tracker,
            dispatch_timeout: config.request_timeout(),
        }
    }

    /// The remembered-target tracker.
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &Arc<TargetTracker> {
        &self.tracker
    }

    /// The browser seam.
    #[inline]
    #[must_use]
    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Picks the tab a command should run in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoControllableTarget`] when no candidate qualifies.
    pub async fn resolve_target(&self, requested: Option<TabId>) -> Result<TabId> {
        if let Some(id) = requested
            && self.still_controllable(id).await
        {
            trace!(tab = %id, "Using requested tab");
            return Ok(id);
        }

        if let Some(id) = self.tracker.remembered()
            && self.still_controllable(id).await
        {
            trace!(tab = %id, "Using remembered tab");
            return Ok(id);
        }

        for current_window in [true, false] {
            let candidates = self.browser.query_active(current_window).await;
            if let Some(tab) = candidates.into_iter().find(TabInfo::is_controllable) {
                trace!(tab = %tab.id, current_window, "Using active tab");
                return Ok(tab.id);
            }
        }

        debug!(?requested, "No controllable target");
        Err(Error::NoControllableTarget)
    }

    /// Forwards `command` and returns the tab's envelope.
    ///
    /// Resolution and delivery failures become failed envelopes.
    pub async fn relay(
        &self,
        request_id: RequestId,
        command: Value,
        options: RelayOptions,
    ) -> Envelope {
        match self.dispatch(&request_id, command, options).await {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%request_id, error = %e, "Relay failed");
                Envelope::from_result(request_id, Err(e))
            }
        }
    }

    /// Handles a relay-bearing message; other kinds are ignored.
    pub async fn handle(&self, message: BridgeMessage) -> Option<Envelope> {
        match message {
            BridgeMessage::Relay {
                request_id,
                command,
                tab_id,
            } => Some(self.relay(request_id, command, RelayOptions { tab_id }).await),
            other => {
                trace!(kind = other.kind(), "Relay ignoring message");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        request_id: &RequestId,
        command: Value,
        options: RelayOptions,
    ) -> Result<Envelope> {
        let tab = self.resolve_target(options.tab_id).await?;
        let message = BridgeMessage::Command {
            request_id: request_id.clone(),
            command,
        };

        let timeout_ms = u64::try_from(self.dispatch_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut envelope = timeout(self.dispatch_timeout, self.browser.send_to_tab(tab, message))
            .await
            .map_err(|_| Error::request_timeout(request_id.clone(), timeout_ms))??;

        // Correlate to the caller's ID whatever the tab echoed
        envelope.request_id = request_id.clone();
        trace!(%request_id, tab = %tab, success = envelope.success, "Relay answered");
        Ok(envelope)
    }

    async fn still_controllable(&self, id: TabId) -> bool {
        self.browser
            .get_tab(id)
            .await
            .is_some_and(|tab| tab.is_controllable())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct FakeBrowser {
        tabs: Vec<(TabInfo, bool)>,
        sent: Mutex<Vec<TabId>>,
        fail_delivery: bool,
    }

    impl FakeBrowser {
        fn with_tab(mut self, id: u32, url: &str, active: bool, focused_window: bool) -> Self {
            let info = TabInfo {
                id: TabId::new(id).unwrap(),
                url: Some(url.to_string()),
                active,
            };
            self.tabs.push((info, focused_window));
            self
        }
    }

    #[async_trait]
    impl TabBrowser for FakeBrowser {
        async fn get_tab(&self, id: TabId) -> Option<TabInfo> {
            self.tabs.iter().find(|(t, _)| t.id == id).map(|(t, _)| t.clone())
        }

        async fn query_active(&self, current_window: bool) -> Vec<TabInfo> {
            self.tabs
                .iter()
                .filter(|(t, focused)| t.active && (!current_window || *focused))
                .map(|(t, _)| t.clone())
                .collect()
        }

        async fn send_to_tab(&self, id: TabId, message: BridgeMessage) -> Result<Envelope> {
            self.sent.lock().push(id);
            if self.fail_delivery {
                return Err(Error::delivery("Receiving end does not exist."));
            }
            Ok(Envelope::ok(message.request_id().clone(), json!({"tab": id.get()})))
        }
    }

    fn relay(browser: FakeBrowser) -> Relay<FakeBrowser> {
        Relay::new(browser, Arc::new(TargetTracker::new()), &BridgeConfig::default())
    }

    fn id(n: u32) -> TabId {
        TabId::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_focused_page_is_resolved() {
        let relay = relay(FakeBrowser::default().with_tab(5, "https://a.test", true, true));
        assert_eq!(relay.resolve_target(None).await.unwrap(), id(5));
    }

    #[tokio::test]
    async fn test_no_controllable_target() {
        let relay = relay(
            FakeBrowser::default()
                .with_tab(1, "chrome://newtab", true, true)
                .with_tab(2, "file:///x", true, false),
        );
        let err = relay.resolve_target(None).await.unwrap_err();
        assert_eq!(err.to_string(), "no controllable target");
    }

    #[tokio::test]
    async fn test_requested_tab_wins_when_controllable() {
        let relay = relay(
            FakeBrowser::default()
                .with_tab(1, "https://focused.test", true, true)
                .with_tab(2, "https://background.test", false, false),
        );
        assert_eq!(relay.resolve_target(Some(id(2))).await.unwrap(), id(2));
    }

    #[tokio::test]
    async fn test_stale_request_falls_back_to_remembered() {
        let relay = relay(
            FakeBrowser::default()
                .with_tab(1, "https://focused.test", true, true)
                .with_tab(2, "about:blank", false, false)
                .with_tab(3, "https://remembered.test", false, false),
        );
        relay.tracker().on_activated(&TabInfo::active(id(3), "https://remembered.test"));

        assert_eq!(relay.resolve_target(Some(id(2))).await.unwrap(), id(3));
        assert_eq!(relay.resolve_target(Some(id(99))).await.unwrap(), id(3));
    }

    #[tokio::test]
    async fn test_falls_back_to_any_active() {
        let relay = relay(
            FakeBrowser::default()
                .with_tab(1, "chrome://extensions", true, true)
                .with_tab(2, "https://other-window.test", true, false),
        );
        assert_eq!(relay.resolve_target(None).await.unwrap(), id(2));
    }

    #[tokio::test]
    async fn test_relay_answers_with_caller_id() {
        let relay = relay(FakeBrowser::default().with_tab(5, "https://a.test", true, true));
        let envelope = relay
            .relay(RequestId::new("r1"), json!({"action": "PAGE_INFO"}), RelayOptions::default())
            .await;
        assert!(envelope.success);
        assert_eq!(envelope.request_id, RequestId::new("r1"));
        assert_eq!(envelope.result, Some(json!({"tab": 5})));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_structured() {
        let mut browser = FakeBrowser::default().with_tab(5, "https://a.test", true, true);
        browser.fail_delivery = true;
        let relay = relay(browser);

        let envelope = relay
            .handle(BridgeMessage::Relay {
                request_id: RequestId::new("r2"),
                command: json!({"action": "CLICK", "selector": "a"}),
                tab_id: None,
            })
            .await
            .unwrap();
        assert!(!envelope.success);
        assert!(envelope.error.unwrap().contains("Receiving end does not exist."));
        assert_eq!(relay.browser().sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_no_target_is_structured() {
        let relay = relay(FakeBrowser::default());
        let envelope = relay
            .relay(RequestId::new("r3"), json!({"action": "PAGE_INFO"}), RelayOptions::tab(id(1)))
            .await;
        assert_eq!(envelope.error.as_deref(), Some("no controllable target"));
    }
}
