//! Caller-side bridge.
//!
//! A [`BridgeClient`] lives in the embedded UI context. It posts commands to
//! its embedder and settles each pending request exactly once: with the
//! correlated result, or with a timeout.
//!
//! # Lifecycle of a request
//!
//! 1. `send` checks the client is enabled and the pending map has room
//! 2. A fresh [`RequestId`] is registered with a oneshot sender
//! 3. The command is posted to the embedder
//! 4. The listener task routes the matching result to the oneshot
//! 5. If nothing arrives within the timeout, the entry is removed and the
//!    caller gets [`Error::RequestTimeout`]; a result arriving afterwards
//!    finds no entry and is dropped
//!
//! The entry is owned by a guard for the whole wait, so a caller that drops
//! the `send` future (an outer timeout, a `select!` branch, an aborted task)
//! frees its slot as well.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ContextId, RequestId};
use crate::protocol::{BridgeMessage, DomCommand};
use crate::relay::is_controllable;

use super::channel::{Inbound, Inbox, MessagePort, TargetOrigin};

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to result channels.
type PendingMap = FxHashMap<RequestId, oneshot::Sender<Result<Value>>>;

/// The parent context commands are posted to.
#[derive(Debug, Clone)]
struct Embedder {
    context: ContextId,
    origin: TargetOrigin,
}

#[derive(Debug, Clone)]
enum State {
    Disabled(String),
    Enabled(Embedder),
}

struct Inner {
    port: Arc<dyn MessagePort>,
    config: BridgeConfig,
    state: Mutex<State>,
    pending: Mutex<PendingMap>,
}

/// Removes a pending entry when the request settles or is abandoned.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    request_id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.lock().remove(&self.request_id).is_some() {
            trace!(request_id = %self.request_id, "Pending request released");
        }
    }
}

// ============================================================================
// BridgeClient
// ============================================================================

/// Caller side of the bridge.
///
/// Cloning is cheap; clones share the pending map and enabled state.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<Inner>,
}

impl BridgeClient {
    /// Creates a disabled client posting through `port`.
    ///
    /// Call [`attach`](Self::attach) once the embedder is known.
    #[must_use]
    pub fn new(port: impl MessagePort + 'static, config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                port: Arc::new(port),
                config,
                state: Mutex::new(State::Disabled("not embedded in a page".to_string())),
                pending: Mutex::new(PendingMap::default()),
            }),
        }
    }

    /// Enables the client for an embedder at `parent_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BridgeDisabled`] if the parent page is not
    /// controllable; the client stays disabled.
    pub fn attach(&self, parent: ContextId, parent_url: &str) -> Result<()> {
        if !is_controllable(parent_url) {
            let reason = format!("parent page is not controllable: {parent_url}");
            *self.inner.state.lock() = State::Disabled(reason.clone());
            debug!(%parent, parent_url, "Bridge left disabled");
            return Err(Error::bridge_disabled(reason));
        }

        *self.inner.state.lock() = State::Enabled(Embedder {
            context: parent,
            origin: TargetOrigin::from_url(parent_url),
        });
        info!(%parent, parent_url, "Bridge enabled");
        Ok(())
    }

    /// Disables the client.
    ///
    /// In-flight requests fail right away with [`Error::BridgeDisabled`];
    /// results for them arriving later are dropped.
    pub fn detach(&self) {
        const REASON: &str = "detached from page";
        *self.inner.state.lock() = State::Disabled(REASON.to_string());
        self.fail_pending(|| Error::bridge_disabled(REASON));
        info!("Bridge detached");
    }

    /// Returns `true` when commands can be sent.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Enabled(_))
    }

    /// Returns the number of requests awaiting a result.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the client's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Sends a typed command and waits for its result.
    ///
    /// # Errors
    ///
    /// See [`send_raw`](Self::send_raw).
    pub async fn send(&self, command: &DomCommand) -> Result<Value> {
        self.send_raw(command.to_value()).await
    }

    /// Sends a raw command object and waits for its result.
    ///
    /// The command is not validated locally; the page reports malformed
    /// commands through the result envelope.
    ///
    /// # Errors
    ///
    /// - [`Error::BridgeDisabled`] if the client is not attached
    /// - [`Error::TooManyPending`] if the pending map is full
    /// - [`Error::Delivery`] if the embedder is gone
    /// - [`Error::RequestTimeout`] if no result arrives in time
    /// - [`Error::Remote`] if the page reports a failure
    pub async fn send_raw(&self, command: Value) -> Result<Value> {
        let embedder = match &*self.inner.state.lock() {
            State::Enabled(embedder) => embedder.clone(),
            State::Disabled(reason) => return Err(Error::bridge_disabled(reason.clone())),
        };

        let request_id = RequestId::generate();
        let (result_tx, result_rx) = oneshot::channel();

        // Check limit and register under one lock
        {
            let mut pending = self.inner.pending.lock();
            let max = self.inner.config.max_pending;
            if pending.len() >= max {
                warn!(pending = pending.len(), max, "Too many pending requests");
                return Err(Error::TooManyPending {
                    pending: pending.len(),
                    max,
                });
            }
            pending.insert(request_id.clone(), result_tx);
        }
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            request_id: request_id.clone(),
        };

        let message = BridgeMessage::Command {
            request_id: request_id.clone(),
            command,
        };
        self.inner
            .port
            .post(embedder.context, message, embedder.origin)?;
        trace!(%request_id, "Command posted");

        let wait = self.inner.config.request_timeout();
        match timeout(wait, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                debug!(%request_id, "Request timed out");
                Err(Error::request_timeout(
                    request_id,
                    self.inner.config.request_timeout_ms,
                ))
            }
        }
    }

    /// Routes one inbound message.
    ///
    /// Returns `true` if it settled a pending request. Anything else
    /// (commands, untrusted senders, late or unknown results) is dropped.
    pub fn handle_inbound(&self, inbound: Inbound) -> bool {
        let envelope = match inbound.message {
            BridgeMessage::Result(envelope) => envelope,
            other => {
                trace!(kind = other.kind(), "Ignoring non-result message");
                return false;
            }
        };

        let expected = match &*self.inner.state.lock() {
            State::Enabled(embedder) => embedder.context,
            State::Disabled(_) => {
                trace!(request_id = %envelope.request_id, "Result while disabled");
                return false;
            }
        };

        if let Err(rejection) =
            self.inner
                .config
                .trust
                .check(Some(expected), inbound.source, &inbound.origin)
        {
            debug!(request_id = %envelope.request_id, %rejection, "Dropping untrusted result");
            return false;
        }

        let removed = self.inner.pending.lock().remove(&envelope.request_id);
        let Some(result_tx) = removed else {
            trace!(request_id = %envelope.request_id, "No pending request for result");
            return false;
        };

        let _ = result_tx.send(envelope.into_result());
        true
    }

    /// Spawns the listener task draining `inbox`.
    ///
    /// When the inbox closes, every pending request fails with
    /// [`Error::ConnectionClosed`].
    pub fn listen(&self, mut inbox: Inbox) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(inbound) = inbox.recv().await {
                client.handle_inbound(inbound);
            }
            client.fail_pending(|| Error::ConnectionClosed);
            debug!("Client listener terminated");
        })
    }

    /// Fails all pending requests with the error `reason` builds.
    fn fail_pending(&self, reason: impl Fn() -> Error) {
        let pending: Vec<_> = self.inner.pending.lock().drain().collect();
        let count = pending.len();

        for (_, result_tx) in pending {
            let _ = result_tx.send(Err(reason()));
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::protocol::Envelope;
    use crate::transport::TrustPolicy;
    use crate::transport::channel::{LocalBus, LocalPort};

    const PARENT_URL: &str = "https://shop.test/cart";

    fn setup(config: BridgeConfig) -> (LocalBus, BridgeClient, Inbox, LocalPort, Inbox) {
        let bus = LocalBus::new();
        let (ui_port, ui_inbox) = bus.open("https://ui.test");
        let (page_port, page_inbox) = bus.open(PARENT_URL);
        let client = BridgeClient::new(ui_port, config);
        client.attach(page_port.context(), PARENT_URL).unwrap();
        (bus, client, ui_inbox, page_port, page_inbox)
    }

    async fn next_request(page_inbox: &mut Inbox) -> (ContextId, RequestId, Value) {
        let inbound = page_inbox.recv().await.unwrap();
        match inbound.message {
            BridgeMessage::Command { request_id, command } => (inbound.source, request_id, command),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_client_fails_without_posting() {
        let bus = LocalBus::new();
        let (ui_port, _ui_inbox) = bus.open("https://ui.test");
        let (_page_port, mut page_inbox) = bus.open(PARENT_URL);
        let client = BridgeClient::new(ui_port, BridgeConfig::default());

        let err = client.send(&DomCommand::page_info()).await.unwrap_err();
        assert!(matches!(err, Error::BridgeDisabled { .. }));
        assert!(page_inbox.try_recv().is_err());
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_attach_rejects_internal_parent() {
        let bus = LocalBus::new();
        let (ui_port, _ui_inbox) = bus.open("https://ui.test");
        let client = BridgeClient::new(ui_port, BridgeConfig::default());

        let err = client
            .attach(ContextId::next(), "chrome://settings")
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!client.is_enabled());
    }

    #[tokio::test]
    async fn test_result_settles_request() {
        let (_bus, client, ui_inbox, page_port, mut page_inbox) = setup(BridgeConfig::default());
        let _listener = client.listen(ui_inbox);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::read_text("h1")).await });

        let (source, request_id, command) = next_request(&mut page_inbox).await;
        assert_eq!(command, json!({"action": "READ_TEXT", "selector": "h1"}));
        page_port
            .post(
                source,
                BridgeMessage::Result(Envelope::ok(request_id, json!("Hello"))),
                TargetOrigin::Any,
            )
            .unwrap();

        assert_eq!(call.await.unwrap().unwrap(), json!("Hello"));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced_verbatim() {
        let (_bus, client, ui_inbox, page_port, mut page_inbox) = setup(BridgeConfig::default());
        let _listener = client.listen(ui_inbox);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::read_text(".x")).await });

        let (source, request_id, _) = next_request(&mut page_inbox).await;
        page_port
            .post(
                source,
                BridgeMessage::Result(Envelope::err(request_id, "no elements found for selector: .x")),
                TargetOrigin::Any,
            )
            .unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "no elements found for selector: .x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_result_is_dropped() {
        let config = BridgeConfig::builder()
            .request_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let (_bus, client, _ui_inbox, page_port, mut page_inbox) = setup(config);

        let err = client.send(&DomCommand::page_info()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending_count(), 0);

        let (_, request_id, _) = next_request(&mut page_inbox).await;
        let late = Inbound {
            source: page_port.context(),
            origin: "https://shop.test".to_string(),
            message: BridgeMessage::Result(Envelope::ok(request_id, json!(1))),
        };
        assert!(!client.handle_inbound(late));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_result_from_wrong_source_is_ignored() {
        let (bus, client, _ui_inbox, _page_port, mut page_inbox) = setup(BridgeConfig::default());
        let (stranger, _stranger_inbox) = bus.open(PARENT_URL);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::page_info()).await });
        let (_, request_id, _) = next_request(&mut page_inbox).await;

        let forged = Inbound {
            source: stranger.context(),
            origin: "https://shop.test".to_string(),
            message: BridgeMessage::Result(Envelope::ok(request_id, json!("forged"))),
        };
        assert!(!client.handle_inbound(forged));
        assert_eq!(client.pending_count(), 1);
        call.abort();
    }

    #[tokio::test]
    async fn test_allow_list_rejects_origin() {
        let config = BridgeConfig::builder()
            .trust(TrustPolicy::allow_list(["https://other.test"]))
            .build()
            .unwrap();
        let (_bus, client, _ui_inbox, page_port, mut page_inbox) = setup(config);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::page_info()).await });
        let (_, request_id, _) = next_request(&mut page_inbox).await;

        let inbound = Inbound {
            source: page_port.context(),
            origin: "https://shop.test".to_string(),
            message: BridgeMessage::Result(Envelope::ok(request_id, json!({}))),
        };
        assert!(!client.handle_inbound(inbound));
        call.abort();
    }

    #[tokio::test]
    async fn test_too_many_pending() {
        let config = BridgeConfig::builder().max_pending(1).build().unwrap();
        let (_bus, client, _ui_inbox, _page_port, mut page_inbox) = setup(config);

        let sender = client.clone();
        let first = tokio::spawn(async move { sender.send(&DomCommand::page_info()).await });
        let _ = next_request(&mut page_inbox).await;

        let err = client.send(&DomCommand::page_info()).await.unwrap_err();
        assert!(matches!(err, Error::TooManyPending { pending: 1, max: 1 }));
        first.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_sends_release_their_slots() {
        let config = BridgeConfig::builder().max_pending(3).build().unwrap();
        let (_bus, client, _ui_inbox, _page_port, mut page_inbox) = setup(config);

        for _ in 0..3 {
            let abandoned =
                timeout(Duration::from_millis(10), client.send(&DomCommand::page_info())).await;
            assert!(abandoned.is_err());
        }
        assert_eq!(client.pending_count(), 0);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::page_info()).await });
        for _ in 0..4 {
            let _ = next_request(&mut page_inbox).await;
        }
        assert_eq!(client.pending_count(), 1);

        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_post_failure_leaves_nothing_pending() {
        let (bus, client, _ui_inbox, page_port, _page_inbox) = setup(BridgeConfig::default());
        bus.close(page_port.context());

        assert!(client.send(&DomCommand::page_info()).await.is_err());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_fails_in_flight_requests() {
        let (_bus, client, ui_inbox, _page_port, mut page_inbox) = setup(BridgeConfig::default());
        let _listener = client.listen(ui_inbox);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::page_info()).await });
        let _ = next_request(&mut page_inbox).await;

        client.detach();
        assert!(!client.is_enabled());

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::BridgeDisabled { .. }));
        assert_eq!(err.to_string(), "bridge disabled: detached from page");
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_inbox_fails_pending() {
        let (bus, client, ui_inbox, _page_port, mut page_inbox) = setup(BridgeConfig::default());
        let listener = client.listen(ui_inbox);

        let sender = client.clone();
        let call = tokio::spawn(async move { sender.send(&DomCommand::page_info()).await });
        let _ = next_request(&mut page_inbox).await;

        bus.close(client.inner.port.context());
        listener.await.unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
