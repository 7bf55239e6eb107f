//! Page-relay listener.
//!
//! Runs in the page's own context. Each command-bearing message is executed
//! in place and answered with a correlated [`Envelope`] posted back to the
//! sender's context.
//!
//! Replies target the command's origin. When that origin is opaque the
//! reply goes to `*` unless the configuration disables the fallback; this
//! keeps sandboxed and `about:blank` frames working and is not a security
//! boundary.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::dom::Document;
use crate::executor::CommandExecutor;
use crate::protocol::{BridgeMessage, Envelope};

use super::channel::{Inbound, Inbox, MessagePort, TargetOrigin};
use super::trust::TrustPolicy;

// ============================================================================
// PageListener
// ============================================================================

/// Executes inbound commands and answers their senders.
pub struct PageListener<D> {
    port: Arc<dyn MessagePort>,
    executor: CommandExecutor<D>,
    trust: TrustPolicy,
    reply_to_any_origin_fallback: bool,
}

impl<D: Document + 'static> PageListener<D> {
    /// Creates a listener posting replies through `port`.
    #[must_use]
    pub fn new(
        port: impl MessagePort + 'static,
        executor: CommandExecutor<D>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            port: Arc::new(port),
            executor,
            trust: config.trust.clone(),
            reply_to_any_origin_fallback: config.reply_to_any_origin_fallback,
        }
    }

    /// Returns the executor commands run on.
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &CommandExecutor<D> {
        &self.executor
    }

    /// Handles one inbound message.
    ///
    /// Returns the envelope that was posted, or `None` when the message was
    /// not a command, came from an untrusted origin, or had nowhere to go.
    pub fn handle_inbound(&self, inbound: Inbound) -> Option<Envelope> {
        let (request_id, command) = match inbound.message {
            BridgeMessage::Command {
                request_id,
                command,
            } => (request_id, command),
            other => {
                trace!(kind = other.kind(), "Page listener ignoring message");
                return None;
            }
        };

        if let Err(rejection) = self.trust.check(None, inbound.source, &inbound.origin) {
            debug!(%request_id, %rejection, "Dropping untrusted command");
            return None;
        }

        let envelope = Envelope::from_result(request_id, self.executor.execute(&command));

        let target_origin = if inbound.origin.is_empty() || inbound.origin == "null" {
            if !self.reply_to_any_origin_fallback {
                debug!(request_id = %envelope.request_id, "Sender origin opaque, reply dropped");
                return None;
            }
            TargetOrigin::Any
        } else {
            TargetOrigin::Exact(inbound.origin)
        };

        if let Err(e) = self.port.post(
            inbound.source,
            BridgeMessage::Result(envelope.clone()),
            target_origin,
        ) {
            warn!(request_id = %envelope.request_id, error = %e, "Failed to post reply");
        }

        trace!(
            request_id = %envelope.request_id,
            success = envelope.success,
            "Reply posted"
        );
        Some(envelope)
    }

    /// Spawns the listener task draining `inbox`.
    pub fn listen(self, mut inbox: Inbox) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(inbound) = inbox.recv().await {
                self.handle_inbound(inbound);
            }
            debug!("Page listener terminated");
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::dom::MemoryDocument;
    use crate::identifiers::RequestId;
    use crate::transport::channel::LocalBus;

    fn listener(bus: &LocalBus, config: &BridgeConfig) -> PageListener<MemoryDocument> {
        let (port, _inbox) = bus.open("https://shop.test");
        let executor = CommandExecutor::with_config(
            MemoryDocument::from_html("<h1>Hello</h1>"),
            config,
        );
        PageListener::new(port, executor, config)
    }

    fn command(source: crate::identifiers::ContextId, origin: &str, command: serde_json::Value) -> Inbound {
        Inbound {
            source,
            origin: origin.to_string(),
            message: BridgeMessage::Command {
                request_id: RequestId::new("1_req"),
                command,
            },
        }
    }

    #[tokio::test]
    async fn test_executes_and_replies_to_sender() {
        let bus = LocalBus::new();
        let config = BridgeConfig::default();
        let page = listener(&bus, &config);
        let (ui, mut ui_inbox) = bus.open("https://ui.test");

        let reply = page
            .handle_inbound(command(
                ui.context(),
                ui.origin(),
                json!({"action": "READ_TEXT", "selector": "h1"}),
            ))
            .unwrap();
        assert!(reply.success);

        let inbound = ui_inbox.recv().await.unwrap();
        assert_eq!(
            inbound.message,
            BridgeMessage::Result(Envelope::ok(RequestId::new("1_req"), json!("Hello")))
        );
    }

    #[tokio::test]
    async fn test_failure_is_correlated() {
        let bus = LocalBus::new();
        let config = BridgeConfig::default();
        let page = listener(&bus, &config);
        let (ui, mut ui_inbox) = bus.open("https://ui.test");

        page.handle_inbound(command(ui.context(), ui.origin(), json!({"action": "NOPE"})));

        let BridgeMessage::Result(envelope) = ui_inbox.recv().await.unwrap().message else {
            panic!("expected result");
        };
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("unsupported action: NOPE"));
    }

    #[test]
    fn test_opaque_origin_without_fallback_drops_reply() {
        let bus = LocalBus::new();
        let config = BridgeConfig::builder().strict_reply_origin().build().unwrap();
        let page = listener(&bus, &config);
        let (sandboxed, mut inbox) = bus.open("about:blank");

        let reply = page.handle_inbound(command(
            sandboxed.context(),
            sandboxed.origin(),
            json!({"action": "PAGE_INFO"}),
        ));
        assert!(reply.is_none());
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn test_opaque_origin_with_fallback_replies_to_any() {
        let bus = LocalBus::new();
        let config = BridgeConfig::default();
        let page = listener(&bus, &config);
        let (sandboxed, mut inbox) = bus.open("about:blank");

        page.handle_inbound(command(
            sandboxed.context(),
            sandboxed.origin(),
            json!({"action": "PAGE_INFO"}),
        ));
        assert!(inbox.try_recv().is_ok());
    }

    #[test]
    fn test_untrusted_origin_is_not_executed() {
        let bus = LocalBus::new();
        let config = BridgeConfig::builder()
            .trust(TrustPolicy::allow_list(["https://ui.test"]))
            .build()
            .unwrap();
        let page = listener(&bus, &config);
        let (evil, _inbox) = bus.open("https://evil.test");

        let reply = page.handle_inbound(command(
            evil.context(),
            evil.origin(),
            json!({"action": "REMOVE", "selector": "h1"}),
        ));
        assert!(reply.is_none());
        assert_eq!(
            page.executor().document().lock().query_selector_all("h1").unwrap().len(),
            1
        );
    }
}
