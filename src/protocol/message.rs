//! Bridge wire messages.
//!
//! Every message crossing a context boundary carries a `type` discriminator:
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `DOM_BRIDGE_COMMAND` | caller → page | Command to execute in place |
//! | `DOM_BRIDGE_RESULT` | page → caller | Correlated [`Envelope`] |
//! | `DOM_BRIDGE_RELAY` | caller → relay | Command to forward to a tab |
//!
//! The command payload stays an untyped JSON value until the executor
//! validates it, so malformed commands still produce a correlated error.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{RequestId, TabId};

use super::Envelope;

// ============================================================================
// BridgeMessage
// ============================================================================

/// A message on any bridge channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Command-bearing message for the page-relay listener.
    #[serde(rename = "DOM_BRIDGE_COMMAND", rename_all = "camelCase")]
    Command {
        /// Correlation ID.
        request_id: RequestId,
        /// Raw command object.
        command: Value,
    },

    /// Result-bearing message for the caller's listener.
    #[serde(rename = "DOM_BRIDGE_RESULT")]
    Result(Envelope),

    /// Command for the extension-level relay.
    #[serde(rename = "DOM_BRIDGE_RELAY", rename_all = "camelCase")]
    Relay {
        /// Correlation ID.
        request_id: RequestId,
        /// Raw command object.
        command: Value,
        /// Explicitly requested tab, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<TabId>,
    },
}

impl BridgeMessage {
    /// Returns the correlation ID carried by the message.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Command { request_id, .. } | Self::Relay { request_id, .. } => request_id,
            Self::Result(envelope) => &envelope.request_id,
        }
    }

    /// Returns the message type name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Command { .. } => "DOM_BRIDGE_COMMAND",
            Self::Result(_) => "DOM_BRIDGE_RESULT",
            Self::Relay { .. } => "DOM_BRIDGE_RELAY",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
