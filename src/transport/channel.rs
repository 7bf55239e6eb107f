//! postMessage-style channel.
//!
//! A [`MessagePort`] delivers [`BridgeMessage`]s between execution contexts
//! the way `window.postMessage` does: fire-and-forget, addressed to a target
//! context, and optionally restricted to a target origin. Receivers see an
//! [`Inbound`] carrying the sender's [`ContextId`] and origin.
//!
//! [`LocalBus`] is the in-process implementation: every context opened on
//! the bus gets a port and an unbounded inbox.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::ContextId;
use crate::protocol::BridgeMessage;

use super::trust::normalize_origin;

// ============================================================================
// Types
// ============================================================================

/// Receiving half of a context's inbox.
pub type Inbox = mpsc::UnboundedReceiver<Inbound>;

/// A message as seen by its receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Context that posted the message.
    pub source: ContextId,
    /// Sender's serialized origin (`null` when opaque).
    pub origin: String,
    /// Payload.
    pub message: BridgeMessage,
}

/// Origin restriction for a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// `*`: deliver regardless of the receiver's origin.
    Any,
    /// Deliver only if the receiver's origin matches.
    Exact(String),
}

impl TargetOrigin {
    /// Restricts delivery to the origin of `url`, or [`TargetOrigin::Any`]
    /// when the origin is opaque.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        normalize_origin(url).map_or(Self::Any, Self::Exact)
    }

    /// Returns `true` if a receiver at `origin` may see the message.
    #[must_use]
    pub fn admits(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => {
                let origin = normalize_origin(origin).unwrap_or_else(|| origin.to_string());
                *expected == origin
            }
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(origin) => f.write_str(origin),
        }
    }
}

// ============================================================================
// MessagePort
// ============================================================================

/// Sending side of one execution context.
pub trait MessagePort: Send + Sync {
    /// The context this port posts as.
    fn context(&self) -> ContextId;

    /// The origin receivers will see.
    fn origin(&self) -> &str;

    /// Posts a message to `target`.
    ///
    /// A mismatched target origin drops the message silently, as
    /// `postMessage` does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delivery`] if the target context no longer exists.
    fn post(&self, target: ContextId, message: BridgeMessage, origin: TargetOrigin) -> Result<()>;
}

// ============================================================================
// LocalBus
// ============================================================================

struct Endpoint {
    origin: String,
    tx: mpsc::UnboundedSender<Inbound>,
}

type Registry = FxHashMap<ContextId, Endpoint>;

/// In-process message bus connecting any number of contexts.
#[derive(Clone, Default)]
pub struct LocalBus {
    endpoints: Arc<Mutex<Registry>>,
}

impl LocalBus {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a context at `origin`.
    ///
    /// `origin` may be a full URL; it is reduced to its serialized origin.
    #[must_use]
    pub fn open(&self, origin: &str) -> (LocalPort, Inbox) {
        let id = ContextId::next();
        let origin = normalize_origin(origin).unwrap_or_else(|| "null".to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.lock().insert(
            id,
            Endpoint {
                origin: origin.clone(),
                tx,
            },
        );
        trace!(context = %id, %origin, "Context opened");

        let port = LocalPort {
            id,
            origin,
            endpoints: Arc::clone(&self.endpoints),
        };
        (port, rx)
    }

    /// Closes a context; later posts to it fail.
    pub fn close(&self, id: ContextId) {
        self.endpoints.lock().remove(&id);
    }

    /// Number of open contexts.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.lock().len()
    }

    /// Returns `true` when no context is open.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// LocalPort
// ============================================================================

/// A context's handle on a [`LocalBus`].
#[derive(Clone)]
pub struct LocalPort {
    id: ContextId,
    origin: String,
    endpoints: Arc<Mutex<Registry>>,
}

impl fmt::Debug for LocalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPort")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl MessagePort for LocalPort {
    fn context(&self) -> ContextId {
        self.id
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn post(&self, target: ContextId, message: BridgeMessage, origin: TargetOrigin) -> Result<()> {
        let endpoints = self.endpoints.lock();
        let endpoint = endpoints
            .get(&target)
            .ok_or_else(|| Error::delivery(format!("context {target} is gone")))?;

        if !origin.admits(&endpoint.origin) {
            trace!(%target, target_origin = %origin, "Target origin mismatch, message dropped");
            return Ok(());
        }

        endpoint
            .tx
            .send(Inbound {
                source: self.id,
                origin: self.origin.clone(),
                message,
            })
            .map_err(|_| Error::delivery(format!("context {target} stopped listening")))
    }
}

// ============================================================================
// Tests
// ============================================================================
