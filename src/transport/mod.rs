//! Bridge transport layer.
//!
//! Request/response correlation over postMessage-style channels.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   DOM_BRIDGE_COMMAND   ┌─────────────────┐
//! │  Embedded UI    │───────────────────────►│  Host page      │
//! │                 │                        │                 │
//! │  BridgeClient   │◄───────────────────────│  PageListener   │
//! │  (pending map)  │   DOM_BRIDGE_RESULT    │  → Executor     │
//! └─────────────────┘                        └─────────────────┘
//! ```
//!
//! Channels are abstracted by [`MessagePort`]. [`LocalBus`] connects
//! contexts in one process; [`SocketListener`] and [`connect`] carry the
//! same messages over a localhost WebSocket.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | [`MessagePort`] seam and in-process [`LocalBus`] |
//! | `client` | Caller side: pending map, timeouts |
//! | `page` | Page side: execute and reply |
//! | `socket` | WebSocket endpoint |
//! | `trust` | Source and origin checks |

// ============================================================================
// Submodules
// ============================================================================

/// postMessage-style channel.
pub mod channel;

/// Caller-side bridge.
pub mod client;

/// Page-relay listener.
pub mod page;

/// WebSocket endpoint.
pub mod socket;

/// Inbound message authentication.
pub mod trust;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{Inbound, Inbox, LocalBus, LocalPort, MessagePort, TargetOrigin};
pub use client::BridgeClient;
pub use page::PageListener;
pub use socket::{SocketListener, SocketPort, connect};
pub use trust::{Rejection, TrustPolicy};
