//! Bridge protocol message types.
//!
//! This module defines the JSON shapes exchanged between the caller
//! (embedded UI), the relay (extension background) and the page context.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`DomCommand`] | Caller → Page | DOM action request |
//! | [`Envelope`] | Page → Caller | Correlated result or error |
//! | [`BridgeMessage`] | Any hop | Typed wrapper with correlation ID |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Actions and command fields |
//! | `envelope` | Result envelope |
//! | `message` | Channel message wrapper |

// ============================================================================
// Submodules
// ============================================================================

/// Actions and command fields.
pub mod command;

/// Result envelope.
pub mod envelope;

/// Channel message wrapper.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Action, DomCommand, InsertPosition, ScrollBehavior, ScrollBlock};
pub use envelope::Envelope;
pub use message::BridgeMessage;
