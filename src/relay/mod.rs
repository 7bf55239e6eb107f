//! Relay hop between non-DOM contexts and browser tabs.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `hop` | [`Relay`] resolution and dispatch over a [`TabBrowser`] |
//! | `target` | Controllability rule and [`TargetTracker`] |

// ============================================================================
// Submodules
// ============================================================================

/// Relay resolution and dispatch.
pub mod hop;

/// Controllability and remembered-target tracking.
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use hop::{Relay, RelayOptions, TabBrowser};
pub use target::{TabInfo, TargetTracker, TrackerState, is_controllable};
