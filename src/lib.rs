//! DOM Bridge - cross-context DOM command RPC.
//!
//! This library marshals JSON DOM commands from an embedded UI to the page
//! that hosts it, executes them against the page's document and returns a
//! correlated result or error.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  command   ┌──────────────┐  execute  ┌──────────────┐
//! │ BridgeClient │───────────►│ PageListener │──────────►│ Document     │
//! │ (pending map)│◄───────────│              │◄──────────│ (page DOM)   │
//! └──────────────┘  envelope  └──────────────┘  result   └──────────────┘
//!
//! ┌──────────────┐  relay     ┌──────────────┐  per-tab  ┌──────────────┐
//! │ any context  │───────────►│ Relay        │──────────►│ PageListener │
//! └──────────────┘            │ (tracker)    │           └──────────────┘
//!                             └──────────────┘
//! ```
//!
//! Key design principles:
//!
//! - Every request has its own id; results are matched by id, never by order
//! - A request settles exactly once: result, remote error or timeout
//! - Errors are scoped to one command; nothing is fatal to the host page
//! - Messages from unexpected sources or origins are dropped, not answered
//!
//! # Quick Start
//!
//! ```no_run
//! use dom_bridge::{
//!     BridgeClient, BridgeConfig, CommandExecutor, DomCommand, LocalBus, MemoryDocument,
//!     MessagePort, PageListener, Result,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BridgeConfig::default();
//!     let bus = LocalBus::new();
//!
//!     // Page side
//!     let (page_port, page_inbox) = bus.open("https://shop.test/cart");
//!     let page_context = page_port.context();
//!     let executor = CommandExecutor::with_config(
//!         MemoryDocument::from_html("<h1>Cart</h1>"),
//!         &config,
//!     );
//!     PageListener::new(page_port, executor, &config).listen(page_inbox);
//!
//!     // Embedded UI side
//!     let (ui_port, ui_inbox) = bus.open("https://ui.test");
//!     let client = BridgeClient::new(ui_port, config);
//!     client.attach(page_context, "https://shop.test/cart")?;
//!     client.listen(ui_inbox);
//!
//!     let heading = client.send(&DomCommand::read_text("h1")).await?;
//!     println!("{heading}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`BridgeConfig`] and its builder |
//! | [`dom`] | [`Document`] seam and in-memory DOM |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`executor`] | [`CommandExecutor`]: runs commands on a document |
//! | [`gateway`] | Remote gateway HTTP client and chat routing |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`launch`] | Where the UI opens |
//! | [`protocol`] | Commands, envelopes and wire messages |
//! | [`relay`] | Background hop to the controllable tab |
//! | [`settings`] | Persisted settings |
//! | [`transport`] | Channels, client and page listener |

// ============================================================================
// Modules
// ============================================================================

/// Bridge configuration.
pub mod config;

/// Page document seam.
///
/// [`Document`] is what commands run against; [`MemoryDocument`] is a
/// complete in-memory implementation.
pub mod dom;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Command execution.
pub mod executor;

/// Remote gateway client.
pub mod gateway;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// UI launch decisions.
pub mod launch;

/// Bridge protocol types.
pub mod protocol;

/// Background relay hop.
pub mod relay;

/// Persisted settings.
pub mod settings;

/// Channels and request correlation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{BridgeConfig, BridgeConfigBuilder};

// DOM
pub use dom::{Document, MemoryDocument, PageInfo, Selector, Viewport};

// Error types
pub use error::{Error, ErrorKind, Result};

// Execution
pub use executor::{CommandExecutor, ElementSummary};

// Gateway
pub use gateway::{ChatCommand, ChatMode, GatewayAction, GatewayClient, GatewayReply};

// Identifier types
pub use identifiers::{ContextId, NodeId, RequestId, TabId};

// Launch
pub use launch::{LaunchController, LaunchSurface, Launcher, OpenMode};

// Protocol types
pub use protocol::{Action, BridgeMessage, DomCommand, Envelope, InsertPosition};

// Relay
pub use relay::{Relay, RelayOptions, TabBrowser, TabInfo, TargetTracker};

// Settings
pub use settings::{JsonFileStore, MemoryStore, Settings, SettingsStore};

// Transport
pub use transport::{
    BridgeClient, Inbound, LocalBus, LocalPort, MessagePort, PageListener, SocketListener,
    TargetOrigin, TrustPolicy,
};
