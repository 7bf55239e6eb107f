//! Error types for the DOM bridge.
//!
//! Every failure is scoped to the single command that produced it; no
//! variant is fatal to the hosting context.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```no_run
//! use dom_bridge::{BridgeClient, DomCommand, Result};
//!
//! async fn example(client: &BridgeClient) -> Result<()> {
//!     let title = client.send(&DomCommand::read_text("h1")).await?;
//!     println!("{title}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Kind | Variants |
//! |------|----------|
//! | Validation | [`Error::InvalidCommand`], [`Error::UnsupportedAction`], [`Error::MissingField`], [`Error::InvalidSelector`] |
//! | NotFound | [`Error::NoElements`], [`Error::IndexOutOfRange`] |
//! | Transport | [`Error::BridgeDisabled`], [`Error::NoControllableTarget`], [`Error::Delivery`], [`Error::ConnectionClosed`], [`Error::TooManyPending`] |
//! | Timeout | [`Error::RequestTimeout`] |
//! | Internal | [`Error::Config`], [`Error::Gateway`], [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |
//!
//! [`Error::Remote`] reports the kind the page computed, carried on the
//! envelope's `errorKind` field. Envelopes without one are classified from
//! the message text.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ErrorKind
// ============================================================================

/// Coarse classification used by callers that render or route errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed or incomplete command. Never retried.
    Validation,
    /// Selector matched nothing. Never retried.
    NotFound,
    /// Delivery problem. The caller may retry.
    Transport,
    /// No answer within the fixed window.
    Timeout,
    /// Local configuration, I/O or serialization failure.
    Internal,
}

impl ErrorKind {
    /// Classifies an error string produced by this crate's `Display`.
    ///
    /// Unrecognized messages are [`ErrorKind::Transport`].
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        const VALIDATION: &[&str] = &[
            "invalid command:",
            "unsupported action:",
            "missing required field",
            "invalid selector",
        ];

        if VALIDATION.iter().any(|p| message.starts_with(p)) {
            Self::Validation
        } else if message.starts_with("no elements found for selector:") {
            Self::NotFound
        } else if message.starts_with("request ") && message.contains(" timed out after ") {
            Self::Timeout
        } else {
            Self::Transport
        }
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Command is not a JSON object or is otherwise malformed.
    #[error("invalid command: {message}")]
    InvalidCommand {
        /// Description of the problem.
        message: String,
    },

    /// Action is missing from the known set.
    #[error("unsupported action: {action}")]
    UnsupportedAction {
        /// The action as received (after normalization).
        action: String,
    },

    /// An action-specific required field is absent.
    #[error("missing required field '{field}' for {action}")]
    MissingField {
        /// Field name on the wire.
        field: &'static str,
        /// Action that needed it.
        action: String,
    },

    /// Selector could not be parsed.
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// Selector as received.
        selector: String,
        /// Parse failure description.
        message: String,
    },

    // ========================================================================
    // NotFound Errors
    // ========================================================================
    /// Selector matched zero elements.
    #[error("no elements found for selector: {selector}")]
    NoElements {
        /// Selector used.
        selector: String,
    },

    /// Selector matched, but not at the requested index.
    #[error("no elements found for selector: {selector} (index {index} of {count})")]
    IndexOutOfRange {
        /// Selector used.
        selector: String,
        /// Requested index.
        index: usize,
        /// Number of matches.
        count: usize,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Caller context is not embedded in a controllable parent.
    #[error("bridge disabled: {reason}")]
    BridgeDisabled {
        /// Why the bridge is not enabled.
        reason: String,
    },

    /// Relay found no page eligible to receive the command.
    #[error("no controllable target")]
    NoControllableTarget,

    /// Message could not be delivered to the target context.
    #[error("delivery failed: {message}")]
    Delivery {
        /// Description of the delivery failure.
        message: String,
    },

    /// Channel to the peer context closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Pending-request map is full.
    #[error("too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Current number of in-flight requests.
        pending: usize,
        /// Configured limit.
        max: usize,
    },

    /// The remote side reported a failure; message is passed through verbatim.
    #[error("{message}")]
    Remote {
        /// Error string from the result envelope.
        message: String,
        /// Classification of the remote failure.
        kind: ErrorKind,
    },

    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// No result arrived for a request within the window.
    #[error("request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Gateway returned a non-success reply.
    #[error("gateway error ({status}): {message}")]
    Gateway {
        /// HTTP status code.
        status: u16,
        /// Error string from the reply body, or a generic description.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid command error.
    #[inline]
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    /// Creates an unsupported action error.
    #[inline]
    pub fn unsupported_action(action: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            action: action.into(),
        }
    }

    /// Creates a missing field error.
    #[inline]
    pub fn missing_field(field: &'static str, action: impl Into<String>) -> Self {
        Self::MissingField {
            field,
            action: action.into(),
        }
    }

    /// Creates an invalid selector error.
    #[inline]
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Creates a no-elements error.
    #[inline]
    pub fn no_elements(selector: impl Into<String>) -> Self {
        Self::NoElements {
            selector: selector.into(),
        }
    }

    /// Creates an index out of range error.
    #[inline]
    pub fn index_out_of_range(selector: impl Into<String>, index: usize, count: usize) -> Self {
        Self::IndexOutOfRange {
            selector: selector.into(),
            index,
            count,
        }
    }

    /// Creates a bridge disabled error.
    #[inline]
    pub fn bridge_disabled(reason: impl Into<String>) -> Self {
        Self::BridgeDisabled {
            reason: reason.into(),
        }
    }

    /// Creates a delivery error.
    #[inline]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Creates a remote error, classifying it from the message.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = ErrorKind::from_message(&message);
        Self::Remote { message, kind }
    }

    /// Creates a remote error of a known kind.
    #[inline]
    pub fn remote_with_kind(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self::Remote {
            message: message.into(),
            kind,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a gateway error.
    #[inline]
    pub fn gateway(status: u16, message: impl Into<String>) -> Self {
        Self::Gateway {
            status,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCommand { .. }
            | Self::UnsupportedAction { .. }
            | Self::MissingField { .. }
            | Self::InvalidSelector { .. } => ErrorKind::Validation,

            Self::NoElements { .. } | Self::IndexOutOfRange { .. } => ErrorKind::NotFound,

            Self::BridgeDisabled { .. }
            | Self::NoControllableTarget
            | Self::Delivery { .. }
            | Self::ConnectionClosed
            | Self::TooManyPending { .. }
            | Self::WebSocket(_) => ErrorKind::Transport,

            Self::Remote { kind, .. } => *kind,

            Self::RequestTimeout { .. } => ErrorKind::Timeout,

            Self::Config { .. }
            | Self::Gateway { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Http(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns `true` if the command itself was malformed.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Returns `true` if the selector matched nothing usable.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Returns `true` if the caller may reasonably retry.
    ///
    /// Validation and not-found failures are never retryable.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================
