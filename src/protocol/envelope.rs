//! Result envelope delivered on the return hop.
//!
//! # Format
//!
//! Success:
//! ```json
//! { "requestId": "1760558400123_k3j9x0a2b", "success": true, "result": "Hello" }
//! ```
//!
//! Error:
//! ```json
//! { "requestId": "1760558400123_k3j9x0a2b", "success": false, "error": "no elements found for selector: h2", "errorKind": "notFound" }
//! ```
//!
//! `errorKind` is optional; peers that omit it get the kind inferred from
//! the error string.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Envelope
// ============================================================================

/// Correlated outcome of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Matches the command's correlation ID.
    pub request_id: RequestId,

    /// Whether the command succeeded.
    pub success: bool,

    /// Result payload (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Human-readable error (if failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Classification of the failure, when the sender knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope {
    /// Creates a success envelope.
    #[inline]
    #[must_use]
    pub fn ok(request_id: RequestId, result: Value) -> Self {
        Self {
            request_id,
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    /// Creates a failure envelope.
    #[inline]
    #[must_use]
    pub fn err(request_id: RequestId, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            result: None,
            error: Some(error.into()),
            error_kind: None,
        }
    }

    /// Builds an envelope from a local outcome.
    #[must_use]
    pub fn from_result(request_id: RequestId, outcome: Result<Value>) -> Self {
        match outcome {
            Ok(value) => Self::ok(request_id, value),
            Err(e) => Self {
                error_kind: Some(e.kind()),
                ..Self::err(request_id, e.to_string())
            },
        }
    }

    /// Extracts the result value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying the envelope's error string and
    /// kind if the command failed.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let message = self.error.unwrap_or_else(|| "unknown error".to_string());
        Err(match self.error_kind {
            Some(kind) => Error::remote_with_kind(message, kind),
            None => Error::remote(message),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
