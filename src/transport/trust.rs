//! Inbound message authentication.
//!
//! The bridge authenticates messages by two cheap checks only: the sending
//! context must be the one the listener expects (its embedder), and the
//! sender's origin must be accepted by the configured [`TrustPolicy`].
//! With the default [`TrustPolicy::AnyOrigin`] the second check is a no-op,
//! so any script able to post into the window can answer a pending request.
//! Tighten it with [`TrustPolicy::allow_list`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::identifiers::ContextId;

// ============================================================================
// TrustPolicy
// ============================================================================

/// Which sender origins a listener accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "origins", rename_all = "camelCase")]
pub enum TrustPolicy {
    /// Accept every origin.
    #[default]
    AnyOrigin,
    /// Accept only these serialized origins (`scheme://host[:port]`).
    AllowList(Vec<String>),
}

impl TrustPolicy {
    /// Creates an allow-list policy, normalizing each entry to its origin.
    ///
    /// Entries that are not absolute URLs with a host are kept verbatim so
    /// they can still match exactly.
    #[must_use]
    pub fn allow_list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = origins
            .into_iter()
            .map(|o| normalize_origin(o.as_ref()).unwrap_or_else(|| o.as_ref().to_string()))
            .collect();
        Self::AllowList(origins)
    }

    /// Returns `true` if a message from `origin` is acceptable.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::AnyOrigin => true,
            Self::AllowList(allowed) => {
                let origin = normalize_origin(origin).unwrap_or_else(|| origin.to_string());
                allowed.iter().any(|a| *a == origin)
            }
        }
    }

    /// Runs both checks for one inbound message.
    ///
    /// `expected` is the context replies must come from; `None` accepts any
    /// source.
    ///
    /// # Errors
    ///
    /// Returns the reason the message must be dropped.
    pub fn check(
        &self,
        expected: Option<ContextId>,
        source: ContextId,
        origin: &str,
    ) -> Result<(), Rejection> {
        if let Some(expected) = expected
            && expected != source
        {
            return Err(Rejection::UnexpectedSource { expected, source });
        }
        if !self.allows(origin) {
            return Err(Rejection::UntrustedOrigin {
                origin: origin.to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Rejection
// ============================================================================

/// Why an inbound message was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Message came from a context other than the expected one.
    UnexpectedSource {
        /// Context the listener trusts.
        expected: ContextId,
        /// Context that actually sent.
        source: ContextId,
    },
    /// Origin not on the allow-list.
    UntrustedOrigin {
        /// Rejected origin.
        origin: String,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedSource { expected, source } => {
                write!(f, "unexpected source {source} (expected {expected})")
            }
            Self::UntrustedOrigin { origin } => write!(f, "untrusted origin {origin}"),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Reduces a URL to its serialized origin, e.g. `https://a.test:8443`.
///
/// Returns `None` for opaque origins (`data:`, `about:blank`, unparsable input).
#[must_use]
pub fn normalize_origin(input: &str) -> Option<String> {
    let url = Url::parse(input).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

// ============================================================================
// Tests
// ============================================================================
