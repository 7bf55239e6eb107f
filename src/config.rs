//! Bridge configuration.
//!
//! [`BridgeConfig`] holds every tunable the bridge components read. It is
//! plain data (serde, camelCase) so it can be loaded from the extension's
//! stored settings, and can be assembled in code through
//! [`BridgeConfigBuilder`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dom_bridge::{BridgeConfig, TrustPolicy};
//!
//! # fn example() -> dom_bridge::Result<()> {
//! let config = BridgeConfig::builder()
//!     .request_timeout(Duration::from_secs(5))
//!     .trust(TrustPolicy::allow_list(["https://app.example"]))
//!     .build()?;
//!
//! assert_eq!(config.request_timeout(), Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::TrustPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for a correlated result.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 8_000;

/// Default cap on in-flight requests per client.
pub const DEFAULT_MAX_PENDING: usize = 100;

/// Default lifetime of a transient highlight.
pub const DEFAULT_HIGHLIGHT_DURATION_MS: u64 = 1_500;

/// Default number of summaries returned by an inspection query.
pub const DEFAULT_QUERY_LIMIT: usize = 20;

/// Default text snippet length in an element summary.
pub const DEFAULT_TEXT_SNIPPET_LEN: usize = 200;

/// Default HTML snippet length in an element summary.
pub const DEFAULT_HTML_SNIPPET_LEN: usize = 300;

// ============================================================================
// BridgeConfig
// ============================================================================

/// Tunables shared by the client, page listener and executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Milliseconds to wait for a result before rejecting with a timeout.
    pub request_timeout_ms: u64,

    /// Maximum requests awaiting a result at once.
    pub max_pending: usize,

    /// Origins accepted by listeners.
    pub trust: TrustPolicy,

    /// Milliseconds a non-persistent highlight stays applied.
    pub highlight_duration_ms: u64,

    /// Summaries returned by an inspection query without an explicit limit.
    pub query_limit: usize,

    /// Maximum characters of text per element summary.
    pub text_snippet_len: usize,

    /// Maximum characters of HTML per element summary.
    pub html_snippet_len: usize,

    /// Reply to `*` when the command's origin is unknown or opaque.
    pub reply_to_any_origin_fallback: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_pending: DEFAULT_MAX_PENDING,
            trust: TrustPolicy::AnyOrigin,
            highlight_duration_ms: DEFAULT_HIGHLIGHT_DURATION_MS,
            query_limit: DEFAULT_QUERY_LIMIT,
            text_snippet_len: DEFAULT_TEXT_SNIPPET_LEN,
            html_snippet_len: DEFAULT_HTML_SNIPPET_LEN,
            reply_to_any_origin_fallback: true,
        }
    }
}

impl BridgeConfig {
    /// Returns a builder starting from the defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Request timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Highlight lifetime as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_duration_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a timeout, limit or snippet length is zero.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max pending must be greater than zero"));
        }
        if self.query_limit == 0 {
            return Err(Error::config("query limit must be greater than zero"));
        }
        if self.text_snippet_len == 0 || self.html_snippet_len == 0 {
            return Err(Error::config("snippet lengths must be greater than zero"));
        }
        if let TrustPolicy::AllowList(origins) = &self.trust
            && origins.is_empty()
        {
            return Err(Error::config(
                "allow-list trust policy needs at least one origin",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// BridgeConfigBuilder
// ============================================================================

/// Fluent builder for [`BridgeConfig`].
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the in-flight request cap.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max: usize) -> Self {
        self.config.max_pending = max;
        self
    }

    /// Sets the origin trust policy.
    #[inline]
    #[must_use]
    pub fn trust(mut self, policy: TrustPolicy) -> Self {
        self.config.trust = policy;
        self
    }

    /// Sets the transient highlight lifetime.
    #[inline]
    #[must_use]
    pub fn highlight_duration(mut self, duration: Duration) -> Self {
        self.config.highlight_duration_ms =
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the default inspection limit.
    #[inline]
    #[must_use]
    pub fn query_limit(mut self, limit: usize) -> Self {
        self.config.query_limit = limit;
        self
    }

    /// Sets snippet lengths for element summaries.
    #[inline]
    #[must_use]
    pub fn snippet_lengths(mut self, text: usize, html: usize) -> Self {
        self.config.text_snippet_len = text;
        self.config.html_snippet_len = html;
        self
    }

    /// Drops replies whose destination origin is unknown instead of
    /// posting them to `*`.
    #[inline]
    #[must_use]
    pub fn strict_reply_origin(mut self) -> Self {
        self.config.reply_to_any_origin_fallback = false;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn build(self) -> Result<BridgeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================
