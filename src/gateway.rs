//! Remote gateway client and chat command routing.
//!
//! The gateway is a plain HTTP service taking `{agent_id, action, params}`
//! on `POST {base}/aida/gateway` and answering with a JSON body. Liveness is
//! `GET {base}/aida/health`.
//!
//! Chat input is routed before it reaches the gateway:
//!
//! | Input | Outcome |
//! |-------|---------|
//! | `/plan x`, `/analyze x`, `/generate x`, `/read x`, `/explain x` | Gateway action with `x` as its parameter |
//! | `/secure`, `/open` | Switches [`ChatMode`] |
//! | `/help` | [`HELP_TEXT`] |
//! | `/other` | Validation error |
//! | free text | Action picked by [`classify`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::settings::Settings;

// ============================================================================
// Constants
// ============================================================================

/// Gateway used when no URL is configured.
pub const DEFAULT_GATEWAY_URL: &str = "https://arkaios-gateway-open.onrender.com";

/// Agent id sent with every request unless overridden.
pub const DEFAULT_AGENT_ID: &str = "dom-bridge";

const GATEWAY_PATH: &str = "/aida/gateway";
const HEALTH_PATH: &str = "/aida/health";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Text shown for `/help`.
pub const HELP_TEXT: &str = "\
Gateway commands:
  /plan <objective>     create a plan
  /analyze <content>    analyze content
  /generate <prompt>    generate content
  /read <url>           read a web resource
  /explain <concept>    explain a concept

Mode commands:
  /secure               send the bearer token with requests
  /open                 send requests without credentials
  /help                 show this help";

// ============================================================================
// GatewayAction
// ============================================================================

/// Actions the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAction {
    /// Build a plan for an objective.
    Plan,
    /// Analyze content.
    Analyze,
    /// Generate from a prompt.
    Generate,
    /// Read a target resource.
    Read,
    /// Explain a concept.
    Explain,
}

impl GatewayAction {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Analyze => "analyze",
            Self::Generate => "generate",
            Self::Read => "read",
            Self::Explain => "explain",
        }
    }

    /// Key the action's single text parameter travels under.
    #[must_use]
    pub const fn param_key(self) -> &'static str {
        match self {
            Self::Plan => "objective",
            Self::Analyze => "content",
            Self::Generate => "prompt",
            Self::Read => "target",
            Self::Explain => "concept",
        }
    }

    /// Builds the params object for `text`.
    #[must_use]
    pub fn params(self, text: &str) -> Value {
        let mut params = Map::new();
        params.insert(self.param_key().to_string(), Value::String(text.to_string()));
        Value::Object(params)
    }

    /// Looks up an action by case-insensitive name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "plan" => Some(Self::Plan),
            "analyze" => Some(Self::Analyze),
            "generate" => Some(Self::Generate),
            "read" => Some(Self::Read),
            "explain" => Some(Self::Explain),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks a gateway action for free text.
///
/// Keywords are checked in order on the lowercased text; the first hit wins.
#[must_use]
pub fn classify(text: &str) -> GatewayAction {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["plan", "planifica"]) {
        GatewayAction::Plan
    } else if has(&["analiza", "analyze"]) {
        GatewayAction::Analyze
    } else if has(&["genera", "crea"]) {
        GatewayAction::Generate
    } else {
        GatewayAction::Explain
    }
}

// ============================================================================
// ChatMode
// ============================================================================

/// Whether requests carry the bearer token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// No credentials.
    #[default]
    Open,
    /// `Authorization: Bearer <token>` on gateway calls.
    Secure,
}

// ============================================================================
// ChatCommand
// ============================================================================

/// A routed line of chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Call the gateway.
    Gateway {
        /// Action to run.
        action: GatewayAction,
        /// Its text parameter.
        argument: String,
    },
    /// Switch mode.
    SetMode(ChatMode),
    /// Show help.
    Help,
    /// Slash command nobody handles.
    Unknown(String),
}

impl ChatCommand {
    /// Routes one line of input.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let Some(rest) = input.strip_prefix('/') else {
            return Some(Self::Gateway {
                action: classify(input),
                argument: input.to_string(),
            });
        };

        let (name, argument) = rest.split_once(' ').unwrap_or((rest, ""));
        let command = match name.to_lowercase().as_str() {
            "secure" => Self::SetMode(ChatMode::Secure),
            "open" => Self::SetMode(ChatMode::Open),
            "help" => Self::Help,
            other => match GatewayAction::from_name(other) {
                Some(action) => Self::Gateway {
                    action,
                    argument: argument.to_string(),
                },
                None => Self::Unknown(name.to_string()),
            },
        };
        Some(command)
    }
}

// ============================================================================
// Replies
// ============================================================================

/// A successful gateway answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayReply {
    /// Always `true` for replies returned as `Ok`.
    pub ok: bool,
    /// HTTP status.
    pub status: u16,
    /// Response body.
    pub data: Value,
    /// The body's `error` field, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What handling a line of chat input produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// The gateway answered.
    Reply(GatewayReply),
    /// The mode changed.
    ModeChanged(ChatMode),
    /// Help text to display.
    Help(&'static str),
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    agent_id: &'a str,
    action: GatewayAction,
    params: &'a Value,
}

// ============================================================================
// GatewayClient
// ============================================================================

/// HTTP client for the remote gateway.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    agent_id: String,
    bearer_token: Option<String>,
    mode: ChatMode,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("agent_id", &self.agent_id)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("mode", &self.mode)
            .finish()
    }
}

impl GatewayClient {
    /// Creates a client for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not http(s), or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid gateway URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "gateway URL must be http(s): {base_url}"
            )));
        }

        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            bearer_token: None,
            mode: ChatMode::Open,
        })
    }

    /// Creates a client from persisted settings.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayClient::new`].
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut client = Self::new(&settings.gateway_url)?;
        client.bearer_token = settings.bearer_token.clone().filter(|t| !t.is_empty());
        client.mode = settings.chat_mode;
        Ok(client)
    }

    /// Sets the agent id sent with requests.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Sets the bearer token used in secure mode.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the starting mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    /// Base URL without a trailing slash.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    /// Switches mode.
    pub fn set_mode(&mut self, mode: ChatMode) {
        debug!(?mode, "Gateway mode changed");
        self.mode = mode;
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Runs `action` with `params` on the gateway.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] in secure mode without a token
    /// - [`Error::Http`] if the request cannot be sent
    /// - [`Error::Gateway`] on a non-2xx status, carrying the body's `error`
    /// - [`Error::Json`] if a 2xx body is not JSON
    pub async fn execute(&self, action: GatewayAction, params: Value) -> Result<GatewayReply> {
        let body = GatewayRequest {
            agent_id: &self.agent_id,
            action,
            params: &params,
        };
        let mut request = self.http.post(self.endpoint(GATEWAY_PATH)).json(&body);

        if self.mode == ChatMode::Secure {
            let token = self
                .bearer_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| Error::config("secure mode requires a bearer token"))?;
            request = request.bearer_auth(token);
        }

        debug!(%action, mode = ?self.mode, "Gateway request");
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let data = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => value,
                Err(e) if status.is_success() => return Err(e.into()),
                Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            }
        };
        let error = data.get("error").and_then(error_text);

        if !status.is_success() {
            let message = error.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            warn!(%action, status = status.as_u16(), %message, "Gateway request failed");
            return Err(Error::gateway(status.as_u16(), message));
        }

        debug!(%action, status = status.as_u16(), "Gateway reply");
        Ok(GatewayReply {
            ok: true,
            status: status.as_u16(),
            data,
            error,
        })
    }

    /// Returns `true` if the health endpoint answers 2xx.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the gateway cannot be reached at all.
    pub async fn health(&self) -> Result<bool> {
        let response = self.http.get(self.endpoint(HEALTH_PATH)).send().await?;
        let online = response.status().is_success();
        debug!(online, status = response.status().as_u16(), "Gateway health");
        Ok(online)
    }

    /// Asks for a plan.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::execute`].
    pub async fn plan(&self, objective: &str) -> Result<GatewayReply> {
        self.run(GatewayAction::Plan, objective).await
    }

    /// Asks for an analysis.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::execute`].
    pub async fn analyze(&self, content: &str) -> Result<GatewayReply> {
        self.run(GatewayAction::Analyze, content).await
    }

    /// Asks for generated content.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::execute`].
    pub async fn generate(&self, prompt: &str) -> Result<GatewayReply> {
        self.run(GatewayAction::Generate, prompt).await
    }

    /// Asks the gateway to read a resource.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::execute`].
    pub async fn read(&self, target: &str) -> Result<GatewayReply> {
        self.run(GatewayAction::Read, target).await
    }

    /// Asks for an explanation.
    ///
    /// # Errors
    ///
    /// See [`GatewayClient::execute`].
    pub async fn explain(&self, concept: &str) -> Result<GatewayReply> {
        self.run(GatewayAction::Explain, concept).await
    }

    #[inline]
    async fn run(&self, action: GatewayAction, text: &str) -> Result<GatewayReply> {
        self.execute(action, action.params(text)).await
    }

    /// Routes and handles one line of chat input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] for blank input or an unknown slash
    /// command, otherwise whatever [`GatewayClient::execute`] returns.
    pub async fn handle(&mut self, input: &str) -> Result<ChatOutcome> {
        let command =
            ChatCommand::parse(input).ok_or_else(|| Error::invalid_command("empty message"))?;

        match command {
            ChatCommand::Gateway { action, argument } => {
                self.run(action, &argument).await.map(ChatOutcome::Reply)
            }
            ChatCommand::SetMode(mode) => {
                self.set_mode(mode);
                Ok(ChatOutcome::ModeChanged(mode))
            }
            ChatCommand::Help => Ok(ChatOutcome::Help(HELP_TEXT)),
            ChatCommand::Unknown(name) => Err(Error::invalid_command(format!(
                "unknown command /{name}, use /help"
            ))),
        }
    }
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
