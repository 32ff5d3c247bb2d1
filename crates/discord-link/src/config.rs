//! Plugin configuration.
//!
//! The host stores plugin settings as a JSON document with PascalCase
//! sections. Every key is optional; missing keys take the defaults below,
//! so an empty object `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "API": {
//!     "WebSocketUrl": "ws://localhost:3000/ws",
//!     "VerifiedUsersUrl": "http://localhost:3000/api/verified-users"
//!   },
//!   "Group": { "Name": "discord" },
//!   "Messages": { "ApiError": "Lookup failed (HTTP {code})" },
//!   "Reconnect": { "CloseDelaySecs": 5, "ErrorDelaySecs": 10 }
//! }
//! ```

use std::time::Duration;

use discord_link_reconnect::ReconnectConfig;
use discord_link_verify::VerificationMessages;
use serde::{Deserialize, Serialize};

use crate::LinkError;

/// Complete plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    #[serde(rename = "API")]
    pub api: ApiConfig,
    #[serde(rename = "Group")]
    pub group: GroupConfig,
    #[serde(rename = "Messages")]
    pub messages: MessagesConfig,
    #[serde(rename = "Reconnect")]
    pub reconnect: ReconnectSettings,
}

/// Where the verification service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiConfig {
    /// Push channel, `ws://` or `wss://`.
    pub web_socket_url: String,
    /// HTTP listing of every verified user, for polling mode.
    pub verified_users_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            web_socket_url: "ws://localhost:3000/ws".into(),
            verified_users_url: "http://localhost:3000/api/verified-users"
                .into(),
        }
    }
}

/// The permission group verified players are added to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GroupConfig {
    pub name: String,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: "discord".into(),
        }
    }
}

/// Every chat reply the plugin can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MessagesConfig {
    pub already_verified: String,
    pub now_verified: String,
    pub not_verified: String,
    pub connection_error: String,
    /// Sent when the listing endpoint answers with an HTTP error.
    /// `{code}` is replaced by the status code.
    pub api_error: String,
    pub parse_error: String,
    pub discord_link: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        let verification = VerificationMessages::default();
        Self {
            already_verified: verification.already_verified,
            now_verified: verification.now_verified,
            not_verified: "❌ You are not verified. Please link your account \
                           on our Discord."
                .into(),
            connection_error: "❌ Could not reach the verification service. \
                               Please try again later."
                .into(),
            api_error: "❌ Could not verify your account (HTTP {code})".into(),
            parse_error: "❌ Error processing verification data.".into(),
            discord_link: "🔗 Join our Discord: https://discord.gg/yourserver"
                .into(),
        }
    }
}

impl MessagesConfig {
    /// The API error reply for HTTP status `code`.
    pub fn api_error_for(&self, code: u16) -> String {
        self.api_error.replace("{code}", &code.to_string())
    }

    /// The subset of replies the verification processor sends.
    pub fn verification(&self) -> VerificationMessages {
        VerificationMessages {
            already_verified: self.already_verified.clone(),
            now_verified: self.now_verified.clone(),
        }
    }
}

/// Reconnect delays, in config-file units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReconnectSettings {
    pub close_delay_secs: u64,
    pub error_delay_secs: u64,
    pub connect_failure_delay_secs: u64,
    pub max_jitter_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let defaults = ReconnectConfig::default();
        Self {
            close_delay_secs: defaults.close_delay.as_secs(),
            error_delay_secs: defaults.error_delay.as_secs(),
            connect_failure_delay_secs: defaults
                .connect_failure_delay
                .as_secs(),
            max_jitter_ms: defaults.max_jitter.as_millis() as u64,
        }
    }
}

impl ReconnectSettings {
    /// Converts to the scheduler's config, clamping delays into its bounds.
    pub fn to_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            close_delay: Duration::from_secs(self.close_delay_secs),
            error_delay: Duration::from_secs(self.error_delay_secs),
            connect_failure_delay: Duration::from_secs(
                self.connect_failure_delay_secs,
            ),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
        .validated()
    }
}

impl LinkConfig {
    /// Builds a config from the host's JSON settings document.
    ///
    /// # Errors
    /// [`LinkError::Config`] if a present key has the wrong type.
    pub fn from_value(value: serde_json::Value) -> Result<Self, LinkError> {
        serde_json::from_value(value).map_err(|e| LinkError::Config(e.to_string()))
    }

    /// Parses a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, LinkError> {
        serde_json::from_str(text).map_err(|e| LinkError::Config(e.to_string()))
    }

    /// Checks the settings the push mode depends on.
    ///
    /// # Errors
    /// [`LinkError::Config`] if the WebSocket URL has the wrong scheme or
    /// the group name is empty.
    pub fn validate_websocket(&self) -> Result<(), LinkError> {
        let url = self.api.web_socket_url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(LinkError::Config(format!(
                "API.WebSocketUrl must start with ws:// or wss://, got {url:?}"
            )));
        }
        self.validate_group()
    }

    /// Checks the settings the polling mode depends on.
    pub fn validate_polling(&self) -> Result<(), LinkError> {
        let url = self.api.verified_users_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LinkError::Config(format!(
                "API.VerifiedUsersUrl must start with http:// or https://, got {url:?}"
            )));
        }
        self.validate_group()
    }

    fn validate_group(&self) -> Result<(), LinkError> {
        if self.group.name.trim().is_empty() {
            return Err(LinkError::Config("Group.Name must not be empty".into()));
        }
        Ok(())
    }
}
