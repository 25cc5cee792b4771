//! Bot configuration.
//!
//! [`BotConfig`] is plain data with `Default` and `Deserialize`, so it can
//! come from a config file as easily as from code. [`BotBuilder`] is the
//! code-first way to fill one in.

use std::time::Duration;

use serde::Deserialize;

use crate::{Bot, BridgeError};

/// Request path used for reverse WebSocket connections by default.
pub const DEFAULT_PATH: &str = "/onebot";

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// How the bot reaches its OneBot implementation.
///
/// In JSON: `{"type": "ws", "endpoint": "ws://127.0.0.1:6700"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Protocol {
    /// Actions are HTTP POSTs to `base_url`; events arrive as webhook
    /// bodies handed to [`Bot::handle_webhook`].
    Http { base_url: String },

    /// We dial the implementation's WebSocket server.
    Ws { endpoint: String },

    /// The implementation dials us; upgrades are accepted on `path`.
    WsReverse {
        #[serde(default = "default_path")]
        path: String,
    },
}

impl Default for Protocol {
    fn default() -> Self {
        Self::WsReverse {
            path: default_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

/// Configuration for one bot account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The bot's own account id. Required.
    pub self_id: String,

    /// Must match the implementation's `access_token`.
    pub token: Option<String>,

    pub protocol: Protocol,

    /// How long an action call waits for its reply.
    ///
    /// Default: 60 000 ms.
    pub response_timeout_ms: u64,

    /// Set when this bot runs as a guild sub-bot of another account.
    /// Forward bundles are not available there and are sent as plain
    /// messages instead.
    pub sub_bot: bool,
}

impl BotConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            self_id: String::new(),
            token: None,
            protocol: Protocol::default(),
            response_timeout_ms: 60_000,
            sub_bot: false,
        }
    }
}

// ---------------------------------------------------------------------------
// BotBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`Bot`].
///
/// # Example
///
/// ```rust
/// use onebridge::{Bot, Protocol};
///
/// let bot = Bot::builder()
///     .self_id("123456")
///     .token("secret")
///     .protocol(Protocol::Ws { endpoint: "ws://127.0.0.1:6700".into() })
///     .build()
///     .unwrap();
/// assert_eq!(bot.self_id(), "123456");
/// ```
#[derive(Debug, Clone, Default)]
pub struct BotBuilder {
    config: BotConfig,
}

impl BotBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn config(mut self, config: BotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn self_id(mut self, self_id: impl Into<String>) -> Self {
        self.config.self_id = self_id.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn sub_bot(mut self, sub_bot: bool) -> Self {
        self.config.sub_bot = sub_bot;
        self
    }

    /// Validates the configuration and creates the bot.
    ///
    /// # Errors
    /// [`BridgeError::Config`] when `self_id` is empty or not numeric,
    /// or the timeout is zero.
    pub fn build(self) -> Result<Bot, BridgeError> {
        let config = self.config;
        if config.self_id.is_empty() || config.self_id.parse::<i64>().is_err() {
            return Err(BridgeError::Config(format!(
                "self_id must be a numeric account id, got {:?}",
                config.self_id
            )));
        }
        if config.response_timeout_ms == 0 {
            return Err(BridgeError::Config("response_timeout_ms must be positive".into()));
        }
        Ok(Bot::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_reverse_ws_with_60s_timeout() {
        let config = BotConfig::default();
        assert_eq!(config.protocol, Protocol::WsReverse { path: "/onebot".into() });
        assert_eq!(config.response_timeout(), Duration::from_secs(60));
        assert!(!config.sub_bot);
    }

    #[test]
    fn test_deserialize_partial_config_fills_defaults() {
        let config: BotConfig = serde_json::from_str(
            r#"{"self_id": "42", "protocol": {"type": "http", "base_url": "http://h:5700"}}"#,
        )
        .unwrap();
        assert_eq!(config.self_id, "42");
        assert_eq!(
            config.protocol,
            Protocol::Http {
                base_url: "http://h:5700".into()
            }
        );
        assert_eq!(config.response_timeout_ms, 60_000);
    }

    #[test]
    fn test_deserialize_ws_reverse_default_path() {
        let protocol: Protocol = serde_json::from_str(r#"{"type": "ws-reverse"}"#).unwrap();
        assert_eq!(protocol, Protocol::WsReverse { path: "/onebot".into() });
    }

    #[test]
    fn test_build_rejects_missing_self_id() {
        let err = BotBuilder::new().build().unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let err = BotBuilder::new()
            .self_id("1")
            .response_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
