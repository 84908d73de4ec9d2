//! Realtime Client Settings
//!
//! Configuration types for the realtime client, loaded from environment variables.

use std::time::Duration;

/// Development endpoint.
pub const DEVELOPMENT_WS_URL: &str = "ws://localhost:8000/ws";

/// Production endpoint.
pub const PRODUCTION_WS_URL: &str = "wss://api.marketplace.app/ws";

/// Deployment environment selecting the default endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development server.
    #[default]
    Development,
    /// Production server.
    Production,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Check if this is the production environment.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// Default WebSocket endpoint for this environment.
    #[must_use]
    pub const fn default_ws_url(&self) -> &'static str {
        match self {
            Self::Development => DEVELOPMENT_WS_URL,
            Self::Production => PRODUCTION_WS_URL,
        }
    }
}

/// Complete realtime client configuration.
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Deployment environment.
    pub environment: Environment,
    /// WebSocket endpoint, without the token query parameter.
    pub ws_url: String,
    /// User id stamped on outbound envelopes.
    pub user_id: Option<String>,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            ws_url: DEVELOPMENT_WS_URL.to_string(),
            user_id: None,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_millis(1_000),
            reconnect_delay_max: Duration::from_millis(30_000),
            max_reconnect_attempts: 10,
        }
    }
}

impl RealtimeSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `REALTIME_WS_URL` is set but empty or not a
    /// `ws://` / `wss://` URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeSettings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let environment = lookup("REALTIME_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let ws_url = match lookup("REALTIME_WS_URL") {
            Some(url) => validate_ws_url("REALTIME_WS_URL", url)?,
            None => environment.default_ws_url().to_string(),
        };

        let user_id = lookup("REALTIME_USER_ID").filter(|s| !s.trim().is_empty());

        Ok(Self {
            environment,
            ws_url,
            user_id,
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "REALTIME_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "REALTIME_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_millis(
                &lookup,
                "REALTIME_RECONNECT_DELAY_MAX_MS",
                defaults.reconnect_delay_max,
            ),
            max_reconnect_attempts: parse_u32(
                &lookup,
                "REALTIME_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

fn validate_ws_url(key: &str, url: String) -> Result<String, ConfigError> {
    let url = url.trim().to_string();
    if url.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected ws:// or wss:// URL, got {url}"),
        });
    }
    Ok(url)
}

fn parse_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map_or(default, Duration::from_millis)
}
