//! Logging Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `marketplace_realtime=info`)
//! - `REALTIME_LOG_FORMAT`: `json` for structured output, anything else for
//!   human-readable text
//!
//! # Usage
//!
//! ```ignore
//! use marketplace_realtime::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!("client starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive applied when `RUST_LOG` does not mention the crate.
const DEFAULT_DIRECTIVE: &str = "marketplace_realtime=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a format name, falling back to text.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Output format.
    pub format: LogFormat,
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let format = std::env::var("REALTIME_LOG_FORMAT")
            .map(|v| LogFormat::from_str_case_insensitive(&v))
            .unwrap_or_default();

        Self { format }
    }
}

/// Initialize logging from the environment.
pub fn init() {
    init_with_config(&TelemetryConfig::from_env());
}

/// Initialize logging with explicit configuration.
///
/// Does nothing if a global subscriber is already installed.
#[allow(clippy::expect_used)]
pub fn init_with_config(config: &TelemetryConfig) {
    let env_filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_DIRECTIVE
            .parse()
            .expect("static directive 'marketplace_realtime=info' is valid"),
    );

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str_case_insensitive("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_case_insensitive(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::from_str_case_insensitive("pretty"), LogFormat::Text);
        assert_eq!(LogFormat::from_str_case_insensitive(""), LogFormat::Text);
    }

    #[test]
    fn default_directive_parses() {
        assert!(DEFAULT_DIRECTIVE.parse::<tracing_subscriber::filter::Directive>().is_ok());
    }

    #[test]
    fn init_twice_does_not_panic() {
        let config = TelemetryConfig::default();
        init_with_config(&config);
        init_with_config(&config);
    }
}
