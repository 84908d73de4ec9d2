//! Marketplace Realtime Binary
//!
//! Connects to the marketplace message server, subscribes to price alert and
//! dispute broadcasts and logs every event until shut down.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin marketplace-realtime
//! ```
//!
//! # Environment Variables
//!
//! ## Required (one of)
//! - `REALTIME_AUTH_TOKEN`: auth token issued at sign-in
//! - `REALTIME_AUTH_TOKEN_FILE`: file holding the auth token
//!
//! ## Optional
//! - `REALTIME_ENV`: development | production (default: development)
//! - `REALTIME_WS_URL`: endpoint override
//! - `REALTIME_USER_ID`: user id stamped on outbound envelopes
//! - `REALTIME_HEARTBEAT_INTERVAL_SECS`: heartbeat period (default: 30)
//! - `REALTIME_RECONNECT_DELAY_INITIAL_MS`: backoff base (default: 1000)
//! - `REALTIME_RECONNECT_DELAY_MAX_MS`: backoff cap (default: 30000)
//! - `REALTIME_MAX_RECONNECT_ATTEMPTS`: attempt cap (default: 10)
//! - `REALTIME_METRICS_PORT`: serve Prometheus metrics on this port
//! - `REALTIME_LOG_FORMAT`: text | json (default: text)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use marketplace_realtime::infrastructure::realtime::{
    AUTH_TOKEN_FILE_ENV, EnvTokenProvider, FileTokenProvider,
};
use marketplace_realtime::infrastructure::telemetry;
use marketplace_realtime::{
    Envelope, InboundEvent, RealtimeClient, RealtimeSettings, TokenProvider, events,
    install_prometheus,
};
use serde_json::Value;
use tokio::signal;

/// How long shutdown waits for the server to acknowledge the close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server-pushed events logged by the binary.
const SERVER_EVENTS: &[&str] = &[
    events::PONG,
    events::NEW_MESSAGE,
    events::MESSAGE,
    events::TYPING,
    events::TYPING_START,
    events::TYPING_STOP,
    events::ORDER_STATUS_UPDATE,
    events::PRICE_ALERT_TRIGGERED,
    events::DISPUTE_UPDATE,
    events::NOTIFICATION,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    telemetry::init();

    tracing::info!("Starting marketplace realtime client");

    if let Some(port) = metrics_port() {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        install_prometheus(addr).context("failed to start metrics exporter")?;
        tracing::info!(addr = %addr, "Prometheus metrics listening");
    }

    let settings = RealtimeSettings::from_env().context("invalid realtime configuration")?;
    log_settings(&settings);

    let client = RealtimeClient::from_settings(&settings, token_provider());
    register_handlers(&client);

    client.connect();

    await_shutdown().await;

    if !client.shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Close handshake did not complete before shutdown");
    }

    tracing::info!("Marketplace realtime client stopped");
    Ok(())
}

/// Pick the token store: a token file when configured, else the environment.
fn token_provider() -> Arc<dyn TokenProvider> {
    match std::env::var(AUTH_TOKEN_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            tracing::info!(path = %path, "Reading auth token from file");
            Arc::new(FileTokenProvider::new(path.trim()))
        }
        _ => Arc::new(EnvTokenProvider::default()),
    }
}

fn metrics_port() -> Option<u16> {
    std::env::var("REALTIME_METRICS_PORT")
        .ok()
        .and_then(|v| v.trim().parse().ok())
}

/// Lifecycle logging, broadcast subscriptions on connect, and server events.
fn register_handlers(client: &RealtimeClient) {
    let subscriber = client.clone();
    client.on(events::CONNECTION, move |_| {
        tracing::info!("Connected, subscribing to broadcasts");
        subscriber.subscribe_price_alerts();
        subscriber.subscribe_disputes();
    });

    client.on(events::DISCONNECTION, |data| {
        tracing::info!(
            code = data["code"].as_u64(),
            reason = data["reason"].as_str().unwrap_or_default(),
            "Disconnected"
        );
    });

    client.on(events::RECONNECTING, |data| {
        tracing::info!(
            attempt = data["attempt"].as_u64(),
            delay_ms = data["delay_ms"].as_u64(),
            "Reconnect pending"
        );
    });

    client.on(events::ERROR, |data| {
        tracing::warn!(
            error = data["message"].as_str().unwrap_or_default(),
            "Realtime error"
        );
    });

    client.on(events::MAX_RECONNECT_ATTEMPTS, |data| {
        tracing::error!(
            attempts = data["attempts"].as_u64(),
            "Gave up reconnecting, restart to retry"
        );
    });

    for &event_type in SERVER_EVENTS {
        client.on(event_type, move |data| log_server_event(event_type, data));
    }
}

fn log_server_event(event_type: &str, data: &Value) {
    let envelope = Envelope::new(event_type, data.clone());
    match InboundEvent::from_envelope(&envelope) {
        Ok(InboundEvent::Pong) => tracing::trace!("Pong"),
        Ok(InboundEvent::NewMessage(message)) => tracing::info!(
            conversation_id = message.conversation_id.as_deref(),
            sender_id = message.sender_id.as_deref(),
            "New message"
        ),
        Ok(InboundEvent::Typing(indicator)) => tracing::debug!(
            conversation_id = %indicator.conversation_id,
            is_typing = indicator.is_typing,
            "Typing"
        ),
        Ok(InboundEvent::OrderStatusUpdate(update)) => tracing::info!(
            order_id = %update.order_id,
            status = %update.status,
            "Order status update"
        ),
        Ok(InboundEvent::PriceAlertTriggered(alert)) => tracing::info!(
            product_id = %alert.product_id,
            current_price = %alert.current_price,
            "Price alert triggered"
        ),
        Ok(InboundEvent::DisputeUpdate(update)) => tracing::info!(
            dispute_id = %update.dispute_id,
            status = %update.status,
            "Dispute update"
        ),
        Ok(InboundEvent::Notification(notification)) => tracing::info!(
            title = %notification.title,
            kind = notification.kind.as_deref(),
            "Notification"
        ),
        Ok(InboundEvent::Other { event_type, .. }) => {
            tracing::debug!(event_type = %event_type, "Unhandled event");
        }
        Err(e) => tracing::warn!(error = %e, "Unexpected event payload"),
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_settings(settings: &RealtimeSettings) {
    tracing::info!(
        environment = settings.environment.as_str(),
        url = %settings.ws_url,
        heartbeat_secs = settings.heartbeat_interval.as_secs(),
        max_reconnect_attempts = settings.max_reconnect_attempts,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
