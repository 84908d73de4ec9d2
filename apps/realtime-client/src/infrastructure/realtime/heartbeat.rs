//! Heartbeat Manager
//!
//! While the connection is open, asks the connection loop to send a `ping`
//! envelope on a fixed period. The manager only produces ticks; whether a
//! ping actually goes out is decided by the client, which drops it unless the
//! socket is open at that moment.
//!
//! One manager is spawned per open connection and cancelled on close or
//! explicit disconnect, so at most one heartbeat runs at a time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with a custom interval.
    ///
    /// A zero interval falls back to [`DEFAULT_HEARTBEAT_INTERVAL`].
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }.normalized()
    }

    /// The interval actually used; never zero.
    #[must_use]
    pub const fn normalized(self) -> Self {
        let interval = if self.interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            self.interval
        };
        Self { interval }
    }

    /// Create configuration from `RealtimeSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::RealtimeSettings) -> Self {
        Self::new(settings.heartbeat_interval)
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// A period elapsed; send a ping if the socket is open.
    Tick,
}

/// Periodic ping scheduler.
///
/// # Example
///
/// ```rust,no_run
/// use marketplace_realtime::infrastructure::realtime::heartbeat::{
///     HeartbeatConfig, HeartbeatEvent, HeartbeatManager,
/// };
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let (event_tx, mut event_rx) = mpsc::channel(4);
///     let cancel = CancellationToken::new();
///
///     tokio::spawn(HeartbeatManager::new(HeartbeatConfig::default(), event_tx, cancel.clone()).run());
///
///     while let Some(HeartbeatEvent::Tick) = event_rx.recv().await {
///         // send ping if open
///     }
/// }
/// ```
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config: config.normalized(),
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the receiving side goes away.
    ///
    /// The first tick fires one full interval after start.
    pub async fn run(self) {
        let period = self.config.interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.event_tx.send(HeartbeatEvent::Tick).await.is_err() {
                        tracing::debug!("Heartbeat channel closed, stopping heartbeat");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_thirty_seconds() {
        assert_eq!(HeartbeatConfig::default().interval, Duration::from_secs(30));
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        assert_eq!(
            HeartbeatConfig::new(Duration::ZERO).interval,
            DEFAULT_HEARTBEAT_INTERVAL
        );
        assert_eq!(
            HeartbeatConfig::new(Duration::from_secs(5)).interval,
            Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_literal_still_ticks() {
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let config = HeartbeatConfig {
            interval: Duration::ZERO,
        };
        let handle = tokio::spawn(HeartbeatManager::new(config, event_tx, cancel.clone()).run());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(event_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(event_rx.try_recv(), Ok(HeartbeatEvent::Tick));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_interval() {
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let manager = HeartbeatManager::new(
            HeartbeatConfig::new(Duration::from_secs(30)),
            event_tx,
            cancel.clone(),
        );
        let handle = tokio::spawn(manager.run());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(event_rx.try_recv().is_err(), "no tick before the first period");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(event_rx.try_recv().ok(), Some(HeartbeatEvent::Tick));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_interval() {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            HeartbeatManager::new(
                HeartbeatConfig::new(Duration::from_secs(30)),
                event_tx,
                cancel.clone(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(95)).await;

        let mut ticks = 0;
        while event_rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_manager() {
        let (event_tx, _event_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            HeartbeatManager::new(HeartbeatConfig::default(), event_tx, cancel.clone()).run(),
        );

        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "manager should shut down on cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_dropped() {
        let (event_tx, event_rx) = mpsc::channel(1);
        drop(event_rx);
        let handle = tokio::spawn(
            HeartbeatManager::new(
                HeartbeatConfig::new(Duration::from_secs(1)),
                event_tx,
                CancellationToken::new(),
            )
            .run(),
        );

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "manager should stop once nobody listens");
    }
}
