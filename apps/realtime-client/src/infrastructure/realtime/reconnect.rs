//! Reconnection Policy
//!
//! Capped exponential backoff for reconnecting after an abnormal close:
//!
//! ```text
//! delay(n) = min(initial_delay * multiplier^n, max_delay)
//! ```
//!
//! where `n` is the number of reconnects already scheduled since the last
//! successful open. With the defaults this yields 1s, 2s, 4s, 8s, 16s and then
//! 30s for every later attempt, for at most 10 attempts.

use std::time::Duration;

use rand::Rng;

/// Default base delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);

/// Default delay cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default attempt cap.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (0.1 = ±10% randomization, 0 = none).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `RealtimeSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::RealtimeSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Backoff delay for the given zero-based attempt, before jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max_millis = self.max_delay.as_millis();

        #[allow(clippy::cast_precision_loss)]
        let base = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = (base * self.multiplier.powi(exponent)).round();

        let millis = if scaled.is_finite() && scaled >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Reconnection policy tracking consecutive attempts.
///
/// # Example
///
/// ```rust
/// use marketplace_realtime::infrastructure::realtime::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(policy.attempt_count(), 2);
///
/// // Successful open
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Consume one attempt and return its delay.
    ///
    /// Returns `None` once `max_attempts` attempts have been handed out.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let delay = self.config.delay_for_attempt(self.attempt_count);
        self.attempt_count += 1;

        Some(self.apply_jitter(delay))
    }

    /// Reset the policy after a successful connection or explicit disconnect.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of attempts handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if another attempt may be scheduled.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
