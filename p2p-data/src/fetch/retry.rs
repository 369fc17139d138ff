//! Retry policy for advert searches.

use derive_more::Constructor;
use std::time::Duration;

/// Default number of attempts per side before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default exponential backoff base, in seconds.
pub const DEFAULT_BACKOFF_BASE: f64 = 1.5;

/// Longest wait between two attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff between failed advert search attempts.
///
/// After failed attempt `k` (0-indexed) the caller waits
/// `initial_delay * backoff_factor^k`.
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(1),
            backoff_factor: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryConfig {
    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, DEFAULT_BACKOFF_BASE)
    }

    /// Calculate the delay following failed attempt `attempt` (0-indexed).
    ///
    /// Capped at [`MAX_DELAY`]; a negative or NaN product means no wait.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }

        Duration::try_from_secs_f64(secs).map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    /// Whether another attempt follows failed attempt `attempt` (0-indexed).
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
