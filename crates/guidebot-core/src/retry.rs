//! Backoff schedule for rate-limited embedding calls.

use std::time::Duration;

/// Retry policy applied when an embedder reports
/// [`RateLimited`](crate::error::EmbedError::RateLimited).
///
/// Attempts are counted from 1. The delay before attempt `n + 1` is
/// `initial_backoff × multiplier^(n - 1)`, capped at `max_backoff`. A
/// server-supplied `Retry-After` hint replaces the computed delay when it
/// is longer, still subject to the cap.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as i32;
        let computed_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        let cap_ms = self.max_backoff.as_millis() as f64;
        let computed = Duration::from_millis(computed_ms.min(cap_ms).round() as u64);
        match hint {
            Some(h) if h > computed => h.min(self.max_backoff),
            _ => computed,
        }
    }
}
