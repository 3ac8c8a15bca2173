//! Retry bookkeeping and backoff computation.

use std::time::Duration;

use rand::Rng;

/// Default number of retries for one logical call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry state threaded through one logical call.
///
/// `attempt` counts retries already made; a failure is surfaced once
/// `attempt == max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    /// Whether another retry is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// The context for the following retry.
    pub fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Backoff parameters for network errors and rate limiting.
///
/// - Network errors wait `min(network_base * 2^attempt, network_cap)`.
/// - Rate limits wait `min(retry_after, rate_limit_cap) * (attempt + 1)`.
///
/// Both add a random jitter in `[0, max_jitter]`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub network_base: Duration,
    pub network_cap: Duration,
    pub rate_limit_cap: Duration,
    /// Used when the server does not say how long to wait.
    pub default_retry_after: Duration,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            network_base: Duration::from_millis(1_000),
            network_cap: Duration::from_millis(10_000),
            rate_limit_cap: Duration::from_millis(30_000),
            default_retry_after: Duration::from_millis(1_000),
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

impl BackoffPolicy {
    /// Same policy without jitter, for deterministic waits.
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Network backoff before jitter.
    pub fn network_window(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.network_base
            .checked_mul(multiplier)
            .unwrap_or(self.network_cap)
            .min(self.network_cap)
    }

    /// Rate-limit backoff before jitter.
    pub fn rate_limit_window(&self, retry_after: Option<Duration>, attempt: u32) -> Duration {
        let suggested = retry_after
            .unwrap_or(self.default_retry_after)
            .min(self.rate_limit_cap);
        suggested.saturating_mul(attempt.saturating_add(1))
    }

    /// Full network delay including jitter.
    pub fn network_delay(&self, attempt: u32) -> Duration {
        self.network_window(attempt) + self.jitter()
    }

    /// Full rate-limit delay including jitter.
    pub fn rate_limit_delay(&self, retry_after: Option<Duration>, attempt: u32) -> Duration {
        self.rate_limit_window(retry_after, attempt) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
