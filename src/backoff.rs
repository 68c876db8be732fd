//! Exponential backoff arithmetic.

use chrono::{DateTime, Duration, Utc};

/// Configuration for the exponential backoff curve.
#[derive(Clone, Copy, Debug)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::minutes(1),
            max: Duration::minutes(30),
        }
    }
}

/// `backoff(n) = min(base * 2^(n-1), max)` for `n >= 1`, `backoff(0) = 0`.
///
/// Doubles per consecutive failure, capped at `max`, the same shape as a
/// classic retry-delay curve, keyed off `consecutive_errors` directly.
pub fn backoff(n: u32, config: &BackoffConfig) -> Duration {
    if n == 0 {
        return Duration::zero();
    }
    let multiplier = 2i64.saturating_pow(n.saturating_sub(1));
    let scaled = config.base.num_milliseconds().saturating_mul(multiplier);
    Duration::milliseconds(scaled).min(config.max)
}

/// Whether an endpoint with `consecutive_errors = n` and `last_error_at`
/// (`None` is always eligible, a defensive default — state invariants
/// forbid this when `state = Error`, but the arithmetic must not fault) is
/// eligible for selection/probing at `now`.
pub fn is_eligible(
    n: u32,
    last_error_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &BackoffConfig,
) -> bool {
    let Some(last_error_at) = last_error_at else {
        return true;
    };
    now - last_error_at >= backoff(n, config)
}
