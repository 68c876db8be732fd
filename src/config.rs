//! Selector configuration: public fields, `with_*` builder methods, and a
//! `Default` impl carrying the documented defaults.

use crate::backoff::BackoffConfig;
use chrono::Duration as ChronoDuration;
use std::time::Duration;

/// All nine configuration keys the selector and health loop share.
#[derive(Clone, Debug)]
pub struct SelectorConfig {
    /// TTL on cache entries written by `get_best`/`get_next`.
    pub cache_duration: Duration,

    /// Failure count at which an Active endpoint transitions to Error.
    pub max_consecutive_errors: u32,

    /// Per-probe network timeout in the health loop.
    pub request_timeout: Duration,

    /// Whether `get_best` may return a Disabled endpoint when nothing
    /// healthier exists.
    pub allow_disabled_fallback: bool,

    /// Sleep between health loop iterations.
    pub health_check_interval: Duration,

    /// When false, the health loop exits at startup instead of iterating.
    pub enable_health_checks: bool,

    /// Base/cap of the exponential backoff curve.
    pub backoff: BackoffConfig,

    /// Appended to cache keys to isolate tenants sharing one cache
    /// backend.
    pub cache_key_prefix: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(300),
            max_consecutive_errors: 5,
            request_timeout: Duration::from_secs(30),
            allow_disabled_fallback: false,
            health_check_interval: Duration::from_secs(5 * 60),
            enable_health_checks: true,
            backoff: BackoffConfig::default(),
            cache_key_prefix: None,
        }
    }
}

impl SelectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_allow_disabled_fallback(mut self, allow: bool) -> Self {
        self.allow_disabled_fallback = allow;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_enable_health_checks(mut self, enable: bool) -> Self {
        self.enable_health_checks = enable;
        self
    }

    pub fn with_base_backoff_minutes(mut self, minutes: i64) -> Self {
        self.backoff.base = ChronoDuration::minutes(minutes);
        self
    }

    pub fn with_max_backoff_minutes(mut self, minutes: i64) -> Self {
        self.backoff.max = ChronoDuration::minutes(minutes);
        self
    }

    pub fn with_cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_key_prefix = Some(prefix.into());
        self
    }
}
