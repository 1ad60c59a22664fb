//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

use crate::controller::backoff::{
    BucketRateLimiter, ItemExponentialRateLimiter, MaxOfRateLimiter, RateLimiter,
};

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace watched for labeled cluster credential secrets
    pub namespace: String,
    /// How long to wait for the secret watch cache to report synced (seconds)
    pub cache_sync_timeout_secs: u64,
    /// Number of retries before a failing key is dropped
    pub max_retries: u32,
    /// Per-key exponential backoff starting value (milliseconds)
    pub backoff_base_ms: u64,
    /// Per-key exponential backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Overall requeue rate (tokens per second)
    pub rate_limit_qps: f64,
    /// Overall requeue burst size
    pub rate_limit_burst: u32,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            namespace: DEFAULT_CONTROL_NAMESPACE.to_string(),
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            rate_limit_qps: DEFAULT_RATE_LIMIT_QPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            log_level: "info".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            namespace: env_var_or_default_str("POD_NAMESPACE", DEFAULT_CONTROL_NAMESPACE),
            cache_sync_timeout_secs: env_var_or_default(
                "CACHE_SYNC_TIMEOUT_SECS",
                DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            ),
            max_retries: env_var_or_default("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_base_ms: env_var_or_default("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            rate_limit_qps: env_var_or_default("RATE_LIMIT_QPS", DEFAULT_RATE_LIMIT_QPS),
            rate_limit_burst: env_var_or_default("RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST),
            log_level: env_var_or_default_str("LOG_LEVEL", "info"),
        }
    }

    /// Get cache sync timeout duration
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    /// Get per-key backoff base duration
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get per-key backoff cap duration
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    /// Build the queue rate limiter: the slower of per-key exponential
    /// backoff and the overall token bucket.
    pub fn rate_limiter(&self) -> Box<dyn RateLimiter> {
        Box::new(MaxOfRateLimiter::new(vec![
            Box::new(ItemExponentialRateLimiter::new(
                self.backoff_base(),
                self.backoff_max(),
            )),
            Box::new(BucketRateLimiter::new(
                self.rate_limit_qps,
                self.rate_limit_burst,
            )),
        ]))
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
