//! # Configuration
//!
//! Controller and HTTP server settings, read from the environment at startup.
//!
//! - `controller`: watch namespace, retry policy, queue rate limits, logging
//! - [`ServerConfig`]: metrics/probe server settings

mod controller;

pub use controller::ControllerConfig;

use controller::env_var_or_default;

/// HTTP server configuration for metrics and probes
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the metrics/probe server binds to
    pub metrics_port: u16,
    /// How long to wait for the server to bind before failing startup (seconds)
    pub startup_timeout_secs: u64,
    /// Poll interval while waiting for the server to bind (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }
}
