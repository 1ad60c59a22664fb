//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Label key marking a secret as carrying remote cluster credentials
pub const MULTI_CLUSTER_SECRET_LABEL: &str = "istio/multiCluster";

/// Label value selected alongside [`MULTI_CLUSTER_SECRET_LABEL`]
pub const MULTI_CLUSTER_SECRET_LABEL_VALUE: &str = "true";

/// Reserved queue key meaning "every pre-existing secret has been queued".
///
/// Secret keys are always `namespace/name`, so this can never collide.
pub const INITIAL_SYNC_SIGNAL: &str = "INIT";

/// Default namespace watched for cluster credential secrets
pub const DEFAULT_CONTROL_NAMESPACE: &str = "istio-system";

/// Retries before a failing key is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// How long to wait for the secret watch cache to sync (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 30;

/// Per-key exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Per-key exponential backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// Overall queue rate limit (requeues per second)
pub const DEFAULT_RATE_LIMIT_QPS: f64 = 10.0;

/// Overall queue rate limit burst size
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
