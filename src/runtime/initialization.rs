//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! Kubernetes client setup and HTTP server startup.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Initialization result containing the pieces `main` wires together
pub struct InitializationResult {
    /// Kubernetes client for the local (control) cluster
    pub client: Client,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult").finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Kubernetes client creation
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    // Must run before anything touches rustls. Err means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing(&config.log_level);

    info!("Starting multicluster secret controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client for the control cluster")?;

    Ok(InitializationResult { client })
}

/// `RUST_LOG` wins; otherwise `log_level` applies to this crate only.
fn init_tracing(log_level: &str) {
    let default_filter = format!("multicluster_secret_controller={log_level}");
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init()
    {
        eprintln!("tracing subscriber already initialized: {e}");
    }
}

/// Start the HTTP server in the background and wait until it is bound.
pub async fn start_http_server(
    config: &ServerConfig,
    state: Arc<ServerState>,
) -> Result<JoinHandle<()>> {
    let port = config.metrics_port;
    let server_state = Arc::clone(&state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&state, &server_handle, config).await?;
    Ok(server_handle)
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_serving() {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
