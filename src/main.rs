//! # Multicluster Secret Controller
//!
//! Watches secrets labelled `istio/multiCluster=true` in the control
//! namespace. Every data entry of such a secret is a kubeconfig for one
//! remote cluster, keyed by cluster ID. The controller keeps one live client
//! per cluster ID and reports membership changes as clusters come and go.
//!
//! ## Endpoints
//!
//! - `/metrics`, `/healthz`, `/readyz`, `/clusters` on `METRICS_PORT`

use anyhow::{Context, Result};
use clap::Parser;
use multicluster_secret_controller::config::{ControllerConfig, ServerConfig};
use multicluster_secret_controller::controller::client::KubeconfigClientBuilder;
use multicluster_secret_controller::controller::handler::LoggingClusterHandler;
use multicluster_secret_controller::controller::server::ServerState;
use multicluster_secret_controller::runtime::initialization::{initialize, start_http_server};
use multicluster_secret_controller::runtime::watch_loop::start_secret_controller;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Multicluster secret controller
#[derive(Parser, Debug)]
#[command(name = "multicluster-secret-controller", version, long_about = None)]
struct Args {
    /// Namespace holding the multicluster secrets (overrides POD_NAMESPACE)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Port for metrics and probes (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut controller_config = ControllerConfig::from_env();
    if let Some(namespace) = args.namespace {
        controller_config.namespace = namespace;
    }
    let mut server_config = ServerConfig::from_env();
    if let Some(port) = args.metrics_port {
        server_config.metrics_port = port;
    }

    let init = initialize(&controller_config).await?;
    info!(
        namespace = controller_config.namespace.as_str(),
        max_retries = controller_config.max_retries,
        "controller configuration loaded"
    );

    let stop = CancellationToken::new();
    let (controller, controller_handle) = start_secret_controller(
        init.client,
        &controller_config.namespace,
        Arc::new(KubeconfigClientBuilder::new()),
        Arc::new(LoggingClusterHandler),
        &controller_config,
        stop.clone(),
    );

    let server_state = Arc::new(ServerState::new(
        controller.readiness(),
        controller.registry(),
    ));
    let server_handle = start_http_server(&server_config, server_state)
        .await
        .context("Failed to start HTTP server")?;

    tokio::spawn({
        let stop = stop.clone();
        async move {
            shutdown_signal().await;
            info!("Received shutdown signal, stopping controller...");
            stop.cancel();
        }
    });

    let result = controller_handle
        .await
        .context("controller task panicked")?;
    // Also reached when the controller fails on its own.
    stop.cancel();
    server_handle.abort();

    if let Err(e) = result {
        error!(error = %e, "controller exited with error");
        return Err(e.into());
    }
    info!("controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
