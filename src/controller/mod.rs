//! # Controller
//!
//! Core controller modules for the multicluster secret controller.
//!
//! - `backoff`: per-key and overall rate limiters for requeues
//! - `client`: remote cluster client construction from kubeconfig bytes
//! - `differ`: credential fingerprinting and ownership checks
//! - `handler`: caller callbacks for membership changes
//! - `queue`: deduplicating rate-limited work queue
//! - `readiness`: one-way initial sync flag
//! - `reconciler`: per-key reconciliation
//! - `registry`: known remote clusters
//! - `server`: HTTP server for metrics and health checks
//! - `store`: read-through secret cache

pub mod backoff;
pub mod client;
pub mod differ;
pub mod handler;
pub mod queue;
pub mod readiness;
pub mod reconciler;
pub mod registry;
pub mod server;
pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use k8s_openapi::api::core::v1::Secret;
use kube_runtime::watcher;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use crate::constants::INITIAL_SYNC_SIGNAL;
use crate::runtime::watch_loop::EventRouter;
use client::ClientBuilder;
use handler::ClusterHandler;
use queue::ReconcileQueue;
use readiness::ReadinessGate;
use reconciler::Reconciler;
use registry::ClusterRegistry;
use store::SecretStore;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to sync secret controller cache within {0:?}")]
    CacheSyncTimeout(Duration),
    #[error("secret watch ended before the cache synced")]
    WatchEnded,
    #[error("reconcile worker exited before shutdown: {0}")]
    WorkerFailed(String),
}

/// Multicluster secret controller: owns the queue, the cluster registry and
/// the readiness gate for one control namespace.
pub struct SecretController<C> {
    reconciler: Arc<Reconciler<C>>,
    cache_sync_timeout: Duration,
}

impl<C> fmt::Debug for SecretController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretController")
            .field("reconciler", &self.reconciler)
            .field("cache_sync_timeout", &self.cache_sync_timeout)
            .finish()
    }
}

impl<C: Send + Sync + 'static> SecretController<C> {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        builder: Arc<dyn ClientBuilder<C>>,
        handler: Arc<dyn ClusterHandler<C>>,
        config: &ControllerConfig,
    ) -> Self {
        let reconciler = Reconciler::new(
            Arc::new(ClusterRegistry::new()),
            secrets,
            builder,
            handler,
            ReadinessGate::new(),
            ReconcileQueue::new(config.rate_limiter()),
            config.max_retries,
        );
        Self {
            reconciler: Arc::new(reconciler),
            cache_sync_timeout: config.cache_sync_timeout(),
        }
    }

    /// True once every secret present at startup has been reconciled.
    pub fn has_synced(&self) -> bool {
        self.reconciler.readiness.has_synced()
    }

    pub fn readiness(&self) -> ReadinessGate {
        self.reconciler.readiness.clone()
    }

    pub fn registry(&self) -> Arc<ClusterRegistry<C>> {
        Arc::clone(&self.reconciler.registry)
    }

    pub fn queue(&self) -> ReconcileQueue {
        self.reconciler.queue.clone()
    }

    /// Run until `stop` fires.
    ///
    /// Waits for the watch cache to sync, enqueues the initial-sync sentinel
    /// behind every startup key, then processes keys on a single worker.
    pub async fn run<S>(&self, events: S, stop: CancellationToken) -> Result<(), ControllerError>
    where
        S: Stream<Item = Result<watcher::Event<Secret>, watcher::Error>> + Send + 'static,
    {
        let queue = self.queue();
        let (synced_tx, mut synced_rx) = watch::channel(false);
        let router = EventRouter::new(queue.clone(), synced_tx);
        let router_stop = stop.child_token();
        let router_task = tokio::spawn(router.run(events, router_stop.clone()));

        info!("waiting for secret cache to sync");
        let synced = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            res = tokio::time::timeout(
                self.cache_sync_timeout,
                synced_rx.wait_for(|synced| *synced),
            ) => Some(res.map(|waited| waited.is_ok())),
        };
        let failure = match synced {
            None => {
                info!("stopped before secret cache synced");
                None
            }
            Some(Err(_elapsed)) => Some(ControllerError::CacheSyncTimeout(self.cache_sync_timeout)),
            Some(Ok(false)) => Some(ControllerError::WatchEnded),
            Some(Ok(true)) => {
                // Every startup key is already queued, so the sentinel lands behind them.
                queue.add(INITIAL_SYNC_SIGNAL);
                let reconciler = Arc::clone(&self.reconciler);
                let mut worker = tokio::spawn(async move { reconciler.run_worker().await });

                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        info!("shutting down multicluster secret controller");
                        queue.shut_down();
                        if let Err(e) = worker.await {
                            warn!(error = %e, "reconcile worker terminated abnormally");
                        }
                        None
                    }
                    // No key is processed again once the only worker is gone.
                    res = &mut worker => {
                        let reason = match res {
                            Ok(()) => "worker returned while the queue was open".to_string(),
                            Err(e) => e.to_string(),
                        };
                        error!(reason = reason.as_str(), "reconcile worker died, stopping controller");
                        Some(ControllerError::WorkerFailed(reason))
                    }
                }
            }
        };

        router_stop.cancel();
        if let Err(e) = router_task.await {
            warn!(error = %e, "secret event task terminated abnormally");
        }
        queue.shut_down();

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
