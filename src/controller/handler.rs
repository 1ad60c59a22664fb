//! # Cluster Handlers
//!
//! The only way membership changes leave the controller. Handlers are awaited
//! inline by the reconcile worker, one call at a time; returned errors are
//! logged and counted, never retried.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use tracing::{info, warn};

/// Caller-supplied reaction to cluster membership changes.
///
/// The client handed to `cluster_added`/`cluster_updated` is shared with the
/// registry; a handler may keep it for as long as it likes.
#[async_trait]
pub trait ClusterHandler<C>: Send + Sync {
    async fn cluster_added(&self, cluster_id: &str, client: Arc<C>) -> anyhow::Result<()>;

    async fn cluster_updated(&self, cluster_id: &str, client: Arc<C>) -> anyhow::Result<()>;

    async fn cluster_removed(&self, cluster_id: &str) -> anyhow::Result<()>;
}

/// Logs membership changes and checks the remote API server answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingClusterHandler;

impl LoggingClusterHandler {
    async fn probe(cluster_id: &str, client: &Client) -> anyhow::Result<()> {
        let version = client.apiserver_version().await.map_err(|e| {
            anyhow::anyhow!("remote cluster {cluster_id} API server is unreachable: {e}")
        })?;
        info!(
            cluster_id,
            git_version = version.git_version.as_str(),
            platform = version.platform.as_str(),
            "remote cluster reachable"
        );
        Ok(())
    }
}

#[async_trait]
impl ClusterHandler<Client> for LoggingClusterHandler {
    async fn cluster_added(&self, cluster_id: &str, client: Arc<Client>) -> anyhow::Result<()> {
        info!(cluster_id, "remote cluster added");
        Self::probe(cluster_id, &client).await
    }

    async fn cluster_updated(&self, cluster_id: &str, client: Arc<Client>) -> anyhow::Result<()> {
        info!(cluster_id, "remote cluster credentials updated");
        Self::probe(cluster_id, &client).await
    }

    async fn cluster_removed(&self, cluster_id: &str) -> anyhow::Result<()> {
        warn!(cluster_id, "remote cluster removed");
        Ok(())
    }
}
