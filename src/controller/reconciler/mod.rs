//! # Reconciler
//!
//! Drains the reconcile queue one key at a time and brings the cluster
//! registry in line with the cached secret for that key.
//!
//! ## Reconciliation Flow
//!
//! 1. Dequeue a key
//! 2. Initial-sync sentinel: flip the readiness gate and stop
//! 3. Look the key up in the secret cache
//!    - **Present**: add/update every cluster entry in the secret
//!    - **Absent**: remove every cluster the secret owned
//! 4. Hand the result to the error policy (forget, requeue, or give up)
//! 5. Mark the key done

mod membership;
pub mod types;

pub use types::{KeyState, ReconcilerError, SyncReport};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, Instrument};

use crate::constants::INITIAL_SYNC_SIGNAL;
use crate::controller::client::ClientBuilder;
use crate::controller::handler::ClusterHandler;
use crate::controller::queue::ReconcileQueue;
use crate::controller::readiness::ReadinessGate;
use crate::controller::registry::ClusterRegistry;
use crate::controller::store::SecretStore;
use crate::observability;
use crate::runtime::error_policy::handle_reconcile_result;

pub struct Reconciler<C> {
    pub(crate) registry: Arc<ClusterRegistry<C>>,
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) builder: Arc<dyn ClientBuilder<C>>,
    pub(crate) handler: Arc<dyn ClusterHandler<C>>,
    pub(crate) readiness: ReadinessGate,
    pub(crate) queue: ReconcileQueue,
    pub(crate) max_retries: u32,
}

impl<C> fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .field("readiness", &self.readiness)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl<C: Send + Sync + 'static> Reconciler<C> {
    pub fn new(
        registry: Arc<ClusterRegistry<C>>,
        secrets: Arc<dyn SecretStore>,
        builder: Arc<dyn ClientBuilder<C>>,
        handler: Arc<dyn ClusterHandler<C>>,
        readiness: ReadinessGate,
        queue: ReconcileQueue,
        max_retries: u32,
    ) -> Self {
        Self {
            registry,
            secrets,
            builder,
            handler,
            readiness,
            queue,
            max_retries,
        }
    }

    /// Reconcile a single key against the current cache state.
    ///
    /// Only a failed cache lookup is an error; everything that goes wrong
    /// inside a secret is reported through the returned [`SyncReport`].
    pub async fn process_item(&self, key: &str) -> Result<SyncReport, ReconcilerError> {
        if key == INITIAL_SYNC_SIGNAL {
            if self.readiness.mark_synced() {
                info!(
                    clusters = self.registry.len(),
                    "initial secret sync complete, controller is ready"
                );
            }
            return Ok(SyncReport::default());
        }

        let secret = self
            .secrets
            .get(key)
            .map_err(|source| ReconcilerError::SecretLookup {
                key: key.to_string(),
                source,
            })?;

        let report = match secret {
            Some(secret) => self.add_member_clusters(key, &secret).await,
            None => self.delete_member_clusters(key).await,
        };
        Ok(report)
    }

    /// Process one key from the queue. Returns `false` once the queue has
    /// shut down and drained.
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let span = tracing::info_span!("controller.reconcile", key = key.as_str());
        let start = Instant::now();
        let result = self.process_item(&key).instrument(span.clone()).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed());

        let state = span.in_scope(|| {
            handle_reconcile_result(&self.queue, &key, result, self.max_retries)
        });
        observability::metrics::increment_reconciliations(state.as_str());

        self.queue.done(&key);
        true
    }

    /// Process keys until the queue shuts down.
    pub async fn run_worker(&self) {
        info!("reconcile worker started");
        while self.process_next_item().await {}
        info!("reconcile worker stopped");
    }
}
