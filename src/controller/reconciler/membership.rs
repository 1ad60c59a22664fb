//! # Membership Passes
//!
//! Add/update pass for a secret that exists and removal pass for one that is
//! gone. Every per-entry problem is logged, counted in the [`SyncReport`] and
//! skipped; neither pass can fail the key.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, error, info};

use crate::controller::differ::{self, CredentialDiff};
use crate::controller::reconciler::types::SyncReport;
use crate::controller::reconciler::Reconciler;
use crate::controller::registry::ClusterRecord;
use crate::observability;

impl<C: Send + Sync + 'static> Reconciler<C> {
    /// Register or refresh every cluster entry in `secret`.
    ///
    /// Entries whose cluster ID disappeared from the secret since the last
    /// pass are left registered; only deleting the secret removes them.
    pub(crate) async fn add_member_clusters(&self, secret_key: &str, secret: &Secret) -> SyncReport {
        let mut report = SyncReport::default();
        let entries = secret.data.as_ref().map_or(0, |data| data.len());
        debug!(secret = secret_key, entries, "reconciling cluster secret");

        for (cluster_id, credential) in secret.data.iter().flatten() {
            let credential = credential.0.as_slice();
            let (outcome, fingerprint) =
                differ::diff(&self.registry, cluster_id, secret_key, credential);

            match &outcome {
                CredentialDiff::Unchanged => {
                    info!(
                        cluster_id = cluster_id.as_str(),
                        secret = secret_key,
                        "kubeconfig unchanged, skipping"
                    );
                    report.unchanged += 1;
                    continue;
                }
                CredentialDiff::Conflict { existing_owner } => {
                    error!(
                        cluster_id = cluster_id.as_str(),
                        secret = secret_key,
                        existing_owner = existing_owner.as_str(),
                        "ClusterID reused in two different secrets: {existing_owner} and {secret_key}. \
                         ClusterID must be unique across all secrets"
                    );
                    observability::metrics::increment_cluster_conflicts();
                    report.conflicts += 1;
                    continue;
                }
                CredentialDiff::Create | CredentialDiff::Update => {}
            }

            info!(
                cluster_id = cluster_id.as_str(),
                secret = secret_key,
                action = outcome.as_str(),
                "{} cluster {cluster_id} from secret {secret_key}",
                outcome.as_str()
            );

            let client = match self.builder.build(credential).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    error!(
                        cluster_id = cluster_id.as_str(),
                        secret = secret_key,
                        error = %e,
                        "failed to build client for remote cluster"
                    );
                    observability::metrics::increment_client_build_errors();
                    report.build_failures += 1;
                    continue;
                }
            };

            self.registry.put(
                cluster_id,
                ClusterRecord {
                    cluster_id: cluster_id.clone(),
                    owner_key: secret_key.to_string(),
                    fingerprint,
                    client: Arc::clone(&client),
                },
            );

            let (callback, result) = if outcome == CredentialDiff::Create {
                report.added += 1;
                (
                    "added",
                    self.handler.cluster_added(cluster_id, client).await,
                )
            } else {
                report.updated += 1;
                (
                    "updated",
                    self.handler.cluster_updated(cluster_id, client).await,
                )
            };
            observability::metrics::increment_cluster_events(callback);

            if let Err(e) = result {
                error!(
                    cluster_id = cluster_id.as_str(),
                    secret = secret_key,
                    callback,
                    error = %e,
                    "cluster handler failed"
                );
                observability::metrics::increment_callback_errors(callback);
                report.callback_failures += 1;
            }
        }

        self.record_cluster_count();
        report
    }

    /// Remove every cluster owned by the deleted secret `secret_key`.
    ///
    /// The record is dropped even when the handler fails.
    pub(crate) async fn delete_member_clusters(&self, secret_key: &str) -> SyncReport {
        let mut report = SyncReport::default();

        for cluster_id in self.registry.cluster_ids_owned_by(secret_key) {
            info!(
                cluster_id = cluster_id.as_str(),
                secret = secret_key,
                "Deleting cluster_id={cluster_id} configured by secret={secret_key}"
            );
            if let Err(e) = self.handler.cluster_removed(&cluster_id).await {
                error!(
                    cluster_id = cluster_id.as_str(),
                    secret = secret_key,
                    error = %e,
                    "Error removing cluster_id={cluster_id} configured by secret={secret_key}"
                );
                observability::metrics::increment_callback_errors("removed");
                report.callback_failures += 1;
            }
            self.registry.remove(&cluster_id);
            observability::metrics::increment_cluster_events("removed");
            report.removed += 1;
        }

        self.record_cluster_count();
        report
    }

    fn record_cluster_count(&self) {
        let clusters = self.registry.len();
        info!(clusters, "Number of remote clusters: {clusters}");
        observability::metrics::set_remote_clusters(clusters);
    }
}
