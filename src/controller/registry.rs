//! # Cluster Registry
//!
//! Concurrent map from cluster ID to the live connection built for it.
//!
//! Readers take a shared lock for the duration of a single lookup or scan;
//! writes are serialized by the same `RwLock`, so the contract holds whether
//! one worker or several write. Ownership and conflict checks are the
//! caller's job (see [`crate::controller::differ`]); `put` overwrites blindly.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::controller::differ::Fingerprint;

/// A remote cluster known to the controller.
#[derive(Debug)]
pub struct ClusterRecord<C> {
    /// Stable identifier, unique across the registry
    pub cluster_id: String,
    /// `namespace/name` of the secret that owns this cluster ID
    pub owner_key: String,
    /// Digest of the exact credential bytes `client` was built from
    pub fingerprint: Fingerprint,
    /// Live connection; shared with handlers that received it
    pub client: Arc<C>,
}

impl<C> Clone for ClusterRecord<C> {
    fn clone(&self) -> Self {
        Self {
            cluster_id: self.cluster_id.clone(),
            owner_key: self.owner_key.clone(),
            fingerprint: self.fingerprint,
            client: Arc::clone(&self.client),
        }
    }
}

/// Credential-free view of a record, safe to expose over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub cluster_id: String,
    pub owner_key: String,
    pub fingerprint: String,
}

/// Read-only listing of known clusters, independent of the client type.
pub trait ClusterView: Send + Sync {
    fn summaries(&self) -> Vec<ClusterSummary>;
}

pub struct ClusterRegistry<C> {
    clusters: RwLock<HashMap<String, ClusterRecord<C>>>,
}

impl<C> fmt::Debug for ClusterRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("clusters", &self.len())
            .finish()
    }
}

impl<C> Default for ClusterRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClusterRegistry<C> {
    pub fn new() -> Self {
        Self {
            clusters: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ClusterRecord<C>>> {
        self.clusters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ClusterRecord<C>>> {
        self.clusters.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, cluster_id: &str) -> Option<ClusterRecord<C>> {
        self.read().get(cluster_id).cloned()
    }

    /// Insert or overwrite the record for `cluster_id`.
    pub fn put(&self, cluster_id: &str, record: ClusterRecord<C>) {
        self.write().insert(cluster_id.to_string(), record);
    }

    /// Remove `cluster_id`; no-op if absent.
    pub fn remove(&self, cluster_id: &str) -> Option<ClusterRecord<C>> {
        self.write().remove(cluster_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every record under the read lock. `f` must not call back into
    /// the registry's write methods.
    pub fn for_each(&self, mut f: impl FnMut(&str, &ClusterRecord<C>)) {
        for (cluster_id, record) in self.read().iter() {
            f(cluster_id, record);
        }
    }

    /// Cluster IDs currently owned by `owner_key`, sorted.
    pub fn cluster_ids_owned_by(&self, owner_key: &str) -> Vec<String> {
        let mut owned = Vec::new();
        self.for_each(|cluster_id, record| {
            if record.owner_key == owner_key {
                owned.push(cluster_id.to_string());
            }
        });
        owned.sort();
        owned
    }
}

impl<C: Send + Sync> ClusterView for ClusterRegistry<C> {
    fn summaries(&self) -> Vec<ClusterSummary> {
        let mut summaries = Vec::with_capacity(self.len());
        self.for_each(|cluster_id, record| {
            summaries.push(ClusterSummary {
                cluster_id: cluster_id.to_string(),
                owner_key: record.owner_key.clone(),
                fingerprint: record.fingerprint.to_string(),
            });
        });
        summaries.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        summaries
    }
}
