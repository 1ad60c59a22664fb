//! # Credential Differ
//!
//! Decides what a credential entry means for the registry, by comparing a
//! SHA-256 digest of the raw bytes against the stored record. Byte equality
//! of digests is the only equality; parsed kubeconfigs are never compared.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::controller::registry::ClusterRegistry;

/// SHA-256 digest of raw credential bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Outcome of comparing one credential entry against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialDiff {
    /// No record exists for the cluster ID
    Create,
    /// Same owner, different bytes
    Update,
    /// Same owner, identical bytes; skip every side effect
    Unchanged,
    /// Another secret already owns the cluster ID; leave it alone
    Conflict { existing_owner: String },
}

impl CredentialDiff {
    /// Verb used in log lines and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialDiff::Create => "adding",
            CredentialDiff::Update => "updating",
            CredentialDiff::Unchanged => "unchanged",
            CredentialDiff::Conflict { .. } => "conflict",
        }
    }
}

/// Classify `credential` for `cluster_id` presented by `owner_key`.
///
/// Returns the fingerprint alongside so callers store exactly the digest
/// that was compared.
pub fn diff<C>(
    registry: &ClusterRegistry<C>,
    cluster_id: &str,
    owner_key: &str,
    credential: &[u8],
) -> (CredentialDiff, Fingerprint) {
    let fingerprint = Fingerprint::of(credential);
    let Some(existing) = registry.get(cluster_id) else {
        return (CredentialDiff::Create, fingerprint);
    };
    let outcome = if existing.owner_key != owner_key {
        CredentialDiff::Conflict {
            existing_owner: existing.owner_key,
        }
    } else if existing.fingerprint == fingerprint {
        CredentialDiff::Unchanged
    } else {
        CredentialDiff::Update
    };
    (outcome, fingerprint)
}
