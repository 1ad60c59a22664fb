//! # Types
//!
//! Core types for the reconciler.

use thiserror::Error;

use crate::controller::store::StoreError;

/// Failure of a whole key's processing; retried by the queue.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("error fetching object {key}: {source}")]
    SecretLookup {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// What one reconciliation pass did.
///
/// Per-entry problems (build failures, conflicts, callback errors) are
/// counted here but never fail the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub build_failures: usize,
    pub callback_failures: usize,
    pub removed: usize,
}

impl SyncReport {
    /// True when the pass changed nothing in the registry.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Per-key processing state, as seen by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Processed successfully; backoff forgotten
    Succeeded,
    /// Failed; requeued with rate limiting
    Retrying,
    /// Failed past the retry bound; dropped until a fresh event
    GivenUp,
}

impl KeyState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyState::Succeeded => "success",
            KeyState::Retrying => "retry",
            KeyState::GivenUp => "given_up",
        }
    }
}
