//! # Readiness Gate
//!
//! One-way flag flipped when the initial-sync sentinel is processed. Unlike
//! the watch cache's own "synced" state, this only becomes true after every
//! secret that existed at startup has been reconciled at least once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    synced: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking readiness check.
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Flip the gate. Returns `true` only for the call that flipped it.
    pub fn mark_synced(&self) -> bool {
        !self.synced.swap(true, Ordering::AcqRel)
    }
}
