//! # Error Policy
//!
//! Decides what happens to a key after the worker processed it: forget its
//! backoff, requeue it rate limited, or give up on it.

use crate::controller::queue::ReconcileQueue;
use crate::controller::reconciler::{KeyState, ReconcilerError, SyncReport};
use crate::observability;
use tracing::{debug, error, warn};

/// Apply the retry policy to one processed key.
///
/// A key that keeps failing is attempted at most `max_retries + 1` times.
/// Giving up forgets the key's backoff, so the next event for it starts fresh.
pub fn handle_reconcile_result(
    queue: &ReconcileQueue,
    key: &str,
    result: Result<SyncReport, ReconcilerError>,
    max_retries: u32,
) -> KeyState {
    match result {
        Ok(report) => {
            debug!(key, ?report, "reconciliation.success");
            queue.forget(key);
            KeyState::Succeeded
        }
        Err(error) => {
            let requeues = queue.num_requeues(key);
            if requeues < max_retries {
                warn!(
                    key,
                    error = %error,
                    requeues,
                    "Error processing {key} (will retry): {error}"
                );
                queue.add_rate_limited(key);
                KeyState::Retrying
            } else {
                error!(
                    key,
                    error = %error,
                    requeues,
                    "Error processing {key} (giving up): {error}"
                );
                queue.forget(key);
                observability::metrics::increment_given_up();
                KeyState::GivenUp
            }
        }
    }
}
