//! # Reconcile Queue
//!
//! Deduplicating, rate-limited work queue of string keys.
//!
//! A key is in at most one of three places: waiting in the queue, being
//! processed by a worker, or parked as dirty while it is being processed
//! (re-added before `done`). Adding a key that is already waiting is a no-op,
//! so two rapid events for the same secret collapse into one reconciliation
//! pass that reads the latest cache state.
//!
//! ```text
//! add ──► [dirty + queue] ──get──► [processing] ──done──► gone
//!                                       │ add
//!                                       ▼
//!                                   [dirty] ──done──► [dirty + queue]
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::controller::backoff::RateLimiter;
use crate::observability;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter>,
}

/// Work queue handle; clones share the same queue.
#[derive(Clone)]
pub struct ReconcileQueue {
    inner: Arc<Inner>,
}

impl fmt::Debug for ReconcileQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ReconcileQueue")
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish_non_exhaustive()
    }
}

impl ReconcileQueue {
    pub fn new(rate_limiter: Box<dyn RateLimiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                rate_limiter,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `key` unless it is already waiting. Ignored after shutdown.
    pub fn add(&self, key: &str) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(key) {
            return;
        }
        state.dirty.insert(key.to_string());
        if state.processing.contains(key) {
            // Requeued by `done` once the current pass finishes.
            return;
        }
        state.queue.push_back(key.to_string());
        observability::metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue has been shut down and every waiting
    /// key has been handed out.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent add or
            // shutdown cannot slip between the check and the await.
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    observability::metrics::set_queue_depth(state.queue.len());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `key` as finished. If it was re-added meanwhile it becomes visible again.
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            observability::metrics::set_queue_depth(state.queue.len());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Add `key` after `delay` without blocking the caller.
    pub fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Re-enqueue `key` after the rate limiter's delay and count one more requeue.
    pub fn add_rate_limited(&self, key: &str) {
        let delay = self.inner.rate_limiter.when(key);
        debug!(key, delay_ms = delay.as_millis(), "queue.add_rate_limited");
        observability::metrics::increment_requeues();
        self.add_after(key, delay);
    }

    /// Reset backoff tracking for `key`.
    pub fn forget(&self, key: &str) {
        self.inner.rate_limiter.forget(key);
    }

    /// Requeues counted for `key` since it was last forgotten.
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.inner.rate_limiter.num_requeues(key)
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every waiting worker. Keys already
    /// waiting are still handed out.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
