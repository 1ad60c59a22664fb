//! Common test utilities for controller integration tests
//!
//! In-memory stand-ins for the secret cache, client construction and the
//! caller's cluster handler, plus a harness that drives a running
//! `SecretController` through a hand-fed watch stream.

#![allow(dead_code, reason = "each test binary uses a different subset of helpers")]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube_runtime::watcher;
use multicluster_secret_controller::config::ControllerConfig;
use multicluster_secret_controller::controller::client::{BuildError, ClientBuilder};
use multicluster_secret_controller::controller::handler::ClusterHandler;
use multicluster_secret_controller::controller::store::{secret_key, split_key, SecretStore, StoreError};
use multicluster_secret_controller::controller::{ControllerError, SecretController};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "istio-system";

/// Credential bytes the fake builder refuses.
pub const BAD_CREDENTIAL: &[u8] = b"bad";

pub fn secret(name: &str, version: &str, entries: &[(&str, &[u8])]) -> Secret {
    let data = entries
        .iter()
        .map(|(cluster_id, credential)| ((*cluster_id).to_string(), ByteString(credential.to_vec())))
        .collect::<BTreeMap<_, _>>();
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            resource_version: Some(version.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(data),
        ..Secret::default()
    }
}

pub fn key(name: &str) -> String {
    format!("{NAMESPACE}/{name}")
}

/// Controller settings with millisecond-scale backoff.
pub fn fast_config(max_retries: u32) -> ControllerConfig {
    ControllerConfig {
        namespace: NAMESPACE.to_string(),
        cache_sync_timeout_secs: 5,
        max_retries,
        backoff_base_ms: 1,
        backoff_max_secs: 1,
        rate_limit_qps: 10_000.0,
        rate_limit_burst: 10_000,
        ..ControllerConfig::default()
    }
}

/// Secret cache backed by a map; counts lookups and can fail chosen keys.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, Arc<Secret>>>,
    failing: Mutex<HashSet<String>>,
    lookups: Mutex<HashMap<String, usize>>,
}

impl MemorySecretStore {
    pub fn insert(&self, secret: Secret) {
        self.secrets
            .lock()
            .unwrap()
            .insert(secret_key(&secret), Arc::new(secret));
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Secret>> {
        self.secrets.lock().unwrap().remove(key)
    }

    pub fn fail_key(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn lookups(&self, key: &str) -> usize {
        self.lookups.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<Arc<Secret>>, StoreError> {
        *self.lookups.lock().unwrap().entry(key.to_string()).or_default() += 1;
        split_key(key)?;
        if self.failing.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable(format!("injected failure for {key}")));
        }
        Ok(self.secrets.lock().unwrap().get(key).cloned())
    }
}

/// Connection handle that remembers the bytes it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeClient {
    pub credential: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FakeClientBuilder {
    builds: Mutex<usize>,
}

impl FakeClientBuilder {
    pub fn builds(&self) -> usize {
        *self.builds.lock().unwrap()
    }
}

#[async_trait]
impl ClientBuilder<FakeClient> for FakeClientBuilder {
    async fn build(&self, credential: &[u8]) -> Result<FakeClient, BuildError> {
        *self.builds.lock().unwrap() += 1;
        if credential == BAD_CREDENTIAL {
            return Err(BuildError::Invalid("rejected by test builder".to_string()));
        }
        Ok(FakeClient {
            credential: credential.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    Added(String, Vec<u8>),
    Updated(String, Vec<u8>),
    Removed(String),
}

/// Records every callback; optionally fails or slows down adds.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ClusterEvent>>,
    pub fail_callbacks: bool,
    pub add_delay: Option<Duration>,
    pub panic_on: Option<String>,
}

impl RecordingHandler {
    pub fn failing() -> Self {
        Self {
            fail_callbacks: true,
            ..Self::default()
        }
    }

    pub fn slow(add_delay: Duration) -> Self {
        Self {
            add_delay: Some(add_delay),
            ..Self::default()
        }
    }

    /// Panics inside `cluster_added` for `cluster_id`.
    pub fn panicking_on(cluster_id: &str) -> Self {
        Self {
            panic_on: Some(cluster_id.to_string()),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, cluster_id: &str) -> Vec<ClusterEvent> {
        self.events()
            .into_iter()
            .filter(|event| match event {
                ClusterEvent::Added(id, _) | ClusterEvent::Updated(id, _) | ClusterEvent::Removed(id) => {
                    id == cluster_id
                }
            })
            .collect()
    }

    fn record(&self, event: ClusterEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        if self.fail_callbacks {
            anyhow::bail!("handler configured to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterHandler<FakeClient> for RecordingHandler {
    async fn cluster_added(&self, cluster_id: &str, client: Arc<FakeClient>) -> anyhow::Result<()> {
        if let Some(delay) = self.add_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on.as_deref() == Some(cluster_id) {
            panic!("handler blew up on {cluster_id}");
        }
        self.record(ClusterEvent::Added(
            cluster_id.to_string(),
            client.credential.clone(),
        ))
    }

    async fn cluster_updated(&self, cluster_id: &str, client: Arc<FakeClient>) -> anyhow::Result<()> {
        self.record(ClusterEvent::Updated(
            cluster_id.to_string(),
            client.credential.clone(),
        ))
    }

    async fn cluster_removed(&self, cluster_id: &str) -> anyhow::Result<()> {
        self.record(ClusterEvent::Removed(cluster_id.to_string()))
    }
}

type EventResult = Result<watcher::Event<Secret>, watcher::Error>;

/// A running controller fed by a hand-driven watch stream.
///
/// Every event helper updates the store before emitting the event, the same
/// order the reflector guarantees.
pub struct Harness {
    pub controller: Arc<SecretController<FakeClient>>,
    pub store: Arc<MemorySecretStore>,
    pub handler: Arc<RecordingHandler>,
    pub builder: Arc<FakeClientBuilder>,
    events: mpsc::UnboundedSender<EventResult>,
    stop: CancellationToken,
    task: JoinHandle<Result<(), ControllerError>>,
    flushes: AtomicU64,
}

impl Harness {
    pub fn start(config: &ControllerConfig, handler: RecordingHandler) -> Self {
        let store = Arc::new(MemorySecretStore::default());
        let handler = Arc::new(handler);
        let builder = Arc::new(FakeClientBuilder::default());
        let controller = Arc::new(SecretController::new(
            Arc::clone(&store) as Arc<dyn SecretStore>,
            Arc::clone(&builder) as Arc<dyn ClientBuilder<FakeClient>>,
            Arc::clone(&handler) as Arc<dyn ClusterHandler<FakeClient>>,
            config,
        ));

        let (events, rx) = mpsc::unbounded();
        let stop = CancellationToken::new();
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            let stop = stop.clone();
            async move { controller.run(rx, stop).await }
        });

        Self {
            controller,
            store,
            handler,
            builder,
            events,
            stop,
            task,
            flushes: AtomicU64::new(0),
        }
    }

    fn send(&self, event: watcher::Event<Secret>) {
        self.events
            .unbounded_send(Ok(event))
            .expect("controller is listening");
    }

    /// Emit the initial list for `secrets`.
    pub fn initial_list(&self, secrets: Vec<Secret>) {
        self.send(watcher::Event::Init);
        for secret in secrets {
            self.store.insert(secret.clone());
            self.send(watcher::Event::InitApply(secret));
        }
        self.send(watcher::Event::InitDone);
    }

    pub fn apply(&self, secret: Secret) {
        self.store.insert(secret.clone());
        self.send(watcher::Event::Apply(secret));
    }

    pub fn delete(&self, name: &str) {
        let secret = self
            .store
            .remove(&key(name))
            .expect("deleting a secret that was applied");
        self.send(watcher::Event::Delete((*secret).clone()));
    }

    /// Wait until every key enqueued before this call has been processed.
    ///
    /// Relies on the single FIFO worker: a fresh marker key is processed only
    /// after everything ahead of it.
    pub async fn flush(&self) {
        let n = self.flushes.fetch_add(1, Ordering::Relaxed);
        let name = format!("zz-flush-{n}");
        self.apply(secret(&name, "1", &[]));
        let marker = key(&name);
        wait_until(|| self.store.lookups(&marker) > 0).await;
    }

    pub async fn wait_ready(&self) {
        wait_until(|| self.controller.has_synced()).await;
    }

    pub async fn shutdown(self) {
        self.stop.cancel();
        self.join().await.expect("controller stops cleanly");
    }

    /// Wait for the controller to return without signalling stop.
    pub async fn join(self) -> Result<(), ControllerError> {
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("controller stops promptly")
            .expect("controller task does not panic")
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

/// Run `f` and fail if it takes longer than five seconds.
pub async fn within<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("timed out")
}
