//! # Watch Loop
//!
//! Turns the secret watch into reconcile keys and wires the production
//! watcher + reflector into a [`SecretController`].
//!
//! The reflector updates its store before yielding each event, so by the time
//! a key reaches the queue the cache already holds the state it refers to.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use kube_runtime::{reflector, watcher, WatchStreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::constants::{MULTI_CLUSTER_SECRET_LABEL, MULTI_CLUSTER_SECRET_LABEL_VALUE};
use crate::controller::client::ClientBuilder;
use crate::controller::handler::ClusterHandler;
use crate::controller::queue::ReconcileQueue;
use crate::controller::store::secret_key;
use crate::controller::{ControllerError, SecretController};

/// Translates watch events into queue keys.
///
/// Keys seen during a (re-)list are held back until `InitDone`, then
/// enqueued together with every previously known key missing from the new
/// list. The first `InitDone` reports the watch cache as synced.
#[derive(Debug)]
pub struct EventRouter {
    queue: ReconcileQueue,
    synced: watch::Sender<bool>,
    /// Last resourceVersion seen per key
    versions: HashMap<String, Option<String>>,
    /// Keys collected by the list in progress
    relist: Option<HashMap<String, Option<String>>>,
}

impl EventRouter {
    pub fn new(queue: ReconcileQueue, synced: watch::Sender<bool>) -> Self {
        Self {
            queue,
            synced,
            versions: HashMap::new(),
            relist: None,
        }
    }

    pub fn handle_event(&mut self, event: watcher::Event<Secret>) {
        match event {
            watcher::Event::Apply(secret) => {
                let key = secret_key(&secret);
                let version = secret.metadata.resource_version.clone();
                if version.is_some() && self.versions.get(&key) == Some(&version) {
                    debug!(key = key.as_str(), "secret unchanged, ignoring update");
                    return;
                }
                debug!(key = key.as_str(), "secret applied");
                self.versions.insert(key.clone(), version);
                self.queue.add(&key);
            }
            watcher::Event::Delete(secret) => {
                let key = secret_key(&secret);
                debug!(key = key.as_str(), "secret deleted");
                self.versions.remove(&key);
                self.queue.add(&key);
            }
            watcher::Event::Init => {
                debug!("secret list started");
                self.relist = Some(HashMap::new());
            }
            watcher::Event::InitApply(secret) => {
                let key = secret_key(&secret);
                let version = secret.metadata.resource_version.clone();
                self.relist.get_or_insert_with(HashMap::new).insert(key, version);
            }
            watcher::Event::InitDone => self.finish_relist(),
        }
    }

    /// Enqueue the outcome of a completed list and report the cache synced.
    pub fn finish_relist(&mut self) {
        let listed = self.relist.take().unwrap_or_default();

        let mut changed = 0usize;
        for (key, version) in &listed {
            if version.is_none() || self.versions.get(key) != Some(version) {
                self.queue.add(key);
                changed += 1;
            }
        }

        let mut vanished = 0usize;
        for key in self.versions.keys() {
            if !listed.contains_key(key) {
                debug!(key = key.as_str(), "secret gone after re-list");
                self.queue.add(key);
                vanished += 1;
            }
        }

        info!(
            listed = listed.len(),
            changed, vanished, "secret list complete"
        );
        self.versions = listed;

        let first_sync = self.synced.send_if_modified(|synced| {
            let flipped = !*synced;
            *synced = true;
            flipped
        });
        if first_sync {
            info!("secret watch cache synced");
        }
    }

    /// Route events until the stream ends or `stop` fires.
    pub async fn run<S>(mut self, events: S, stop: CancellationToken)
    where
        S: Stream<Item = Result<watcher::Event<Secret>, watcher::Error>>,
    {
        futures::pin_mut!(events);
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("secret event routing stopped");
                    break;
                }
                next = events.next() => match next {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => {
                        warn!(error = %e, "secret watch error, watcher will retry");
                    }
                    None => {
                        warn!("secret watch stream ended");
                        break;
                    }
                },
            }
        }
    }
}

/// Watch labelled secrets in `namespace` and run a controller over them.
///
/// Returns immediately; the handle resolves when the controller stops.
pub fn start_secret_controller(
    client: Client,
    namespace: &str,
    builder: Arc<dyn ClientBuilder<Client>>,
    handler: Arc<dyn ClusterHandler<Client>>,
    config: &ControllerConfig,
    stop: CancellationToken,
) -> (Arc<SecretController<Client>>, JoinHandle<Result<(), ControllerError>>) {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let selector = format!("{MULTI_CLUSTER_SECRET_LABEL}={MULTI_CLUSTER_SECRET_LABEL_VALUE}");
    info!(
        namespace,
        selector = selector.as_str(),
        "starting multicluster secret controller"
    );

    let (reader, writer) = reflector::store();
    let events = reflector(
        writer,
        watcher(api, watcher::Config::default().labels(&selector)),
    )
    .default_backoff();

    let controller = Arc::new(SecretController::new(
        Arc::new(reader),
        builder,
        handler,
        config,
    ));

    let runner = Arc::clone(&controller);
    let handle = tokio::spawn(async move {
        let result = runner.run(events, stop).await;
        if let Err(e) = &result {
            error!(error = %e, "multicluster secret controller failed");
        }
        result
    });

    (controller, handle)
}
