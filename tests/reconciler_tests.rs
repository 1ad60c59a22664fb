//! # Reconciler Tests
//!
//! Drives `Reconciler::process_item` directly against the in-memory store,
//! one key at a time, and checks callbacks and registry contents.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    key, secret, ClusterEvent, FakeClient, FakeClientBuilder, MemorySecretStore, RecordingHandler,
    BAD_CREDENTIAL,
};
use multicluster_secret_controller::controller::backoff::ItemExponentialRateLimiter;
use multicluster_secret_controller::controller::differ::Fingerprint;
use multicluster_secret_controller::controller::queue::ReconcileQueue;
use multicluster_secret_controller::controller::readiness::ReadinessGate;
use multicluster_secret_controller::controller::reconciler::{Reconciler, SyncReport};
use multicluster_secret_controller::controller::registry::ClusterRegistry;

struct Fixture {
    reconciler: Reconciler<FakeClient>,
    registry: Arc<ClusterRegistry<FakeClient>>,
    store: Arc<MemorySecretStore>,
    handler: Arc<RecordingHandler>,
    builder: Arc<FakeClientBuilder>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_handler(RecordingHandler::default())
    }

    fn with_handler(handler: RecordingHandler) -> Self {
        let registry = Arc::new(ClusterRegistry::new());
        let store = Arc::new(MemorySecretStore::default());
        let handler = Arc::new(handler);
        let builder = Arc::new(FakeClientBuilder::default());
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::clone(&store) as _,
            Arc::clone(&builder) as _,
            Arc::clone(&handler) as _,
            ReadinessGate::new(),
            ReconcileQueue::new(Box::new(ItemExponentialRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_millis(10),
            ))),
            5,
        );
        Self {
            reconciler,
            registry,
            store,
            handler,
            builder,
        }
    }

    async fn reconcile(&self, name: &str) -> SyncReport {
        self.reconciler
            .process_item(&key(name))
            .await
            .expect("lookup succeeds")
    }

    async fn apply(&self, name: &str, entries: &[(&str, &[u8])]) -> SyncReport {
        self.store.insert(secret(name, "1", entries));
        self.reconcile(name).await
    }

    async fn delete(&self, name: &str) -> SyncReport {
        self.store.remove(&key(name));
        self.reconcile(name).await
    }
}

#[tokio::test]
async fn test_unchanged_credentials_are_idempotent() {
    let fx = Fixture::new();
    fx.apply("creds-1", &[("east", b"a")]).await;
    let fingerprint = fx.registry.get("east").unwrap().fingerprint;

    let report = fx.apply("creds-1", &[("east", b"a")]).await;

    assert_eq!(report.unchanged, 1);
    assert!(report.is_noop());
    assert_eq!(fx.handler.events().len(), 1);
    assert_eq!(fx.builder.builds(), 1);
    assert_eq!(fx.registry.get("east").unwrap().fingerprint, fingerprint);
    assert_eq!(fingerprint, Fingerprint::of(b"a"));
}

#[tokio::test]
async fn test_conflicting_cluster_id_is_rejected() {
    let fx = Fixture::new();
    fx.apply("creds-a", &[("x", b"from-a")]).await;

    let report = fx.apply("creds-b", &[("x", b"from-b")]).await;

    assert_eq!(report.conflicts, 1);
    assert!(report.is_noop());
    let record = fx.registry.get("x").unwrap();
    assert_eq!(record.owner_key, key("creds-a"));
    assert_eq!(record.client.credential, b"from-a");
    assert_eq!(
        fx.handler.events_for("x"),
        vec![ClusterEvent::Added("x".into(), b"from-a".to_vec())]
    );
}

#[tokio::test]
async fn test_changed_credentials_update_not_add() {
    let fx = Fixture::new();
    fx.apply("creds-1", &[("east", b"a")]).await;
    fx.apply("creds-1", &[("east", b"b")]).await;
    fx.apply("creds-1", &[("east", b"c")]).await;

    assert_eq!(
        fx.handler.events(),
        vec![
            ClusterEvent::Added("east".into(), b"a".to_vec()),
            ClusterEvent::Updated("east".into(), b"b".to_vec()),
            ClusterEvent::Updated("east".into(), b"c".to_vec()),
        ]
    );
    assert_eq!(fx.registry.get("east").unwrap().fingerprint, Fingerprint::of(b"c"));
}

#[tokio::test]
async fn test_delete_removes_only_owned_clusters() {
    let fx = Fixture::new();
    fx.apply("creds-a", &[("x", b"1"), ("y", b"2")]).await;
    fx.apply("creds-b", &[("z", b"3")]).await;

    let report = fx.delete("creds-a").await;

    assert_eq!(report.removed, 2);
    let mut removed: Vec<_> = fx
        .handler
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ClusterEvent::Removed(id) => Some(id),
            _ => None,
        })
        .collect();
    removed.sort();
    assert_eq!(removed, vec!["x", "y"]);
    assert!(fx.registry.get("x").is_none());
    assert!(fx.registry.get("y").is_none());
    assert_eq!(fx.registry.get("z").unwrap().owner_key, key("creds-b"));
}

#[tokio::test]
async fn test_add_update_delete_lifecycle() {
    let fx = Fixture::new();

    fx.apply("creds-1", &[("east", b"bytes-a")]).await;
    fx.apply("creds-1", &[("east", b"bytes-b")]).await;
    fx.delete("creds-1").await;

    assert_eq!(
        fx.handler.events(),
        vec![
            ClusterEvent::Added("east".into(), b"bytes-a".to_vec()),
            ClusterEvent::Updated("east".into(), b"bytes-b".to_vec()),
            ClusterEvent::Removed("east".into()),
        ]
    );
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_collision_keeps_first_processed_secret() {
    let fx = Fixture::new();

    fx.apply("creds-1", &[("east", b"bytes-a")]).await;
    let report = fx.apply("creds-2", &[("east", b"bytes-c")]).await;

    assert_eq!(report.conflicts, 1);
    assert_eq!(
        fx.handler.events_for("east"),
        vec![ClusterEvent::Added("east".into(), b"bytes-a".to_vec())]
    );
    assert_eq!(fx.registry.get("east").unwrap().owner_key, key("creds-1"));
    assert_eq!(fx.registry.len(), 1);
}

#[tokio::test]
async fn test_deleting_losing_secret_keeps_winner() {
    let fx = Fixture::new();
    fx.apply("creds-1", &[("east", b"bytes-a")]).await;
    fx.apply("creds-2", &[("east", b"bytes-c")]).await;

    let report = fx.delete("creds-2").await;

    assert_eq!(report.removed, 0);
    assert_eq!(fx.registry.get("east").unwrap().owner_key, key("creds-1"));
}

// Removing one entry from a secret does not unregister that cluster; only
// deleting the whole secret does.
#[tokio::test]
async fn test_entry_dropped_from_secret_stays_registered() {
    let fx = Fixture::new();
    fx.apply("creds-1", &[("east", b"a"), ("west", b"b")]).await;

    let report = fx.apply("creds-1", &[("east", b"a")]).await;

    assert!(report.is_noop());
    assert_eq!(fx.registry.get("west").unwrap().owner_key, key("creds-1"));
    assert!(fx.handler.events_for("west").iter().all(|e| !matches!(e, ClusterEvent::Removed(_))));

    fx.delete("creds-1").await;
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_callback_errors_do_not_fail_the_key() {
    let fx = Fixture::with_handler(RecordingHandler::failing());

    let report = fx.apply("creds-1", &[("east", b"a"), ("west", b"b")]).await;

    assert_eq!(report.added, 2);
    assert_eq!(report.callback_failures, 2);
    assert_eq!(fx.registry.len(), 2);

    let report = fx.delete("creds-1").await;
    assert_eq!(report.removed, 2);
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_build_failure_skips_entry_only() {
    let fx = Fixture::new();

    let report = fx
        .apply("creds-1", &[("broken", BAD_CREDENTIAL), ("east", b"a")])
        .await;

    assert_eq!(report.build_failures, 1);
    assert_eq!(report.added, 1);
    assert!(fx.registry.get("broken").is_none());
    assert_eq!(
        fx.handler.events(),
        vec![ClusterEvent::Added("east".into(), b"a".to_vec())]
    );

    // A later good credential for the same ID is a first-time add.
    fx.apply("creds-1", &[("broken", b"fixed"), ("east", b"a")]).await;
    assert_eq!(
        fx.handler.events_for("broken"),
        vec![ClusterEvent::Added("broken".into(), b"fixed".to_vec())]
    );
}

#[tokio::test]
async fn test_lookup_of_missing_secret_with_nothing_owned_is_noop() {
    let fx = Fixture::new();
    let report = fx.reconcile("never-existed").await;
    assert_eq!(report, SyncReport::default());
    assert!(fx.handler.events().is_empty());
}

#[tokio::test]
async fn test_malformed_key_is_an_error() {
    let fx = Fixture::new();
    assert!(fx.reconciler.process_item("no-separator").await.is_err());
}
