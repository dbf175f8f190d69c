//! Registry integration tests
//!
//! Membership as observed by the elected leader while workers join, leave
//! and take over leadership.

use std::collections::BTreeSet;
use std::sync::Arc;

use warden_core::CoordinationClient;
use warden_registry::{RegistryConfig, ServiceRegistry};
use warden_store::MemoryStore;
use warden_testing::{init_test_logging, ClusterHarness, HarnessConfig};

fn addresses(hosts: &[&str]) -> BTreeSet<String> {
    hosts
        .iter()
        .map(|host| format!("http://{}:8080", host))
        .collect()
}

#[tokio::test]
async fn test_leader_sees_every_worker() {
    init_test_logging();
    let harness = ClusterHarness::with_nodes(4, HarnessConfig::default())
        .await
        .expect("Failed to start cluster");

    let workers = harness.registered_workers().await.unwrap();
    assert_eq!(workers, addresses(&["node-1", "node-2", "node-3"]));
    assert_eq!(workers, harness.expected_workers());
}

#[tokio::test]
async fn test_crashed_worker_leaves_membership() {
    let harness = ClusterHarness::with_nodes(4, HarnessConfig::default())
        .await
        .unwrap();

    harness.crash(2).await.unwrap();

    let workers = harness.registered_workers().await.unwrap();
    assert_eq!(workers, addresses(&["node-1", "node-3"]));
}

#[tokio::test]
async fn test_new_leader_withdraws_its_registration() {
    let harness = ClusterHarness::with_nodes(3, HarnessConfig::default())
        .await
        .unwrap();

    harness.crash(0).await.unwrap();

    let leader = harness.node(1).unwrap();
    assert!(leader.orchestrator.coordinator().is_leader());
    assert!(!leader.orchestrator.action().is_registered());
    assert!(leader.orchestrator.registry().own_entry().is_none());

    let workers = harness.registered_workers().await.unwrap();
    assert_eq!(workers, addresses(&["node-2"]));
}

#[tokio::test]
async fn test_leader_catches_up_after_partition_heals() {
    let mut harness = ClusterHarness::with_nodes(2, HarnessConfig::default())
        .await
        .unwrap();

    harness.partition(0).await.unwrap();
    harness.add_node().await.unwrap();
    harness.heal(0).await.unwrap();

    let workers = harness.registered_workers().await.unwrap();
    assert_eq!(workers, addresses(&["node-1", "node-2"]));

    // The membership watch is armed again after the catch-up refresh
    harness.add_node().await.unwrap();
    let workers = harness.registered_workers().await.unwrap();
    assert_eq!(workers, addresses(&["node-1", "node-2", "node-3"]));
}

#[tokio::test]
async fn test_unregister_one_of_three() {
    let store = MemoryStore::default();
    let registries: Vec<ServiceRegistry> = (0..3)
        .map(|_| ServiceRegistry::new(Arc::new(store.connect(None)), RegistryConfig::default()))
        .collect();

    let (a, b, c) = tokio::join!(
        registries[0].ensure_namespace(),
        registries[1].ensure_namespace(),
        registries[2].ensure_namespace()
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    for (registry, address) in registries.iter().zip(["A", "B", "C"]) {
        registry.register_worker(address).await.unwrap();
    }
    registries[1].unregister().await.unwrap();
    registries[1].unregister().await.unwrap();

    let snapshot = registries[0].refresh_snapshot().await.unwrap();
    let expected: BTreeSet<String> = ["A", "C"].map(String::from).into();
    assert_eq!(snapshot.as_set(), &expected);
}

#[tokio::test]
async fn test_snapshot_updates_reach_subscribers() {
    let store = MemoryStore::default();
    let leader = ServiceRegistry::new(Arc::new(store.connect(None)), RegistryConfig::default());
    leader.ensure_namespace().await.unwrap();
    leader.subscribe_for_updates().await.unwrap();

    let mut updates = leader.snapshot_updates();
    let worker_session = store.connect(None);
    let worker = ServiceRegistry::new(Arc::new(worker_session.clone()), RegistryConfig::default());

    let waiter = tokio::spawn(async move {
        updates
            .wait_for(|snapshot| {
                snapshot
                    .as_ref()
                    .is_some_and(|snapshot| snapshot.contains("http://late:9000"))
            })
            .await
            .map(|snapshot| snapshot.as_ref().map(|snapshot| snapshot.version()))
            .unwrap()
    });

    worker.register_worker("http://late:9000").await.unwrap();
    let version = waiter.await.unwrap();
    assert!(version.unwrap() >= 2);

    store.expire_session(worker_session.session_id());
    store.wait_idle().await;
    assert!(leader.get_snapshot().await.unwrap().is_empty());
}
