//! Election integration tests
//!
//! Full nodes (election + registry + shutdown wiring) running against one
//! in-process store.

use std::time::Duration;
use tokio::time::{sleep, timeout};

use warden_leader::{ElectionConfig, ElectionErrorPolicy, LeadershipState};
use warden_node::ShutdownReason;
use warden_testing::{init_test_logging, ClusterHarness, HarnessConfig};

/// c_0 leads, c_1 watches c_0, c_2 watches c_1; expiring c_0 promotes c_1 only
#[tokio::test]
async fn test_leader_crash_promotes_successor_only() {
    init_test_logging();
    let harness = ClusterHarness::with_nodes(3, HarnessConfig::default())
        .await
        .expect("Failed to start cluster");

    assert_eq!(harness.assert_single_leader().unwrap(), 0);
    let watched: Vec<_> = harness
        .nodes()
        .iter()
        .map(|node| node.orchestrator.coordinator().watched_predecessor())
        .collect();
    assert_eq!(
        watched,
        vec![
            None,
            Some("c_0000000000".to_string()),
            Some("c_0000000001".to_string())
        ]
    );

    let third_before = harness.node(2).unwrap().orchestrator.coordinator().get_stats();
    harness.crash(0).await.unwrap();

    assert_eq!(harness.assert_single_leader().unwrap(), 1);
    let second = harness.node(1).unwrap().orchestrator.coordinator().get_stats();
    assert_eq!(second.leadership_acquired, 1);

    let third = harness.node(2).unwrap();
    assert_eq!(third.state(), LeadershipState::Worker);
    assert_eq!(
        third.orchestrator.coordinator().get_stats().rounds_started,
        third_before.rounds_started
    );
}

#[tokio::test]
async fn test_crashing_last_worker_causes_no_reelection() {
    let harness = ClusterHarness::with_nodes(3, HarnessConfig::default())
        .await
        .unwrap();
    let rounds_before: Vec<u64> = harness
        .nodes()
        .iter()
        .map(|node| node.orchestrator.coordinator().get_stats().rounds_started)
        .collect();

    harness.crash(2).await.unwrap();

    for index in 0..2 {
        let node = harness.node(index).unwrap();
        assert_eq!(
            node.orchestrator.coordinator().get_stats().rounds_started,
            rounds_before[index]
        );
    }
    assert_eq!(harness.assert_single_leader().unwrap(), 0);
}

#[tokio::test]
async fn test_worker_that_stays_worker_registers_once() {
    let harness = ClusterHarness::with_nodes(3, HarnessConfig::default())
        .await
        .unwrap();

    harness.crash(1).await.unwrap();

    let third = harness.node(2).unwrap();
    let stats = third.orchestrator.coordinator().get_stats();
    assert_eq!(third.state(), LeadershipState::Worker);
    assert_eq!(
        third.orchestrator.coordinator().watched_predecessor().as_deref(),
        Some("c_0000000000")
    );
    assert_eq!(stats.rounds_started, 2);
    assert_eq!(stats.worker_transitions, 1);
    assert_eq!(third.orchestrator.registry().get_stats().registrations, 1);
}

#[tokio::test]
async fn test_partition_healed_within_timeout_keeps_roles() {
    let mut harness = ClusterHarness::with_nodes(2, HarnessConfig::default())
        .await
        .unwrap();

    harness.partition(0).await.unwrap();
    harness.heal(0).await.unwrap();
    sleep(Duration::from_millis(150)).await;
    harness.settle().await;

    assert_eq!(harness.assert_single_leader().unwrap(), 0);
    assert_eq!(harness.live_nodes(), vec![0, 1]);

    // The node still reports the lost connection to its owner
    let reason = harness.wait_for_shutdown(0).await.unwrap();
    assert_eq!(reason, ShutdownReason::SessionDisconnected);
}

#[tokio::test]
async fn test_predecessor_lost_during_partition_promotes_after_heal() {
    let harness = ClusterHarness::with_nodes(2, HarnessConfig::default())
        .await
        .unwrap();

    harness.partition(1).await.unwrap();
    harness.crash(0).await.unwrap();
    assert!(harness.leaders().is_empty());
    assert_eq!(harness.node(1).unwrap().state(), LeadershipState::Worker);

    harness.heal(1).await.unwrap();

    assert_eq!(harness.assert_single_leader().unwrap(), 1);
    let node = harness.node(1).unwrap();
    assert!(!node.orchestrator.action().is_registered());
    assert!(node.orchestrator.registry().own_entry().is_none());
}

#[tokio::test]
async fn test_partition_beyond_timeout_expires_leader() {
    let harness = ClusterHarness::with_nodes(2, HarnessConfig::default())
        .await
        .unwrap();

    harness.partition(0).await.unwrap();
    assert_eq!(harness.assert_single_leader().unwrap(), 0);

    sleep(Duration::from_millis(150)).await;
    harness.settle().await;

    assert_eq!(harness.live_nodes(), vec![1]);
    assert_eq!(harness.assert_single_leader().unwrap(), 1);
}

#[tokio::test]
async fn test_escalation_shuts_node_down() {
    let config = HarnessConfig {
        election: ElectionConfig {
            error_policy: ElectionErrorPolicy::Escalate,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut harness = ClusterHarness::with_nodes(2, config).await.unwrap();

    harness.remove_candidate(1).await.unwrap();
    harness.crash(0).await.unwrap();

    let reason = timeout(Duration::from_secs(1), harness.wait_for_shutdown(1))
        .await
        .expect("Node did not shut down")
        .unwrap();
    assert!(matches!(reason, ShutdownReason::ElectionEscalated(_)));
    assert_eq!(harness.node(1).unwrap().state(), LeadershipState::Abandoned);
}

#[tokio::test]
async fn test_retry_policy_abandons_after_attempts() {
    let config = HarnessConfig {
        election: ElectionConfig {
            error_policy: ElectionErrorPolicy::Retry {
                max_attempts: 3,
                backoff: Duration::from_millis(2),
            },
            ..Default::default()
        },
        ..Default::default()
    };
    let harness = ClusterHarness::with_nodes(2, config).await.unwrap();

    harness.remove_candidate(1).await.unwrap();
    harness.crash(0).await.unwrap();

    let node = harness.node(1).unwrap();
    let stats = node.orchestrator.coordinator().get_stats();
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.rounds_abandoned, 1);
    assert_eq!(node.state(), LeadershipState::Abandoned);
    assert!(harness.leaders().is_empty());
}
