//! In-process cluster of nodes sharing one MemoryStore.

use anyhow::{bail, Context};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warden_core::{join_path, sequence_of, CoordinationClient, ANY_VERSION};
use warden_leader::{ElectionConfig, LeadershipState};
use warden_node::{
    ensure_election_namespace, NodeConfig, Orchestrator, SessionWatch, ShutdownListener,
    ShutdownReason, ShutdownSignal,
};
use warden_registry::RegistryConfig;
use warden_store::{MemorySession, MemoryStore, StoreConfig};

/// Install a test subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub session_timeout: Duration,
    pub election: ElectionConfig,
    pub registry: RegistryConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_millis(50),
            election: ElectionConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// One node of the harness
pub struct ClusterNode {
    pub index: usize,
    pub session: MemorySession,
    pub orchestrator: Orchestrator,
    pub shutdown: ShutdownListener,
}

impl ClusterNode {
    /// Whether the node's session can still hold its candidate
    pub fn is_live(&self) -> bool {
        !self.session.state().is_terminal()
    }

    pub fn state(&self) -> LeadershipState {
        self.orchestrator.coordinator().state()
    }

    pub fn candidate(&self) -> Option<String> {
        self.orchestrator.coordinator().candidate_name()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.candidate().as_deref().and_then(sequence_of)
    }

    pub fn address(&self) -> String {
        self.orchestrator.config().advertised_address()
    }
}

/// Drives N orchestrated nodes against one store and checks election
/// invariants.
pub struct ClusterHarness {
    config: HarnessConfig,
    store: MemoryStore,
    admin: MemorySession,
    nodes: Vec<ClusterNode>,
}

impl ClusterHarness {
    pub async fn new(config: HarnessConfig) -> anyhow::Result<Self> {
        let store = MemoryStore::new(StoreConfig {
            session_timeout: config.session_timeout,
            ..Default::default()
        });
        let admin = store.connect(None);
        ensure_election_namespace(&admin, &config.election.namespace)
            .await
            .context("failed to create the election namespace")?;

        Ok(Self {
            config,
            store,
            admin,
            nodes: Vec::new(),
        })
    }

    /// Harness with `count` nodes joined in order
    pub async fn with_nodes(count: usize, config: HarnessConfig) -> anyhow::Result<Self> {
        let mut harness = Self::new(config).await?;
        for _ in 0..count {
            harness.add_node().await?;
        }
        Ok(harness)
    }

    /// Start one more node and wait until the cluster settles
    pub async fn add_node(&mut self) -> anyhow::Result<usize> {
        let index = self.nodes.len();
        let shutdown = ShutdownSignal::new();
        let session = self
            .store
            .connect(Some(Arc::new(SessionWatch::new(shutdown.clone()))));

        let config = NodeConfig {
            host: format!("node-{}", index),
            port: 8080,
            election: self.config.election.clone(),
            registry: self.config.registry.clone(),
            store: self.store.config().clone(),
        };
        let orchestrator = Orchestrator::new(config, Arc::new(session.clone()), shutdown);
        let listener = orchestrator.shutdown_listener();
        let state = orchestrator
            .start()
            .await
            .with_context(|| format!("node {} failed to start", index))?;

        info!("Harness node {} started as {:?}", index, state);
        self.nodes.push(ClusterNode {
            index,
            session,
            orchestrator,
            shutdown: listener,
        });
        self.settle().await;
        Ok(index)
    }

    /// Expire the node's session, as if the process died
    pub async fn crash(&self, index: usize) -> anyhow::Result<()> {
        let node = self.node(index)?;
        if !self.store.expire_session(node.session.session_id()) {
            bail!("node {} is not live", index);
        }
        self.settle().await;
        Ok(())
    }

    /// Crash a random live node, returning its index
    pub async fn crash_random<R: Rng>(&self, rng: &mut R) -> anyhow::Result<Option<usize>> {
        let live = self.live_nodes();
        let Some(&index) = live.choose(rng) else {
            return Ok(None);
        };
        self.crash(index).await?;
        Ok(Some(index))
    }

    /// Cut the node off; it expires unless healed within the session timeout
    pub async fn partition(&self, index: usize) -> anyhow::Result<()> {
        let node = self.node(index)?;
        if !self.store.disconnect(node.session.session_id()) {
            bail!("node {} is not connected", index);
        }
        self.settle().await;
        Ok(())
    }

    pub async fn heal(&self, index: usize) -> anyhow::Result<()> {
        let node = self.node(index)?;
        if !self.store.reconnect(node.session.session_id()) {
            bail!("node {} is not disconnected", index);
        }
        self.settle().await;
        Ok(())
    }

    /// Delete a node's candidate through an unrelated session
    pub async fn remove_candidate(&self, index: usize) -> anyhow::Result<()> {
        let candidate = self
            .node(index)?
            .candidate()
            .with_context(|| format!("node {} has no candidate", index))?;
        let path = join_path(&self.config.election.namespace, &candidate);
        self.admin.delete(&path, ANY_VERSION).await?;
        self.settle().await;
        Ok(())
    }

    /// Block until the node's shutdown signal fires
    pub async fn wait_for_shutdown(&mut self, index: usize) -> anyhow::Result<ShutdownReason> {
        let node = self
            .nodes
            .get_mut(index)
            .with_context(|| format!("no node {}", index))?;
        Ok(node.shutdown.wait().await)
    }

    /// Wait until every queued notification has been handled
    pub async fn settle(&self) {
        self.store.wait_idle().await;
    }

    pub fn node(&self, index: usize) -> anyhow::Result<&ClusterNode> {
        self.nodes
            .get(index)
            .with_context(|| format!("no node {}", index))
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn live_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|node| node.is_live())
            .map(|node| node.index)
            .collect()
    }

    /// Live nodes that consider themselves leader
    pub fn leaders(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|node| node.is_live() && node.state() == LeadershipState::Leader)
            .map(|node| node.index)
            .collect()
    }

    /// Live node holding the smallest candidate sequence
    pub fn expected_leader(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter(|node| node.is_live())
            .filter_map(|node| node.sequence().map(|sequence| (sequence, node.index)))
            .min()
            .map(|(_, index)| index)
    }

    /// Check that exactly one live node leads and that it holds the smallest
    /// live sequence number.
    pub fn assert_single_leader(&self) -> anyhow::Result<usize> {
        let leaders = self.leaders();
        let [leader] = leaders.as_slice() else {
            bail!("expected exactly one leader, found {:?}", leaders);
        };
        let expected = self.expected_leader();
        if expected != Some(*leader) {
            bail!("leader is node {} but smallest live candidate is {:?}", leader, expected);
        }
        Ok(*leader)
    }

    /// Membership as seen by the current leader
    pub async fn registered_workers(&self) -> anyhow::Result<BTreeSet<String>> {
        let leader = self.assert_single_leader()?;
        let snapshot = self
            .node(leader)?
            .orchestrator
            .registry()
            .get_snapshot()
            .await?;
        Ok(snapshot.as_set().clone())
    }

    /// Advertised addresses of the live workers
    pub fn expected_workers(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter(|node| node.is_live() && node.state() == LeadershipState::Worker)
            .map(ClusterNode::address)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_elects_first_node() {
        init_test_logging();
        let harness = ClusterHarness::with_nodes(2, HarnessConfig::default())
            .await
            .unwrap();

        assert_eq!(harness.assert_single_leader().unwrap(), 0);
        assert_eq!(harness.live_nodes(), vec![0, 1]);
        assert_eq!(
            harness.node(1).unwrap().candidate().as_deref(),
            Some("c_0000000001")
        );
    }

    #[tokio::test]
    async fn test_crash_unknown_node() {
        let harness = ClusterHarness::new(HarnessConfig::default()).await.unwrap();
        assert!(harness.crash(3).await.is_err());
    }
}
