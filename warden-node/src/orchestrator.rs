//! Wiring of election, registry and shutdown for one node.

use crate::{
    NodeConfig, NodeResult, RegistryElectionAction, ShutdownListener, ShutdownReason,
    ShutdownSignal,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use warden_core::{CoordinationClient, CoordinationError, CreateMode};
use warden_leader::{
    ElectionCoordinator, LeadershipChange, LeadershipState, NotificationFilter,
};
use warden_registry::ServiceRegistry;

/// Create `namespace` as a persistent node unless it already exists.
pub async fn ensure_election_namespace(
    client: &dyn CoordinationClient,
    namespace: &str,
) -> NodeResult<()> {
    match client
        .create(namespace, Bytes::new(), CreateMode::Persistent)
        .await
    {
        Ok(_) => {
            info!("Created election namespace {}", namespace);
            Ok(())
        }
        Err(CoordinationError::NodeExists { .. }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// One node: a candidate in the election and, while a worker, a registered
/// service instance.
pub struct Orchestrator {
    config: NodeConfig,
    coordinator: ElectionCoordinator,
    registry: ServiceRegistry,
    action: Arc<RegistryElectionAction>,
    shutdown: ShutdownSignal,
    escalation_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        config: NodeConfig,
        client: Arc<dyn CoordinationClient>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let registry = ServiceRegistry::new(client.clone(), config.registry.clone());
        let action = Arc::new(RegistryElectionAction::new(
            registry.clone(),
            config.advertised_address(),
        ));
        let coordinator =
            ElectionCoordinator::with_callback(client, config.election.clone(), action.clone());

        Self {
            config,
            coordinator,
            registry,
            action,
            shutdown,
            escalation_task: Mutex::new(None),
        }
    }

    /// Prepare the registry, join the election and run the first round.
    pub async fn start(&self) -> NodeResult<LeadershipState> {
        self.registry.ensure_namespace().await?;
        self.watch_escalations().await;

        let state = self.coordinator.start().await?;
        info!(
            "Node {} joined as {:?} ({:?})",
            self.config.advertised_address(),
            self.coordinator.candidate_name(),
            state
        );
        Ok(state)
    }

    /// Start and block until the node is told to stop.
    pub async fn run(&self) -> NodeResult<ShutdownReason> {
        let mut listener = self.shutdown.subscribe();
        self.start().await?;
        let reason = listener.wait().await;
        info!("Node {} stopping: {}", self.config.advertised_address(), reason);
        Ok(reason)
    }

    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.shutdown.subscribe()
    }

    pub fn coordinator(&self) -> &ElectionCoordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn action(&self) -> &RegistryElectionAction {
        &self.action
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    async fn watch_escalations(&self) {
        let filter = NotificationFilter::Custom(Arc::new(|change: &LeadershipChange| {
            matches!(change, LeadershipChange::ElectionEscalated { .. })
        }));
        let (_id, mut escalations) = self
            .coordinator
            .notification_bus()
            .subscribe(filter)
            .await;
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            if let Some(LeadershipChange::ElectionEscalated { reason, .. }) =
                escalations.recv().await
            {
                shutdown.trigger(ShutdownReason::ElectionEscalated(reason));
            }
        });

        let previous = self.escalation_task.lock().replace(task);
        if let Some(previous) = previous {
            debug!("Replacing escalation watcher");
            previous.abort();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.escalation_task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionWatch;
    use warden_store::MemoryStore;

    #[tokio::test]
    async fn test_single_node_leads_and_stops_on_close() {
        let store = MemoryStore::default();
        let shutdown = ShutdownSignal::new();
        let session = store.connect(Some(Arc::new(SessionWatch::new(shutdown.clone()))));

        let config = NodeConfig::default();
        ensure_election_namespace(&session, &config.election.namespace)
            .await
            .unwrap();
        let node = Orchestrator::new(config, Arc::new(session.clone()), shutdown);
        let mut listener = node.shutdown_listener();

        assert_eq!(node.start().await.unwrap(), LeadershipState::Leader);
        assert!(node.registry().get_snapshot().await.unwrap().is_empty());
        assert!(!node.action().is_registered());

        session.close();
        assert_eq!(listener.wait().await, ShutdownReason::SessionClosed);
    }

    #[tokio::test]
    async fn test_missing_election_namespace_is_fatal() {
        let store = MemoryStore::default();
        let node = Orchestrator::new(
            NodeConfig::default(),
            Arc::new(store.connect(None)),
            ShutdownSignal::new(),
        );

        let err = node.start().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
