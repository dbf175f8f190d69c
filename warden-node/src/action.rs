//! Leadership callback that keeps the service registry in sync with the
//! node's role.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use warden_leader::LeadershipCallback;
use warden_registry::ServiceRegistry;

/// Workers advertise themselves; the leader withdraws its own entry and
/// follows the membership instead.
pub struct RegistryElectionAction {
    registry: ServiceRegistry,
    address: String,
    registered: AtomicBool,
}

impl RegistryElectionAction {
    pub fn new(registry: ServiceRegistry, address: impl Into<String>) -> Self {
        Self {
            registry,
            address: address.into(),
            registered: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }
}

#[async_trait]
impl LeadershipCallback for RegistryElectionAction {
    async fn on_elected_leader(&self) {
        match self.registry.unregister().await {
            Ok(()) => self.registered.store(false, Ordering::Release),
            Err(err) => warn!("Failed to withdraw worker registration: {}", err),
        }

        match self.registry.subscribe_for_updates().await {
            Ok(snapshot) => info!(
                "Leader following {} registered workers",
                snapshot.len()
            ),
            Err(err) => warn!("Failed to subscribe for membership updates: {}", err),
        }
    }

    async fn on_worker(&self) {
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("{} already registered, skipping", self.address);
            return;
        }

        if let Err(err) = self.registry.register_worker(&self.address).await {
            warn!("Failed to register {} as a worker: {}", self.address, err);
            self.registered.store(false, Ordering::Release);
        }
    }
}
