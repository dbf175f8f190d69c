//! Service registry over ephemeral sequential entries.
//!
//! Workers advertise themselves with one ephemeral entry each; the entry goes
//! away with the worker's session. Readers see the membership through
//! immutable snapshots, rebuilt whenever the namespace's children change.

use crate::{MembershipSnapshot, RegistryError, RegistryResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use warden_core::{
    join_path, CoordinationClient, CoordinationError, CreateMode, WatchedEvent, Watcher,
    WatcherRef, ANY_VERSION,
};

/// Configuration for the ServiceRegistry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Persistent node holding one entry per worker
    pub namespace: String,

    /// Name prefix of entries, completed by the store's sequence suffix
    pub entry_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "/service_registry".to_string(),
            entry_prefix: "n_".to_string(),
        }
    }
}

/// Registry statistics
#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    pub registrations: u64,
    pub unregistrations: u64,
    pub refreshes: u64,
    /// Entries that vanished while a refresh was reading them
    pub skipped_entries: u64,
    pub membership_notifications: u64,
}

type SnapshotRef = Option<Arc<MembershipSnapshot>>;

/// Registers this node and tracks the registered membership.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    client: Arc<dyn CoordinationClient>,
    config: RegistryConfig,
    // Full path of this node's entry
    own_entry: Mutex<Option<String>>,
    snapshot: RwLock<SnapshotRef>,
    updates_tx: watch::Sender<SnapshotRef>,
    refresh_lock: tokio::sync::Mutex<()>,
    // Shared so that re-arming from every refresh keeps a single pending watch
    watcher: WatcherRef,
    stats: RwLock<RegistryStats>,
}

/// Children watch on the registry namespace.
struct MembershipWatch {
    registry: Weak<RegistryInner>,
}

#[async_trait]
impl Watcher for MembershipWatch {
    async fn process(&self, event: WatchedEvent) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };

        inner.stats.write().membership_notifications += 1;
        debug!("Membership watch fired: {:?}", event);

        if let Err(err) = inner.refresh().await {
            warn!("Failed to refresh membership snapshot: {}", err);
        }
    }
}

impl ServiceRegistry {
    pub fn new(client: Arc<dyn CoordinationClient>, config: RegistryConfig) -> Self {
        let (updates_tx, _) = watch::channel(None);
        let inner = Arc::new_cyclic(|registry: &Weak<RegistryInner>| RegistryInner {
            client,
            config,
            own_entry: Mutex::new(None),
            snapshot: RwLock::new(None),
            updates_tx,
            refresh_lock: tokio::sync::Mutex::new(()),
            watcher: Arc::new(MembershipWatch {
                registry: registry.clone(),
            }),
            stats: RwLock::new(RegistryStats::default()),
        });
        Self { inner }
    }

    /// Create the persistent namespace unless it already exists.
    pub async fn ensure_namespace(&self) -> RegistryResult<()> {
        let namespace = &self.inner.config.namespace;
        match self
            .inner
            .client
            .create(namespace, Bytes::new(), CreateMode::Persistent)
            .await
        {
            Ok(_) => {
                info!("Created registry namespace {}", namespace);
                Ok(())
            }
            Err(CoordinationError::NodeExists { .. }) => {
                debug!("Registry namespace {} already exists", namespace);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Advertise `address` with a new ephemeral entry and return its path.
    ///
    /// Every call creates another entry; callers guard against registering
    /// twice.
    pub async fn register_worker(&self, address: &str) -> RegistryResult<String> {
        let inner = &self.inner;
        let namespace = &inner.config.namespace;
        let prefix = join_path(namespace, &inner.config.entry_prefix);

        let path = inner
            .client
            .create(
                &prefix,
                Bytes::copy_from_slice(address.as_bytes()),
                CreateMode::EphemeralSequential,
            )
            .await
            .map_err(|err| RegistryError::from_namespace(namespace, err))?;

        let previous = inner.own_entry.lock().replace(path.clone());
        if let Some(previous) = previous {
            warn!("Registered again as {}, replacing entry {}", path, previous);
        }
        inner.stats.write().registrations += 1;

        info!("Registered worker {} at {}", address, path);
        Ok(path)
    }

    /// Remove this node's entry. A no-op when nothing is registered or the
    /// entry already went away with its session.
    ///
    /// On failure the entry is kept, so a later call retries the removal.
    pub async fn unregister(&self) -> RegistryResult<()> {
        let inner = &self.inner;
        let entry = inner.own_entry.lock().clone();
        let Some(path) = entry else {
            return Ok(());
        };

        if inner.client.exists(&path, None).await?.is_none() {
            debug!("Registry entry {} already gone", path);
        } else {
            match inner.client.delete(&path, ANY_VERSION).await {
                Ok(()) => {
                    inner.stats.write().unregistrations += 1;
                    info!("Unregistered entry {}", path);
                }
                Err(CoordinationError::NoNode { .. }) => {
                    debug!("Registry entry {} vanished before deletion", path);
                }
                Err(err) => return Err(err.into()),
            }
        }

        inner.forget_entry(&path);
        Ok(())
    }

    /// Re-read the membership, arm the children watch and publish the result.
    pub async fn refresh_snapshot(&self) -> RegistryResult<Arc<MembershipSnapshot>> {
        self.inner.refresh().await
    }

    /// Last published snapshot; refreshes once when none exists yet.
    pub async fn get_snapshot(&self) -> RegistryResult<Arc<MembershipSnapshot>> {
        let current = self.inner.snapshot.read().clone();
        match current {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.refresh().await,
        }
    }

    /// Start following membership changes, returning the initial snapshot.
    pub async fn subscribe_for_updates(&self) -> RegistryResult<Arc<MembershipSnapshot>> {
        let snapshot = self.inner.refresh().await?;
        info!(
            "Following membership of {} ({} workers)",
            self.inner.config.namespace,
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// Receiver of every published snapshot
    pub fn snapshot_updates(&self) -> watch::Receiver<SnapshotRef> {
        self.inner.updates_tx.subscribe()
    }

    /// Path of this node's entry, if registered
    pub fn own_entry(&self) -> Option<String> {
        self.inner.own_entry.lock().clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn get_stats(&self) -> RegistryStats {
        self.inner.stats.read().clone()
    }
}

impl RegistryInner {
    /// Clears the own entry unless a newer registration replaced it.
    fn forget_entry(&self, path: &str) {
        let mut own_entry = self.own_entry.lock();
        if own_entry.as_deref() == Some(path) {
            *own_entry = None;
        }
    }

    async fn refresh(&self) -> RegistryResult<Arc<MembershipSnapshot>> {
        let _refresh = self.refresh_lock.lock().await;
        let namespace = &self.config.namespace;

        let children = self
            .client
            .get_children(namespace, Some(self.watcher.clone()))
            .await
            .map_err(|err| RegistryError::from_namespace(namespace, err))?;

        let mut addresses = BTreeSet::new();
        let mut skipped = 0;
        for child in children {
            let path = join_path(namespace, &child);
            if self.client.exists(&path, None).await?.is_none() {
                debug!("Registry entry {} vanished during refresh", path);
                skipped += 1;
                continue;
            }
            match self.client.get_data(&path, None).await {
                Ok((payload, _)) => {
                    addresses.insert(String::from_utf8_lossy(&payload).into_owned());
                }
                Err(CoordinationError::NoNode { .. }) => {
                    debug!("Registry entry {} vanished during refresh", path);
                    skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let version = self
            .snapshot
            .read()
            .as_ref()
            .map_or(0, |snapshot| snapshot.version())
            + 1;
        let snapshot = Arc::new(MembershipSnapshot::new(version, addresses));
        *self.snapshot.write() = Some(snapshot.clone());
        self.updates_tx.send_replace(Some(snapshot.clone()));

        {
            let mut stats = self.stats.write();
            stats.refreshes += 1;
            stats.skipped_entries += skipped;
        }

        debug!(
            "Published membership snapshot v{} with {} workers",
            version,
            snapshot.len()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use warden_store::{MemorySession, MemoryStore};

    fn registry(session: &MemorySession) -> ServiceRegistry {
        ServiceRegistry::new(Arc::new(session.clone()), RegistryConfig::default())
    }

    #[tokio::test]
    async fn test_ensure_namespace_is_idempotent() {
        let store = MemoryStore::default();
        let first = registry(&store.connect(None));
        let second = registry(&store.connect(None));

        let (a, b) = tokio::join!(first.ensure_namespace(), second.ensure_namespace());
        assert_ok!(a);
        assert_ok!(b);
        assert_ok!(first.ensure_namespace().await);

        let snapshot = first.get_snapshot().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_register_requires_namespace() {
        let store = MemoryStore::default();
        let registry = registry(&store.connect(None));

        let err = registry.register_worker("http://a:8080").await.unwrap_err();
        assert!(matches!(err, RegistryError::NamespaceMissing { .. }));
        assert!(registry.own_entry().is_none());
    }

    #[tokio::test]
    async fn test_unregister_removes_only_own_entry() {
        let store = MemoryStore::default();
        let workers: Vec<ServiceRegistry> =
            (0..3).map(|_| registry(&store.connect(None))).collect();
        workers[0].ensure_namespace().await.unwrap();

        for (worker, address) in workers.iter().zip(["A", "B", "C"]) {
            worker.register_worker(address).await.unwrap();
        }
        assert_eq!(
            workers[1].own_entry().as_deref(),
            Some("/service_registry/n_0000000001")
        );

        workers[1].unregister().await.unwrap();
        assert!(workers[1].own_entry().is_none());

        let snapshot = workers[0].refresh_snapshot().await.unwrap();
        let expected: BTreeSet<String> = ["A", "C"].map(String::from).into();
        assert_eq!(snapshot.as_set(), &expected);

        // Second unregister is a no-op
        assert_ok!(workers[1].unregister().await);
        assert_eq!(workers[1].get_stats().unregistrations, 1);
    }

    #[tokio::test]
    async fn test_unregister_after_session_expiry() {
        let store = MemoryStore::default();
        let session = store.connect(None);
        let registry = registry(&session);
        registry.ensure_namespace().await.unwrap();
        registry.register_worker("http://a:8080").await.unwrap();

        store.expire_session(session.session_id());
        store.wait_idle().await;

        assert_ok!(registry.unregister().await);
        assert!(registry.own_entry().is_none());
    }

    #[tokio::test]
    async fn test_failed_unregister_keeps_entry_for_retry() {
        let store = MemoryStore::default();
        let session = store.connect(None);
        let registry = registry(&session);
        registry.ensure_namespace().await.unwrap();
        let entry = registry.register_worker("http://a:8080").await.unwrap();

        store.disconnect(session.session_id());
        let err = registry.unregister().await.unwrap_err();
        assert_eq!(err, RegistryError::Coordination(CoordinationError::ConnectionLoss));
        assert_eq!(registry.own_entry().as_deref(), Some(entry.as_str()));

        store.reconnect(session.session_id());
        assert_ok!(registry.unregister().await);
        assert!(registry.own_entry().is_none());
        assert!(session.exists(&entry, None).await.unwrap().is_none());
        assert_eq!(registry.get_stats().unregistrations, 1);
    }

    #[tokio::test]
    async fn test_snapshot_follows_membership_changes() {
        let store = MemoryStore::default();
        let leader = registry(&store.connect(None));
        leader.ensure_namespace().await.unwrap();

        let initial = leader.subscribe_for_updates().await.unwrap();
        assert!(initial.is_empty());
        let mut updates = leader.snapshot_updates();

        let worker_session = store.connect(None);
        let worker = registry(&worker_session);
        worker.register_worker("http://w1:8080").await.unwrap();
        store.wait_idle().await;

        let snapshot = leader.get_snapshot().await.unwrap();
        assert!(snapshot.contains("http://w1:8080"));
        assert!(snapshot.version() > initial.version());
        assert!(updates.has_changed().unwrap());
        assert_eq!(
            updates.borrow_and_update().as_deref(),
            Some(snapshot.as_ref())
        );

        store.expire_session(worker_session.session_id());
        store.wait_idle().await;
        assert!(leader.get_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_refresh_arms_one_watch() {
        let store = MemoryStore::default();
        let leader = registry(&store.connect(None));
        leader.ensure_namespace().await.unwrap();

        leader.refresh_snapshot().await.unwrap();
        leader.refresh_snapshot().await.unwrap();
        leader.refresh_snapshot().await.unwrap();
        assert_eq!(store.get_stats().pending_watches, 1);

        let worker = registry(&store.connect(None));
        worker.register_worker("http://w1:8080").await.unwrap();
        store.wait_idle().await;

        let stats = leader.get_stats();
        assert_eq!(stats.membership_notifications, 1);
        assert_eq!(stats.refreshes, 4);
    }
}
