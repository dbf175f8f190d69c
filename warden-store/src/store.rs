//! # Memory Store
//!
//! An in-process coordination store. Nodes form a tree guarded by a single
//! lock, so every operation (including the watches it fires) is atomic with
//! respect to every other. Fired watches and session events are queued to the
//! owning session's dispatcher in the order the changes were applied. While
//! a session is disconnected its watch notifications are held back and
//! delivered once it reconnects.

use crate::session::{spawn_dispatcher, Dispatch, MemorySession};
use crate::watches::{FiredWatch, WatchStats, WatchTable};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_core::{
    name_of, now_millis, parent_of, validate_path, CoordinationError,
    CoordinationResult, CreateMode, SessionEvent, SessionId, SessionListener, Stat, WatchKind,
    WatcherRef, ANY_VERSION,
};

/// Configuration for the MemoryStore
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a disconnected session survives before it expires
    pub session_timeout: Duration,
    /// Maximum payload size in bytes
    pub max_payload_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_millis(3000),
            max_payload_size: 1024 * 1024, // 1MB
        }
    }
}

/// Lifecycle state of a session as seen by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
    Expired,
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Closed)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_nodes: usize,
    pub total_operations: u64,
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub sessions_opened: u64,
    pub sessions_expired: u64,
    pub sessions_closed: u64,
    pub pending_watches: usize,
    pub watches: WatchStats,
}

struct Node {
    data: Bytes,
    stat: Stat,
    children: BTreeSet<String>,
    /// Next suffix handed out to a sequential child
    next_sequence: u64,
}

impl Node {
    fn new(data: Bytes, zxid: u64, ephemeral_owner: Option<SessionId>) -> Self {
        let now = now_millis();
        let data_length = data.len();
        Self {
            data,
            stat: Stat {
                czxid: zxid,
                mzxid: zxid,
                ctime: now,
                mtime: now,
                version: 0,
                cversion: 0,
                ephemeral_owner,
                data_length,
                num_children: 0,
            },
            children: BTreeSet::new(),
            next_sequence: 0,
        }
    }
}

struct Tree {
    nodes: HashMap<String, Node>,
    watches: WatchTable,
    zxid: u64,
}

struct SessionEntry {
    state: SessionState,
    /// Bumped on every connect/disconnect so stale expiry timers do nothing
    epoch: u64,
    dispatch_tx: Option<mpsc::UnboundedSender<Dispatch>>,
    /// Watch notifications fired while disconnected
    held: Vec<Dispatch>,
}

struct StoreShared {
    config: StoreConfig,
    tree: Mutex<Tree>,
    sessions: DashMap<SessionId, SessionEntry>,
    in_flight: Arc<AtomicUsize>,
    stats: RwLock<StoreStats>,
}

/// In-process coordination store.
///
/// Cloning yields another handle to the same store. Clients obtain a
/// [`MemorySession`] through [`MemoryStore::connect`].
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<StoreShared>,
}

impl MemoryStore {
    /// Create a store holding only the root node
    pub fn new(config: StoreConfig) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Bytes::new(), 0, None));

        info!("MemoryStore initialized with config: {:?}", config);
        Self {
            shared: Arc::new(StoreShared {
                config,
                tree: Mutex::new(Tree {
                    nodes,
                    watches: WatchTable::default(),
                    zxid: 0,
                }),
                sessions: DashMap::new(),
                in_flight: Arc::new(AtomicUsize::new(0)),
                stats: RwLock::new(StoreStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Open a new session.
    ///
    /// Spawns the session's dispatcher on the current tokio runtime. The
    /// listener receives `Connected` first.
    pub fn connect(&self, listener: Option<Arc<dyn SessionListener>>) -> MemorySession {
        let session_id = SessionId::new();
        let dispatch_tx = spawn_dispatcher(session_id, listener, self.shared.in_flight.clone());

        self.shared.sessions.insert(
            session_id,
            SessionEntry {
                state: SessionState::Connected,
                epoch: 0,
                dispatch_tx: Some(dispatch_tx),
                held: Vec::new(),
            },
        );
        self.shared.stats.write().sessions_opened += 1;
        self.enqueue(session_id, Dispatch::Session(SessionEvent::Connected));

        info!("Session {} connected", session_id);
        MemorySession::new(session_id, self.clone())
    }

    /// Drop the connection of a session. The session expires unless it is
    /// reconnected within the configured timeout.
    pub fn disconnect(&self, session_id: SessionId) -> bool {
        let epoch = {
            let Some(mut entry) = self.shared.sessions.get_mut(&session_id) else {
                return false;
            };
            if entry.state != SessionState::Connected {
                return false;
            }
            entry.state = SessionState::Disconnected;
            entry.epoch += 1;
            entry.epoch
        };
        self.enqueue(session_id, Dispatch::Session(SessionEvent::Disconnected));
        info!("Session {} disconnected", session_id);

        let store = Arc::downgrade(&self.shared);
        let timeout = self.shared.config.session_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = Weak::upgrade(&store) {
                MemoryStore { shared }.expire_if_still_disconnected(session_id, epoch);
            }
        });
        true
    }

    /// Restore a disconnected session before its timeout elapses.
    ///
    /// Watch notifications fired in the meantime are delivered right after
    /// the `Connected` event.
    pub fn reconnect(&self, session_id: SessionId) -> bool {
        // No change may be applied between the flush and the state change
        let _tree = self.shared.tree.lock();
        let held = {
            let Some(mut entry) = self.shared.sessions.get_mut(&session_id) else {
                return false;
            };
            if entry.state != SessionState::Disconnected {
                return false;
            }
            entry.state = SessionState::Connected;
            entry.epoch += 1;
            std::mem::take(&mut entry.held)
        };
        self.enqueue(session_id, Dispatch::Session(SessionEvent::Connected));
        let released = held.len();
        for dispatch in held {
            self.enqueue(session_id, dispatch);
        }
        info!(
            "Session {} reconnected, releasing {} held notifications",
            session_id, released
        );
        true
    }

    /// Expire a session immediately, as if its timeout had elapsed.
    pub fn expire_session(&self, session_id: SessionId) -> bool {
        self.end_session(session_id, SessionState::Expired)
    }

    /// Close a session on behalf of its owner.
    pub fn close_session(&self, session_id: SessionId) -> bool {
        self.end_session(session_id, SessionState::Closed)
    }

    pub fn session_state(&self, session_id: SessionId) -> Option<SessionState> {
        self.shared
            .sessions
            .get(&session_id)
            .map(|entry| entry.state)
    }

    /// Number of nodes including the root
    pub fn node_count(&self) -> usize {
        self.shared.tree.lock().nodes.len()
    }

    /// Number of notifications queued or being processed across all sessions
    pub fn pending_dispatches(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every queued notification has been processed, including the
    /// ones enqueued by handlers while processing.
    pub async fn wait_idle(&self) {
        loop {
            if self.pending_dispatches() == 0 {
                tokio::task::yield_now().await;
                if self.pending_dispatches() == 0 {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Get store statistics
    pub fn get_stats(&self) -> StoreStats {
        let tree = self.shared.tree.lock();
        let mut stats = self.shared.stats.read().clone();
        stats.total_nodes = tree.nodes.len();
        stats.pending_watches = tree.watches.pending();
        stats.watches = tree.watches.stats();
        stats
    }

    // Operations issued through a session

    pub(crate) fn create(
        &self,
        session_id: SessionId,
        path: &str,
        payload: Bytes,
        mode: CreateMode,
    ) -> CoordinationResult<String> {
        validate_path(path)?;
        self.validate_payload(&payload)?;
        let parent_path = parent_of(path)
            .ok_or_else(|| CoordinationError::node_exists(path))?
            .to_string();

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;

        let parent = tree
            .nodes
            .get_mut(&parent_path)
            .ok_or_else(|| CoordinationError::no_node(parent_path.clone()))?;
        if parent.stat.ephemeral_owner.is_some() {
            return Err(CoordinationError::NoChildrenForEphemerals { path: parent_path });
        }

        let full_path = if mode.is_sequential() {
            let sequence = parent.next_sequence;
            parent.next_sequence += 1;
            format!("{}{:010}", path, sequence)
        } else {
            path.to_string()
        };
        let name = name_of(&full_path).to_string();
        if parent.children.contains(&name) {
            return Err(CoordinationError::node_exists(full_path));
        }
        parent.children.insert(name);
        parent.stat.cversion += 1;
        parent.stat.num_children = parent.children.len();

        tree.zxid += 1;
        let owner = mode.is_ephemeral().then_some(session_id);
        let node = Node::new(payload, tree.zxid, owner);
        tree.nodes.insert(full_path.clone(), node);

        let mut fired = tree.watches.trigger(&full_path, WatchKind::NodeCreated);
        fired.extend(tree.watches.trigger(&parent_path, WatchKind::NodeChildrenChanged));
        self.deliver(fired);
        drop(tree);

        {
            let mut stats = self.shared.stats.write();
            stats.nodes_created += 1;
            stats.total_operations += 1;
        }
        debug!("CREATE: path={}, mode={:?}, session={}", full_path, mode, session_id);
        Ok(full_path)
    }

    pub(crate) fn delete(
        &self,
        session_id: SessionId,
        path: &str,
        expected_version: i32,
    ) -> CoordinationResult<()> {
        validate_path(path)?;
        if path == "/" {
            return Err(CoordinationError::invalid_path(path, "the root cannot be deleted"));
        }

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;

        let node = tree
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::no_node(path))?;
        if expected_version != ANY_VERSION && expected_version != node.stat.version {
            return Err(CoordinationError::BadVersion {
                path: path.to_string(),
                expected: expected_version,
                actual: node.stat.version,
            });
        }
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty {
                path: path.to_string(),
            });
        }

        let fired = Self::remove_node(&mut tree, path);
        self.deliver(fired);
        drop(tree);

        {
            let mut stats = self.shared.stats.write();
            stats.nodes_deleted += 1;
            stats.total_operations += 1;
        }
        debug!("DELETE: path={}, session={}", path, session_id);
        Ok(())
    }

    pub(crate) fn exists(
        &self,
        session_id: SessionId,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<Option<Stat>> {
        validate_path(path)?;

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;
        if let Some(watcher) = watcher {
            tree.watches.arm_data(path, session_id, watcher);
        }
        let stat = tree.nodes.get(path).map(|node| node.stat.clone());
        drop(tree);

        self.shared.stats.write().total_operations += 1;
        debug!("EXISTS: path={}, exists={}", path, stat.is_some());
        Ok(stat)
    }

    pub(crate) fn get_children(
        &self,
        session_id: SessionId,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<Vec<String>> {
        validate_path(path)?;

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;
        let children: Vec<String> = tree
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::no_node(path))?
            .children
            .iter()
            .cloned()
            .collect();
        if let Some(watcher) = watcher {
            tree.watches.arm_child(path, session_id, watcher);
        }
        drop(tree);

        self.shared.stats.write().total_operations += 1;
        debug!("GET_CHILDREN: path={}, count={}", path, children.len());
        Ok(children)
    }

    pub(crate) fn get_data(
        &self,
        session_id: SessionId,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<(Bytes, Stat)> {
        validate_path(path)?;

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;
        let (data, stat) = tree
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat.clone()))
            .ok_or_else(|| CoordinationError::no_node(path))?;
        if let Some(watcher) = watcher {
            tree.watches.arm_data(path, session_id, watcher);
        }
        drop(tree);

        self.shared.stats.write().total_operations += 1;
        debug!("GET_DATA: path={}, len={}", path, data.len());
        Ok((data, stat))
    }

    pub(crate) fn set_data(
        &self,
        session_id: SessionId,
        path: &str,
        payload: Bytes,
        expected_version: i32,
    ) -> CoordinationResult<Stat> {
        validate_path(path)?;
        self.validate_payload(&payload)?;

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;
        let zxid = tree.zxid + 1;

        let node = tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::no_node(path))?;
        if expected_version != ANY_VERSION && expected_version != node.stat.version {
            return Err(CoordinationError::BadVersion {
                path: path.to_string(),
                expected: expected_version,
                actual: node.stat.version,
            });
        }
        node.stat.data_length = payload.len();
        node.data = payload;
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = now_millis();
        let stat = node.stat.clone();
        tree.zxid = zxid;

        let fired = tree.watches.trigger(path, WatchKind::NodeDataChanged);
        self.deliver(fired);
        drop(tree);

        self.shared.stats.write().total_operations += 1;
        debug!("SET_DATA: path={}, version={}", path, stat.version);
        Ok(stat)
    }

    pub(crate) fn remove_watch(
        &self,
        session_id: SessionId,
        path: &str,
        watcher: &WatcherRef,
    ) -> CoordinationResult<bool> {
        validate_path(path)?;

        let mut tree = self.shared.tree.lock();
        self.check_session(session_id)?;
        let removed = tree.watches.disarm(path, session_id, watcher);
        drop(tree);

        debug!("REMOVE_WATCH: path={}, removed={}", path, removed);
        Ok(removed)
    }

    // Private helper methods

    fn validate_payload(&self, payload: &Bytes) -> CoordinationResult<()> {
        if payload.len() > self.shared.config.max_payload_size {
            return Err(CoordinationError::PayloadTooLarge {
                size: payload.len(),
                limit: self.shared.config.max_payload_size,
            });
        }
        Ok(())
    }

    fn check_session(&self, session_id: SessionId) -> CoordinationResult<()> {
        match self.session_state(session_id) {
            Some(SessionState::Connected) => Ok(()),
            Some(SessionState::Disconnected) => Err(CoordinationError::ConnectionLoss),
            Some(SessionState::Closed) => Err(CoordinationError::SessionClosed { session_id }),
            Some(SessionState::Expired) | None => {
                Err(CoordinationError::SessionExpired { session_id })
            }
        }
    }

    /// Unlinks a childless node and collects the watches its removal fires.
    fn remove_node(tree: &mut Tree, path: &str) -> Vec<FiredWatch> {
        tree.zxid += 1;
        tree.nodes.remove(path);

        let mut fired = tree.watches.trigger(path, WatchKind::NodeDeleted);
        if let Some(parent_path) = parent_of(path) {
            if let Some(parent) = tree.nodes.get_mut(parent_path) {
                parent.children.remove(name_of(path));
                parent.stat.cversion += 1;
                parent.stat.num_children = parent.children.len();
            }
            fired.extend(tree.watches.trigger(parent_path, WatchKind::NodeChildrenChanged));
        }
        fired
    }

    fn deliver(&self, fired: Vec<FiredWatch>) {
        for FiredWatch {
            session,
            watcher,
            event,
        } in fired
        {
            self.enqueue(session, Dispatch::Watch { watcher, event });
        }
    }

    fn enqueue(&self, session_id: SessionId, dispatch: Dispatch) {
        let Some(mut entry) = self.shared.sessions.get_mut(&session_id) else {
            return;
        };
        if entry.state == SessionState::Disconnected && matches!(dispatch, Dispatch::Watch { .. }) {
            entry.held.push(dispatch);
            return;
        }
        let Some(tx) = entry.dispatch_tx.as_ref() else {
            return;
        };
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        if tx.send(dispatch).is_err() {
            self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            warn!("Dispatcher of session {} is gone", session_id);
        }
    }

    fn expire_if_still_disconnected(&self, session_id: SessionId, epoch: u64) {
        let still_disconnected = self
            .shared
            .sessions
            .get(&session_id)
            .map(|entry| entry.state == SessionState::Disconnected && entry.epoch == epoch)
            .unwrap_or(false);
        if still_disconnected {
            info!("Session {} timed out", session_id);
            self.end_session(session_id, SessionState::Expired);
        }
    }

    fn end_session(&self, session_id: SessionId, terminal: SessionState) -> bool {
        let mut tree = self.shared.tree.lock();
        {
            let Some(mut entry) = self.shared.sessions.get_mut(&session_id) else {
                return false;
            };
            if entry.state.is_terminal() {
                return false;
            }
            entry.state = terminal;
            entry.epoch += 1;
            entry.held.clear();
        }

        tree.watches.discard_session(session_id);

        let mut owned: Vec<String> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == Some(session_id))
            .map(|(path, _)| path.clone())
            .collect();
        owned.sort();
        for path in &owned {
            let fired = Self::remove_node(&mut tree, path);
            self.deliver(fired);
        }

        let event = match terminal {
            SessionState::Closed => SessionEvent::Closed,
            _ => SessionEvent::Expired,
        };
        self.enqueue(session_id, Dispatch::Session(event));
        if let Some(mut entry) = self.shared.sessions.get_mut(&session_id) {
            entry.dispatch_tx = None;
        }
        drop(tree);

        {
            let mut stats = self.shared.stats.write();
            stats.nodes_deleted += owned.len() as u64;
            match terminal {
                SessionState::Closed => stats.sessions_closed += 1,
                _ => stats.sessions_expired += 1,
            }
        }
        info!(
            "Session {} ended ({}), removed {} ephemeral nodes",
            session_id,
            event,
            owned.len()
        );
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
