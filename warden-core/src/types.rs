//! # Core Types
//!
//! Node metadata, creation modes, sessions and the events a store delivers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Wall-clock milliseconds since the Unix epoch, as recorded in node metadata
/// and notifications.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Identifier of a client session with the coordination store.
///
/// Ephemeral nodes are owned by exactly one session and disappear with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Survives the creating session
    Persistent,
    /// Survives the creating session; the store appends a sequence suffix
    PersistentSequential,
    /// Removed when the creating session ends
    Ephemeral,
    /// Removed when the creating session ends; the store appends a sequence suffix
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Metadata of a node as reported by `exists` and `get_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Store transaction that created the node
    pub czxid: u64,
    /// Store transaction that last modified the node's data
    pub mzxid: u64,
    /// Creation time, milliseconds since the epoch
    pub ctime: u64,
    /// Last data modification time, milliseconds since the epoch
    pub mtime: u64,
    /// Number of data changes
    pub version: i32,
    /// Number of child-set changes
    pub cversion: i32,
    /// Owning session for ephemeral nodes
    pub ephemeral_owner: Option<SessionId>,
    pub data_length: usize,
    pub num_children: usize,
}

impl Stat {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner.is_some()
    }
}

/// Which kind of change a watch event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchKind::NodeCreated => write!(f, "NODE_CREATED"),
            WatchKind::NodeDeleted => write!(f, "NODE_DELETED"),
            WatchKind::NodeDataChanged => write!(f, "NODE_DATA_CHANGED"),
            WatchKind::NodeChildrenChanged => write!(f, "NODE_CHILDREN_CHANGED"),
        }
    }
}

/// A one-shot watch notification. The payload is the watched path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchedEvent {
    NodeCreated(String),
    NodeDeleted(String),
    NodeDataChanged(String),
    NodeChildrenChanged(String),
}

impl WatchedEvent {
    pub fn new(kind: WatchKind, path: impl Into<String>) -> Self {
        let path = path.into();
        match kind {
            WatchKind::NodeCreated => WatchedEvent::NodeCreated(path),
            WatchKind::NodeDeleted => WatchedEvent::NodeDeleted(path),
            WatchKind::NodeDataChanged => WatchedEvent::NodeDataChanged(path),
            WatchKind::NodeChildrenChanged => WatchedEvent::NodeChildrenChanged(path),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            WatchedEvent::NodeCreated(path)
            | WatchedEvent::NodeDeleted(path)
            | WatchedEvent::NodeDataChanged(path)
            | WatchedEvent::NodeChildrenChanged(path) => path,
        }
    }

    pub fn kind(&self) -> WatchKind {
        match self {
            WatchedEvent::NodeCreated(_) => WatchKind::NodeCreated,
            WatchedEvent::NodeDeleted(_) => WatchKind::NodeDeleted,
            WatchedEvent::NodeDataChanged(_) => WatchKind::NodeDataChanged,
            WatchedEvent::NodeChildrenChanged(_) => WatchKind::NodeChildrenChanged,
        }
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionEvent {
    /// The session is (re)connected to the store
    Connected,
    /// The connection dropped; the session survives until its timeout elapses
    Disconnected,
    /// The session timed out; its ephemeral nodes have been removed
    Expired,
    /// The session was closed by its owner
    Closed,
}

impl SessionEvent {
    /// Whether the session can no longer be used after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Expired | SessionEvent::Closed)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Connected => write!(f, "CONNECTED"),
            SessionEvent::Disconnected => write!(f, "DISCONNECTED"),
            SessionEvent::Expired => write!(f, "EXPIRED"),
            SessionEvent::Closed => write!(f, "CLOSED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode_flags() {
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_sequential());
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(CreateMode::PersistentSequential.is_sequential());
    }

    #[test]
    fn test_watched_event_accessors() {
        let event = WatchedEvent::new(WatchKind::NodeDeleted, "/election/c_0000000001");
        assert_eq!(event.kind(), WatchKind::NodeDeleted);
        assert_eq!(event.path(), "/election/c_0000000001");
        assert_eq!(
            event,
            WatchedEvent::NodeDeleted("/election/c_0000000001".to_string())
        );
    }

    #[test]
    fn test_terminal_session_events() {
        assert!(SessionEvent::Expired.is_terminal());
        assert!(SessionEvent::Closed.is_terminal());
        assert!(!SessionEvent::Disconnected.is_terminal());
    }
}
