//! # Coordination Client Contract
//!
//! The store operations election and registry are written against. A store
//! delivers every notification of one session (watch events and session
//! events) serially, on one dispatch task, in the order the changes happened.

use crate::{CoordinationResult, CreateMode, SessionEvent, SessionId, Stat, WatchedEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Version argument accepted by conditional operations to mean "any version".
pub const ANY_VERSION: i32 = -1;

/// Handler for one-shot watch notifications.
///
/// A watcher is supplied when the watch is armed and is invoked at most once
/// per arming. Registering the same `Arc` twice on the same path and kind
/// results in a single notification.
#[async_trait]
pub trait Watcher: Send + Sync {
    async fn process(&self, event: WatchedEvent);
}

/// Shared handle to a watcher.
pub type WatcherRef = Arc<dyn Watcher>;

/// Receives the lifecycle events of one session.
#[async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_session_event(&self, event: SessionEvent);
}

/// Hierarchical coordination store, scoped to one client session.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Session all calls on this client are issued under.
    fn session_id(&self) -> SessionId;

    /// Creates a node and returns its full path, including the sequence
    /// suffix for sequential modes.
    ///
    /// Fails with `NoNode` when the parent is absent and with
    /// `NoChildrenForEphemerals` when the parent is ephemeral.
    async fn create(&self, path: &str, payload: Bytes, mode: CreateMode)
        -> CoordinationResult<String>;

    /// Deletes a node. `ANY_VERSION` deletes unconditionally.
    async fn delete(&self, path: &str, expected_version: i32) -> CoordinationResult<()>;

    /// Returns the node's metadata, or `None` when absent.
    ///
    /// A supplied watcher is armed atomically with the check, whether or not the
    /// node exists, and fires on the next creation, deletion or data change of
    /// exactly this path.
    async fn exists(&self, path: &str, watcher: Option<WatcherRef>)
        -> CoordinationResult<Option<Stat>>;

    /// Lists child names (unordered).
    ///
    /// A supplied watcher fires on the next change of the child set or the
    /// deletion of the node itself.
    async fn get_children(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<Vec<String>>;

    /// Reads the node's payload. A supplied watcher fires on the next data
    /// change or deletion.
    async fn get_data(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<(Bytes, Stat)>;

    /// Disarms every pending watch `watcher` holds on `path` without firing
    /// it. Returns whether anything was armed.
    async fn remove_watch(&self, path: &str, watcher: &WatcherRef) -> CoordinationResult<bool>;

    /// Replaces the node's payload when `expected_version` matches.
    async fn set_data(
        &self,
        path: &str,
        payload: Bytes,
        expected_version: i32,
    ) -> CoordinationResult<Stat>;
}
