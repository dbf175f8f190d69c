//! # Sessions
//!
//! A [`MemorySession`] is a [`CoordinationClient`] bound to one store session.
//! Every session owns a dispatcher task that delivers its watch notifications
//! and session events one at a time: a handler finishes (including any watch
//! it re-arms) before the next notification of that session is processed.

use crate::store::{MemoryStore, SessionState};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use warden_core::{
    CoordinationClient, CoordinationResult, CreateMode, SessionEvent, SessionId,
    SessionListener, Stat, WatchedEvent, WatcherRef,
};

/// A notification queued for a session's dispatcher
pub(crate) enum Dispatch {
    Watch {
        watcher: WatcherRef,
        event: WatchedEvent,
    },
    Session(SessionEvent),
}

pub(crate) fn spawn_dispatcher(
    session_id: SessionId,
    listener: Option<Arc<dyn SessionListener>>,
    in_flight: Arc<AtomicUsize>,
) -> mpsc::UnboundedSender<Dispatch> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

    tokio::spawn(async move {
        debug!("Dispatcher for session {} started", session_id);
        while let Some(dispatch) = rx.recv().await {
            match dispatch {
                Dispatch::Watch { watcher, event } => {
                    debug!("Session {} delivering {:?}", session_id, event);
                    watcher.process(event).await;
                }
                Dispatch::Session(event) => {
                    debug!("Session {} delivering {}", session_id, event);
                    if let Some(listener) = &listener {
                        listener.on_session_event(event).await;
                    }
                }
            }
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        debug!("Dispatcher for session {} stopped", session_id);
    });

    tx
}

/// Client handle bound to one session of a [`MemoryStore`]
#[derive(Clone)]
pub struct MemorySession {
    session_id: SessionId,
    store: MemoryStore,
}

impl MemorySession {
    pub(crate) fn new(session_id: SessionId, store: MemoryStore) -> Self {
        Self { session_id, store }
    }

    /// Current lifecycle state of this session
    pub fn state(&self) -> SessionState {
        self.store
            .session_state(self.session_id)
            .unwrap_or(SessionState::Expired)
    }

    /// Close the session, removing its ephemeral nodes.
    pub fn close(&self) -> bool {
        self.store.close_session(self.session_id)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl CoordinationClient for MemorySession {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    async fn create(
        &self,
        path: &str,
        payload: Bytes,
        mode: CreateMode,
    ) -> CoordinationResult<String> {
        self.store.create(self.session_id, path, payload, mode)
    }

    async fn delete(&self, path: &str, expected_version: i32) -> CoordinationResult<()> {
        self.store.delete(self.session_id, path, expected_version)
    }

    async fn exists(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<Option<Stat>> {
        self.store.exists(self.session_id, path, watcher)
    }

    async fn get_children(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<Vec<String>> {
        self.store.get_children(self.session_id, path, watcher)
    }

    async fn get_data(
        &self,
        path: &str,
        watcher: Option<WatcherRef>,
    ) -> CoordinationResult<(Bytes, Stat)> {
        self.store.get_data(self.session_id, path, watcher)
    }

    async fn remove_watch(&self, path: &str, watcher: &WatcherRef) -> CoordinationResult<bool> {
        self.store.remove_watch(self.session_id, path, watcher)
    }

    async fn set_data(
        &self,
        path: &str,
        payload: Bytes,
        expected_version: i32,
    ) -> CoordinationResult<Stat> {
        self.store
            .set_data(self.session_id, path, payload, expected_version)
    }
}
