//! # Watch Table
//!
//! One-shot watch registrations keyed by path. A registration is removed the
//! moment it fires; the owner has to re-arm it to keep observing.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use warden_core::{SessionId, WatchKind, WatchedEvent, WatcherRef};

/// A watcher armed by one session.
#[derive(Clone)]
pub(crate) struct WatchRegistration {
    pub session: SessionId,
    pub watcher: WatcherRef,
}

impl WatchRegistration {
    fn is_same(&self, session: SessionId, watcher: &WatcherRef) -> bool {
        self.session == session && same_watcher(&self.watcher, watcher)
    }
}

/// Identity of a watcher is the allocation behind its `Arc`.
fn same_watcher(a: &WatcherRef, b: &WatcherRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// A watch that fired and has to be delivered to its session.
pub(crate) struct FiredWatch {
    pub session: SessionId,
    pub watcher: WatcherRef,
    pub event: WatchedEvent,
}

/// Statistics about watch registrations
#[derive(Debug, Clone, Default)]
pub struct WatchStats {
    pub watches_armed: u64,
    pub duplicate_arms: u64,
    pub watches_fired: u64,
    pub watches_discarded: u64,
}

/// Pending watches of the whole store
#[derive(Default)]
pub(crate) struct WatchTable {
    /// Armed by `exists` and `get_data`
    data: HashMap<String, Vec<WatchRegistration>>,
    /// Armed by `get_children`
    child: HashMap<String, Vec<WatchRegistration>>,
    stats: WatchStats,
}

impl WatchTable {
    pub fn arm_data(&mut self, path: &str, session: SessionId, watcher: WatcherRef) {
        Self::arm(&mut self.data, &mut self.stats, path, session, watcher);
    }

    pub fn arm_child(&mut self, path: &str, session: SessionId, watcher: WatcherRef) {
        Self::arm(&mut self.child, &mut self.stats, path, session, watcher);
    }

    fn arm(
        table: &mut HashMap<String, Vec<WatchRegistration>>,
        stats: &mut WatchStats,
        path: &str,
        session: SessionId,
        watcher: WatcherRef,
    ) {
        let registrations = table.entry(path.to_string()).or_default();
        if registrations.iter().any(|r| r.is_same(session, &watcher)) {
            stats.duplicate_arms += 1;
            return;
        }
        registrations.push(WatchRegistration { session, watcher });
        stats.watches_armed += 1;
        debug!("Watch armed: path={}, session={}", path, session);
    }

    /// Removes and returns every registration triggered by `kind` on `path`.
    pub fn trigger(&mut self, path: &str, kind: WatchKind) -> Vec<FiredWatch> {
        let mut triggered: Vec<WatchRegistration> = match kind {
            WatchKind::NodeCreated | WatchKind::NodeDataChanged => {
                self.data.remove(path).unwrap_or_default()
            }
            WatchKind::NodeChildrenChanged => self.child.remove(path).unwrap_or_default(),
            WatchKind::NodeDeleted => {
                let mut all = self.data.remove(path).unwrap_or_default();
                for registration in self.child.remove(path).unwrap_or_default() {
                    if !all
                        .iter()
                        .any(|r| r.is_same(registration.session, &registration.watcher))
                    {
                        all.push(registration);
                    }
                }
                all
            }
        };

        self.stats.watches_fired += triggered.len() as u64;
        triggered
            .drain(..)
            .map(|registration| FiredWatch {
                session: registration.session,
                watcher: registration.watcher,
                event: WatchedEvent::new(kind, path),
            })
            .collect()
    }

    /// Drops the registrations of `watcher` on `path`, returning whether any
    /// existed.
    pub fn disarm(&mut self, path: &str, session: SessionId, watcher: &WatcherRef) -> bool {
        let mut removed = 0;
        for table in [&mut self.data, &mut self.child] {
            if let Some(registrations) = table.get_mut(path) {
                let before = registrations.len();
                registrations.retain(|r| !r.is_same(session, watcher));
                removed += before - registrations.len();
                if registrations.is_empty() {
                    table.remove(path);
                }
            }
        }
        self.stats.watches_discarded += removed as u64;
        removed > 0
    }

    /// Drops every registration owned by `session`.
    pub fn discard_session(&mut self, session: SessionId) {
        let mut discarded = 0;
        for table in [&mut self.data, &mut self.child] {
            for registrations in table.values_mut() {
                let before = registrations.len();
                registrations.retain(|r| r.session != session);
                discarded += before - registrations.len();
            }
            table.retain(|_, registrations| !registrations.is_empty());
        }
        self.stats.watches_discarded += discarded as u64;
        if discarded > 0 {
            debug!("Discarded {} watches of session {}", discarded, session);
        }
    }

    /// Number of registrations still waiting to fire.
    pub fn pending(&self) -> usize {
        self.data.values().map(Vec::len).sum::<usize>()
            + self.child.values().map(Vec::len).sum::<usize>()
    }

    pub fn stats(&self) -> WatchStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use warden_core::Watcher;

    struct NullWatcher;

    #[async_trait]
    impl Watcher for NullWatcher {
        async fn process(&self, _event: WatchedEvent) {}
    }

    #[test]
    fn test_same_watcher_is_armed_once() {
        let mut table = WatchTable::default();
        let session = SessionId::new();
        let watcher: WatcherRef = Arc::new(NullWatcher);

        table.arm_child("/registry", session, watcher.clone());
        table.arm_child("/registry", session, watcher.clone());
        assert_eq!(table.pending(), 1);

        let fired = table.trigger("/registry", WatchKind::NodeChildrenChanged);
        assert_eq!(fired.len(), 1);
        assert_eq!(
            fired[0].event,
            WatchedEvent::NodeChildrenChanged("/registry".to_string())
        );
        assert_eq!(table.pending(), 0);
        assert_eq!(table.stats().duplicate_arms, 1);
    }

    #[test]
    fn test_delete_fires_data_and_child_watches_once() {
        let mut table = WatchTable::default();
        let session = SessionId::new();
        let shared: WatcherRef = Arc::new(NullWatcher);
        let other: WatcherRef = Arc::new(NullWatcher);

        table.arm_data("/a", session, shared.clone());
        table.arm_child("/a", session, shared);
        table.arm_child("/a", session, other);

        let fired = table.trigger("/a", WatchKind::NodeDeleted);
        assert_eq!(fired.len(), 2);
        assert!(fired
            .iter()
            .all(|f| f.event == WatchedEvent::NodeDeleted("/a".to_string())));
    }

    #[test]
    fn test_data_change_leaves_child_watches_armed() {
        let mut table = WatchTable::default();
        let session = SessionId::new();
        table.arm_data("/a", session, Arc::new(NullWatcher));
        table.arm_child("/a", session, Arc::new(NullWatcher));

        assert_eq!(table.trigger("/a", WatchKind::NodeDataChanged).len(), 1);
        assert_eq!(table.pending(), 1);
    }

    #[test]
    fn test_disarm_removes_only_that_watcher() {
        let mut table = WatchTable::default();
        let session = SessionId::new();
        let gone: WatcherRef = Arc::new(NullWatcher);
        let kept: WatcherRef = Arc::new(NullWatcher);
        table.arm_data("/a", session, gone.clone());
        table.arm_child("/a", session, gone.clone());
        table.arm_data("/a", session, kept);

        assert!(table.disarm("/a", session, &gone));
        assert!(!table.disarm("/a", session, &gone));
        assert!(!table.disarm("/a", SessionId::new(), &gone));
        assert_eq!(table.pending(), 1);
        assert_eq!(table.stats().watches_discarded, 2);
    }

    #[test]
    fn test_discard_session() {
        let mut table = WatchTable::default();
        let gone = SessionId::new();
        let alive = SessionId::new();
        table.arm_data("/a", gone, Arc::new(NullWatcher));
        table.arm_data("/a", alive, Arc::new(NullWatcher));

        table.discard_session(gone);
        let fired = table.trigger("/a", WatchKind::NodeDeleted);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].session, alive);
    }
}
