//! Leader election over ephemeral sequential candidate nodes.
//!
//! Every participant creates one candidate under the election namespace. The
//! candidate with the lowest sequence number leads; every other candidate
//! watches only its immediate predecessor, so a departure wakes exactly one
//! waiter.

use crate::{
    ElectionConfig, ElectionError, ElectionErrorPolicy, ElectionResult, LeaderNotificationBus,
    LeadershipCallback,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use warden_core::{
    join_path, name_of, sequence_of, sort_by_sequence, CoordinationClient, CoordinationError,
    CreateMode, WatchedEvent, Watcher, WatcherRef, ANY_VERSION,
};

/// Role of this node in the election
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipState {
    /// Not joined, or resigned
    Idle,
    /// A round is listing candidates
    Determining,
    /// Own candidate has the lowest sequence number
    Leader,
    /// Watching the immediate predecessor
    Worker,
    /// The last round failed and was given up
    Abandoned,
}

/// Election statistics
#[derive(Debug, Default, Clone)]
pub struct ElectionStats {
    pub rounds_started: u64,
    pub predecessor_notifications: u64,
    /// Predecessor vanished between listing and arming its watch
    pub predecessor_races: u64,
    pub retries: u64,
    pub leadership_acquired: u64,
    pub worker_transitions: u64,
    pub rounds_abandoned: u64,
    pub escalations: u64,
}

/// Drives one node's participation in a leader election.
#[derive(Clone)]
pub struct ElectionCoordinator {
    inner: Arc<ElectionInner>,
}

struct ElectionInner {
    client: Arc<dyn CoordinationClient>,
    config: ElectionConfig,
    callback: Option<Arc<dyn LeadershipCallback>>,
    notification_bus: Arc<LeaderNotificationBus>,
    candidate: RwLock<Option<String>>,
    state: RwLock<LeadershipState>,
    // Last role reported to the callback in this epoch
    settled: RwLock<LeadershipState>,
    predecessor: RwLock<Option<String>>,
    epoch: AtomicU64,
    stats: RwLock<ElectionStats>,
    round_lock: Mutex<()>,
}

/// One-shot watch on the predecessor of the current round.
struct PredecessorWatch {
    coordinator: Weak<ElectionInner>,
    predecessor: String,
    epoch: u64,
}

#[async_trait]
impl Watcher for PredecessorWatch {
    async fn process(&self, event: WatchedEvent) {
        let Some(inner) = self.coordinator.upgrade() else {
            return;
        };

        let current = inner.epoch.load(Ordering::Acquire) == self.epoch
            && inner.predecessor.read().as_deref() == Some(self.predecessor.as_str());
        if !current {
            debug!("Ignoring stale watch on {}: {:?}", self.predecessor, event);
            return;
        }

        inner.stats.write().predecessor_notifications += 1;
        match event {
            WatchedEvent::NodeDeleted(_) => {
                info!("Predecessor {} left, re-determining leadership", self.predecessor);
            }
            other => {
                debug!("Predecessor watch fired with {:?}, re-arming", other);
            }
        }

        // Failures were already handled under the error policy
        let _ = inner.run_round().await;
    }
}

impl ElectionCoordinator {
    /// Create a coordinator without application hooks
    pub fn new(client: Arc<dyn CoordinationClient>, config: ElectionConfig) -> Self {
        Self::build(client, config, None)
    }

    /// Create a coordinator that reports role changes to `callback`
    pub fn with_callback(
        client: Arc<dyn CoordinationClient>,
        config: ElectionConfig,
        callback: Arc<dyn LeadershipCallback>,
    ) -> Self {
        Self::build(client, config, Some(callback))
    }

    fn build(
        client: Arc<dyn CoordinationClient>,
        config: ElectionConfig,
        callback: Option<Arc<dyn LeadershipCallback>>,
    ) -> Self {
        Self {
            inner: Arc::new(ElectionInner {
                client,
                config,
                callback,
                notification_bus: Arc::new(LeaderNotificationBus::new()),
                candidate: RwLock::new(None),
                state: RwLock::new(LeadershipState::Idle),
                settled: RwLock::new(LeadershipState::Idle),
                predecessor: RwLock::new(None),
                epoch: AtomicU64::new(0),
                stats: RwLock::new(ElectionStats::default()),
                round_lock: Mutex::new(()),
            }),
        }
    }

    /// Create this node's candidate and return its name.
    ///
    /// The namespace must already exist as a persistent node.
    pub async fn join(&self) -> ElectionResult<String> {
        let inner = &self.inner;
        let _round = inner.round_lock.lock().await;

        let existing = inner.candidate.read().clone();
        if let Some(candidate) = existing {
            return Err(ElectionError::AlreadyJoined { candidate });
        }

        let namespace = &inner.config.namespace;
        let prefix = join_path(namespace, &inner.config.candidate_prefix);
        let path = inner
            .client
            .create(&prefix, Bytes::new(), CreateMode::EphemeralSequential)
            .await
            .map_err(|err| ElectionError::from_join(namespace, err))?;
        let candidate = name_of(&path).to_string();

        inner.epoch.fetch_add(1, Ordering::AcqRel);
        *inner.candidate.write() = Some(candidate.clone());
        *inner.settled.write() = LeadershipState::Idle;

        info!("Joined election {} as {}", namespace, candidate);
        inner.notification_bus.notify_joined(&candidate).await;
        Ok(candidate)
    }

    /// Run a leadership round and return the role it settled into.
    ///
    /// Failures go through the configured error policy before being returned.
    pub async fn determine_leadership(&self) -> ElectionResult<LeadershipState> {
        self.inner.run_round().await
    }

    /// Join and run the first round
    pub async fn start(&self) -> ElectionResult<LeadershipState> {
        self.join().await?;
        self.determine_leadership().await
    }

    /// Withdraw the candidate. Watches armed before resigning are ignored.
    pub async fn resign(&self) -> ElectionResult<()> {
        let inner = &self.inner;
        let _round = inner.round_lock.lock().await;

        inner.epoch.fetch_add(1, Ordering::AcqRel);
        let candidate = inner.candidate.write().take();
        *inner.predecessor.write() = None;
        *inner.state.write() = LeadershipState::Idle;
        *inner.settled.write() = LeadershipState::Idle;

        let Some(candidate) = candidate else {
            return Ok(());
        };

        let path = join_path(&inner.config.namespace, &candidate);
        match inner.client.delete(&path, ANY_VERSION).await {
            Ok(()) | Err(CoordinationError::NoNode { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        info!("Candidate {} resigned", candidate);
        inner.notification_bus.notify_resigned(&candidate).await;
        Ok(())
    }

    pub fn state(&self) -> LeadershipState {
        *self.inner.state.read()
    }

    pub fn is_leader(&self) -> bool {
        self.state() == LeadershipState::Leader
    }

    /// Name of this node's candidate, if joined
    pub fn candidate_name(&self) -> Option<String> {
        self.inner.candidate.read().clone()
    }

    /// Candidate currently watched, when this node is a worker
    pub fn watched_predecessor(&self) -> Option<String> {
        self.inner.predecessor.read().clone()
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.inner.config
    }

    pub fn get_stats(&self) -> ElectionStats {
        self.inner.stats.read().clone()
    }

    pub fn notification_bus(&self) -> Arc<LeaderNotificationBus> {
        self.inner.notification_bus.clone()
    }
}

impl ElectionInner {
    async fn run_round(self: &Arc<Self>) -> ElectionResult<LeadershipState> {
        let _round = self.round_lock.lock().await;

        let joined = self.candidate.read().is_some();
        if !joined {
            return Err(ElectionError::NotJoined);
        }

        let mut attempt: u32 = 0;
        loop {
            let err = match self.determine_once().await {
                Ok(state) => return Ok(state),
                Err(err) => err,
            };

            if let ElectionErrorPolicy::Retry {
                max_attempts,
                backoff,
            } = &self.config.error_policy
            {
                if attempt < *max_attempts {
                    attempt += 1;
                    self.stats.write().retries += 1;
                    warn!(
                        "Leadership round failed ({}), retry {}/{}",
                        err, attempt, max_attempts
                    );
                    tokio::time::sleep(*backoff).await;
                    continue;
                }
            }

            self.give_up(&err).await;
            return Err(err);
        }
    }

    async fn determine_once(self: &Arc<Self>) -> ElectionResult<LeadershipState> {
        let candidate = self
            .candidate
            .read()
            .clone()
            .ok_or(ElectionError::NotJoined)?;
        let epoch = self.epoch.load(Ordering::Acquire);
        let namespace = &self.config.namespace;

        *self.state.write() = LeadershipState::Determining;
        self.stats.write().rounds_started += 1;

        loop {
            let mut candidates: Vec<String> = self
                .client
                .get_children(namespace, None)
                .await?
                .into_iter()
                .filter(|name| self.is_candidate(name))
                .collect();
            sort_by_sequence(&mut candidates);

            let position = candidates
                .iter()
                .position(|name| *name == candidate)
                .ok_or_else(|| ElectionError::CandidateMissing {
                    candidate: candidate.clone(),
                })?;

            if position == 0 {
                self.settle_leader(&candidate).await;
                return Ok(LeadershipState::Leader);
            }

            let predecessor = candidates[position - 1].clone();
            if !self.config.reelect_on_predecessor_loss {
                self.settle_worker(&candidate, &predecessor).await;
                return Ok(LeadershipState::Worker);
            }

            // Recorded before arming so an immediate notification is not
            // mistaken for a stale one
            *self.predecessor.write() = Some(predecessor.clone());
            let watcher: WatcherRef = Arc::new(PredecessorWatch {
                coordinator: Arc::downgrade(self),
                predecessor: predecessor.clone(),
                epoch,
            });

            let path = join_path(namespace, &predecessor);
            match self.client.exists(&path, Some(watcher.clone())).await? {
                Some(_) => {
                    self.settle_worker(&candidate, &predecessor).await;
                    return Ok(LeadershipState::Worker);
                }
                None => {
                    debug!(
                        "Predecessor {} vanished before its watch was armed, listing again",
                        predecessor
                    );
                    self.stats.write().predecessor_races += 1;
                    // Sequential names are never reused, so this watch cannot fire
                    self.client.remove_watch(&path, &watcher).await?;
                }
            }
        }
    }

    fn is_candidate(&self, name: &str) -> bool {
        name.strip_prefix(self.config.candidate_prefix.as_str())
            .and_then(sequence_of)
            .is_some()
    }

    /// Records `role` as settled, returning whether it differs from the last one.
    fn transition_to(&self, role: LeadershipState) -> bool {
        *self.state.write() = role;
        let mut settled = self.settled.write();
        let changed = *settled != role;
        *settled = role;
        changed
    }

    async fn settle_leader(&self, candidate: &str) {
        *self.predecessor.write() = None;
        if !self.transition_to(LeadershipState::Leader) {
            return;
        }

        info!("Candidate {} is now the leader", candidate);
        self.stats.write().leadership_acquired += 1;
        self.notification_bus.notify_leader_elected(candidate).await;
        if let Some(callback) = &self.callback {
            callback.on_elected_leader().await;
        }
    }

    async fn settle_worker(&self, candidate: &str, predecessor: &str) {
        *self.predecessor.write() = Some(predecessor.to_string());
        if !self.transition_to(LeadershipState::Worker) {
            debug!("Candidate {} still a worker, watching {}", candidate, predecessor);
            return;
        }

        info!("Candidate {} is a worker, watching {}", candidate, predecessor);
        self.stats.write().worker_transitions += 1;
        self.notification_bus
            .notify_worker_assigned(candidate, predecessor)
            .await;
        if let Some(callback) = &self.callback {
            callback.on_worker().await;
        }
    }

    async fn give_up(&self, err: &ElectionError) {
        let candidate = self.candidate.read().clone();
        *self.state.write() = LeadershipState::Abandoned;
        *self.predecessor.write() = None;

        match self.config.error_policy {
            ElectionErrorPolicy::Escalate => {
                error!("Leadership round failed, escalating: {}", err);
                self.stats.write().escalations += 1;
                self.notification_bus
                    .notify_escalated(candidate, err.to_string())
                    .await;
            }
            _ => {
                warn!("Leadership round abandoned: {}", err);
                self.stats.write().rounds_abandoned += 1;
                self.notification_bus
                    .notify_round_abandoned(candidate, err.to_string())
                    .await;
            }
        }
    }
}
