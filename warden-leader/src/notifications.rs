//! Notification system for leadership transitions.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::now_millis;

/// Leadership-related state changes of one coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum LeadershipChange {
    /// A candidate node was created for this coordinator
    Joined { candidate: String, timestamp: u64 },

    /// This coordinator's candidate became the leader
    LeaderElected { candidate: String, timestamp: u64 },

    /// This coordinator's candidate settled as a worker
    WorkerAssigned {
        candidate: String,
        watching: String,
        timestamp: u64,
    },

    /// A round failed and was given up under the error policy
    RoundAbandoned {
        candidate: Option<String>,
        reason: String,
        timestamp: u64,
    },

    /// A round failed and the error policy asks the owner to stop the node
    ElectionEscalated {
        candidate: Option<String>,
        reason: String,
        timestamp: u64,
    },

    /// The candidate was withdrawn from the election
    Resigned { candidate: String, timestamp: u64 },
}

impl LeadershipChange {
    /// Candidate the change is about, when known
    pub fn candidate(&self) -> Option<&str> {
        match self {
            LeadershipChange::Joined { candidate, .. }
            | LeadershipChange::LeaderElected { candidate, .. }
            | LeadershipChange::WorkerAssigned { candidate, .. }
            | LeadershipChange::Resigned { candidate, .. } => Some(candidate),
            LeadershipChange::RoundAbandoned { candidate, .. }
            | LeadershipChange::ElectionEscalated { candidate, .. } => candidate.as_deref(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            LeadershipChange::RoundAbandoned { .. } | LeadershipChange::ElectionEscalated { .. }
        )
    }
}

/// Subscription filter for notifications
#[derive(Clone)]
pub enum NotificationFilter {
    /// Subscribe to all notifications
    All,

    /// Leader elected and worker assigned only
    Transitions,

    /// Abandoned and escalated rounds only
    Failures,

    /// Notifications about one candidate
    Candidate(String),

    /// Custom filter function
    Custom(Arc<dyn Fn(&LeadershipChange) -> bool + Send + Sync>),
}

impl NotificationFilter {
    pub fn matches(&self, notification: &LeadershipChange) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Transitions => matches!(
                notification,
                LeadershipChange::LeaderElected { .. } | LeadershipChange::WorkerAssigned { .. }
            ),
            NotificationFilter::Failures => notification.is_failure(),
            NotificationFilter::Candidate(name) => notification.candidate() == Some(name.as_str()),
            NotificationFilter::Custom(func) => func(notification),
        }
    }
}

/// Unique identifier for a subscription
pub type SubscriptionId = Uuid;

/// Statistics about notification delivery
#[derive(Debug, Default, Clone)]
pub struct NotificationStats {
    pub notifications_sent: u64,
    pub notifications_delivered: u64,
    pub notifications_dropped: u64,
    pub active_subscriptions: usize,
    pub total_subscriptions: u64,
}

type SubscriberMap =
    HashMap<SubscriptionId, (NotificationFilter, mpsc::UnboundedSender<LeadershipChange>)>;

/// Notification bus for leadership events
pub struct LeaderNotificationBus {
    broadcast_tx: broadcast::Sender<LeadershipChange>,
    subscribers: Arc<RwLock<SubscriberMap>>,
    stats: Arc<RwLock<NotificationStats>>,
}

impl Default for LeaderNotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderNotificationBus {
    /// Create a new notification bus
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create with custom broadcast buffer size
    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);

        Self {
            broadcast_tx,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(NotificationStats::default())),
        }
    }

    /// Subscribe to notifications with a filter
    pub async fn subscribe(
        &self,
        filter: NotificationFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<LeadershipChange>) {
        let subscription_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(subscription_id, (filter, tx));

            let mut stats = self.stats.write().await;
            stats.active_subscriptions = subscribers.len();
            stats.total_subscriptions += 1;
        }

        debug!("Created subscription {}", subscription_id);
        (subscription_id, rx)
    }

    /// Unsubscribe from notifications
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) {
        let mut subscribers = self.subscribers.write().await;

        if subscribers.remove(&subscription_id).is_some() {
            debug!("Removed subscription {}", subscription_id);

            let mut stats = self.stats.write().await;
            stats.active_subscriptions = subscribers.len();
        }
    }

    /// Receiver of every notification, unfiltered
    pub fn broadcast_receiver(&self) -> broadcast::Receiver<LeadershipChange> {
        self.broadcast_tx.subscribe()
    }

    /// Deliver a notification to all matching subscribers
    pub async fn publish(&self, notification: LeadershipChange) {
        {
            let mut stats = self.stats.write().await;
            stats.notifications_sent += 1;
        }

        // No broadcast receivers is fine
        let _ = self.broadcast_tx.send(notification.clone());

        let subscribers = self.subscribers.read().await;
        let mut delivered = 0;
        let mut dropped = 0;

        for (filter, tx) in subscribers.values() {
            if filter.matches(&notification) {
                match tx.send(notification.clone()) {
                    Ok(_) => delivered += 1,
                    Err(_) => {
                        dropped += 1;
                        warn!("Failed to deliver notification to subscriber");
                    }
                }
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.notifications_delivered += delivered;
            stats.notifications_dropped += dropped;
        }

        debug!(
            "Published {:?}: delivered={}, dropped={}",
            notification, delivered, dropped
        );
    }

    pub async fn notify_joined(&self, candidate: &str) {
        self.publish(LeadershipChange::Joined {
            candidate: candidate.to_string(),
            timestamp: now_millis(),
        })
        .await;
    }

    pub async fn notify_leader_elected(&self, candidate: &str) {
        self.publish(LeadershipChange::LeaderElected {
            candidate: candidate.to_string(),
            timestamp: now_millis(),
        })
        .await;
    }

    pub async fn notify_worker_assigned(&self, candidate: &str, watching: &str) {
        self.publish(LeadershipChange::WorkerAssigned {
            candidate: candidate.to_string(),
            watching: watching.to_string(),
            timestamp: now_millis(),
        })
        .await;
    }

    pub async fn notify_round_abandoned(&self, candidate: Option<String>, reason: String) {
        self.publish(LeadershipChange::RoundAbandoned {
            candidate,
            reason,
            timestamp: now_millis(),
        })
        .await;
    }

    pub async fn notify_escalated(&self, candidate: Option<String>, reason: String) {
        self.publish(LeadershipChange::ElectionEscalated {
            candidate,
            reason,
            timestamp: now_millis(),
        })
        .await;
    }

    pub async fn notify_resigned(&self, candidate: &str) {
        self.publish(LeadershipChange::Resigned {
            candidate: candidate.to_string(),
            timestamp: now_millis(),
        })
        .await;
    }

    /// Get notification statistics
    pub async fn get_stats(&self) -> NotificationStats {
        self.stats.read().await.clone()
    }

    /// Get number of active subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
