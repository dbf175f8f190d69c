//! # Warden Leader
//!
//! Leader election on top of any [`warden_core::CoordinationClient`].
//!
//! ## Features
//!
//! - **Sequential Candidates**: each node joins with one ephemeral sequential
//!   node; the lowest sequence number leads
//! - **Predecessor Watches**: a worker watches only the candidate right before
//!   it, so a departure wakes a single successor
//! - **Transition Callbacks**: [`LeadershipCallback`] hooks fire only when the
//!   settled role changes
//! - **Error Policies**: failed rounds are dropped, retried or escalated
//! - **Notifications**: every state change is published on a
//!   [`LeaderNotificationBus`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_core::CoordinationClient;
//! use warden_leader::{ElectionConfig, ElectionCoordinator};
//!
//! # async fn run(client: Arc<dyn CoordinationClient>) -> warden_leader::ElectionResult<()> {
//! let coordinator = ElectionCoordinator::new(client, ElectionConfig::default());
//! let state = coordinator.start().await?;
//! println!("settled as {:?}", state);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod election;
pub mod errors;
pub mod notifications;

pub use callback::LeadershipCallback;
pub use config::{ElectionConfig, ElectionErrorPolicy};
pub use election::{ElectionCoordinator, ElectionStats, LeadershipState};
pub use errors::{ElectionError, ElectionResult};
pub use notifications::{
    LeaderNotificationBus, LeadershipChange, NotificationFilter, NotificationStats,
    SubscriptionId,
};
