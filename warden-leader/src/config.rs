//! Configuration for the election coordinator.

use std::time::Duration;

/// What to do when a leadership round fails with a coordination error after
/// the node has joined.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ElectionErrorPolicy {
    /// Abandon the round: the state becomes `Abandoned` and a
    /// `RoundAbandoned` notification is published
    #[default]
    Drop,

    /// Re-run the round up to `max_attempts` more times, sleeping `backoff`
    /// between attempts, then abandon it
    Retry { max_attempts: u32, backoff: Duration },

    /// Publish `ElectionEscalated` so the owner can shut the node down
    Escalate,
}

/// Configuration for the ElectionCoordinator
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Namespace holding the candidate nodes; must exist before joining
    pub namespace: String,

    /// Name prefix of candidate nodes, completed by the store's sequence suffix
    pub candidate_prefix: String,

    /// Watch the predecessor and re-determine leadership when it is deleted.
    /// When disabled, leadership is determined once and no watch is armed.
    pub reelect_on_predecessor_loss: bool,

    /// Handling of coordination failures inside a round
    pub error_policy: ElectionErrorPolicy,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            namespace: "/election".to_string(),
            candidate_prefix: "c_".to_string(),
            reelect_on_predecessor_loss: true,
            error_policy: ElectionErrorPolicy::Drop,
        }
    }
}
