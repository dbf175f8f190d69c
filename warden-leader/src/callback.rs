//! Application hooks for leadership transitions.

use async_trait::async_trait;

/// Reacts to the role this node settles into after a leadership round.
///
/// Both hooks run on the session's notification dispatcher, inline with watch
/// delivery: they must not block for an unbounded time. The coordinator calls
/// a hook only when the settled role changes, but a long-lived process can go
/// through many join/resign epochs, so side effects should still be guarded
/// against repetition.
#[async_trait]
pub trait LeadershipCallback: Send + Sync {
    /// This node acquired leadership. May follow a period as a worker.
    async fn on_elected_leader(&self);

    /// This node is not the leader and watches its predecessor.
    async fn on_worker(&self);
}
