//! # Warden Store
//!
//! In-process implementation of the coordination store contract defined in
//! `warden-core`.
//!
//! ## Features
//!
//! - **Hierarchical Namespace**: persistent and ephemeral nodes in a path tree
//! - **Sequential Nodes**: zero-padded, strictly increasing per-parent suffixes
//! - **Sessions**: ephemeral nodes vanish when their session expires or closes
//! - **Session Timeout**: a disconnected session expires unless reconnected in time
//! - **One-shot Watches**: exists/data and children watches, delivered serially
//!   per session by a dedicated dispatcher task

mod session;
pub mod store;
mod watches;

pub use session::MemorySession;
pub use store::{MemoryStore, SessionState, StoreConfig, StoreStats};
pub use watches::WatchStats;
