//! # Warden Core
//!
//! Shared building blocks for leader election and service discovery on top of
//! a hierarchical, watch-based coordination store.
//!
//! This crate does not talk to any store by itself. It defines:
//!
//! - **CoordinationClient**: the store contract (create, delete, exists,
//!   children listing, data get/set) consumed by election and registry
//! - **Watch Events**: the closed set of one-shot notifications a store delivers
//! - **Session Events**: connection lifecycle reported to one session listener
//! - **Path Naming**: helpers for namespaces and store-assigned sequence suffixes
//! - **Error Handling**: the error taxonomy of the store contract
//!
//! ## Implementing a watcher
//!
//! ```rust
//! use async_trait::async_trait;
//! use warden_core::{WatchedEvent, Watcher};
//!
//! struct PrintingWatcher;
//!
//! #[async_trait]
//! impl Watcher for PrintingWatcher {
//!     async fn process(&self, event: WatchedEvent) {
//!         println!("{} fired for {}", event.kind(), event.path());
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod path;
pub mod types;

pub use client::{CoordinationClient, SessionListener, Watcher, WatcherRef, ANY_VERSION};
pub use error::{CoordinationError, CoordinationResult};
pub use path::{join_path, name_of, parent_of, sequence_of, sort_by_sequence, validate_path};
pub use types::{now_millis, CreateMode, SessionEvent, SessionId, Stat, WatchKind, WatchedEvent};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_ordering_matches_creation_order() {
        let mut names = vec![
            "c_0000000010".to_string(),
            "c_0000000002".to_string(),
            "c_0000000001".to_string(),
        ];
        sort_by_sequence(&mut names);
        assert_eq!(names[0], "c_0000000001");
        assert_eq!(names[2], "c_0000000010");
    }
}
