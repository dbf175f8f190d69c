//! # Warden Testing
//!
//! Cluster harness for exercising election and registry behaviour under
//! crashes, partitions and session expiry, all against one in-process store.

pub mod harness;

pub use harness::{init_test_logging, ClusterHarness, ClusterNode, HarnessConfig};
