//! # Warden Node
//!
//! Glue for one node process: the node joins the leader election, registers
//! itself in the service registry while it is a worker, and follows the
//! registry membership once it leads. It runs until its coordination session
//! is lost or the election escalates a failure.

pub mod action;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod shutdown;

pub use action::RegistryElectionAction;
pub use config::{NodeConfig, DEFAULT_PORT};
pub use error::{NodeError, NodeResult};
pub use orchestrator::{ensure_election_namespace, Orchestrator};
pub use shutdown::{SessionWatch, ShutdownListener, ShutdownReason, ShutdownSignal};
