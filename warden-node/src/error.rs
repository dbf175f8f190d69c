//! Error types for the node process.

use thiserror::Error;
use warden_core::CoordinationError;
use warden_leader::ElectionError;
use warden_registry::RegistryError;

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Invalid port argument: {value}")]
    InvalidPort { value: String },

    #[error("Election error: {0}")]
    Election(#[from] ElectionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

impl NodeError {
    /// Whether the node cannot start with its current configuration.
    pub fn is_fatal(&self) -> bool {
        match self {
            NodeError::InvalidPort { .. } => true,
            NodeError::Election(err) => err.is_fatal(),
            NodeError::Registry(err) => err.is_fatal(),
            NodeError::Coordination(err) => err.is_session_terminal(),
        }
    }
}
