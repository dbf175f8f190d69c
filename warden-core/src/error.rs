//! # Error Types
//!
//! Errors surfaced by a coordination store through [`CoordinationClient`].
//!
//! [`CoordinationClient`]: crate::CoordinationClient

use crate::SessionId;
use thiserror::Error;

/// Error conditions of the coordination store contract.
///
/// # Error Categories
///
/// - **Namespace Errors**: missing parents, duplicate paths, ephemeral parents
/// - **Concurrency Errors**: version mismatches on conditional writes
/// - **Session Errors**: the calling session is disconnected, expired or closed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// Referenced node (or the parent of a node being created) does not exist
    #[error("No node at {path}")]
    NoNode { path: String },

    /// A non-sequential node already exists at the path
    #[error("Node already exists at {path}")]
    NodeExists { path: String },

    /// Ephemeral nodes cannot have children
    #[error("Ephemeral node {path} cannot have children")]
    NoChildrenForEphemerals { path: String },

    /// Node still has children and cannot be deleted
    #[error("Node {path} is not empty")]
    NotEmpty { path: String },

    /// Conditional write did not match the node's current version
    #[error("Version mismatch on {path}: expected {expected}, actual {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    /// Malformed path
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Payload exceeds the store's limit
    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The session is temporarily disconnected from the store
    #[error("Connection to coordination store lost")]
    ConnectionLoss,

    /// The session expired and all of its ephemeral nodes are gone
    #[error("Session {session_id} expired")]
    SessionExpired { session_id: SessionId },

    /// The session was closed by its owner
    #[error("Session {session_id} closed")]
    SessionClosed { session_id: SessionId },

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for coordination store operations
pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

impl CoordinationError {
    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists { path: path.into() }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error names a node that does not exist.
    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode { .. })
    }

    /// Whether the error reports a duplicate create.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, Self::NodeExists { .. })
    }

    /// Whether the session that issued the call can no longer be used.
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired { .. } | Self::SessionClosed { .. }
        )
    }

    /// Whether retrying the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLoss | Self::BadVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CoordinationError::no_node("/a").is_no_node());
        assert!(CoordinationError::node_exists("/a").is_node_exists());
        assert!(CoordinationError::ConnectionLoss.is_retryable());
        assert!(!CoordinationError::no_node("/a").is_retryable());

        let expired = CoordinationError::SessionExpired {
            session_id: SessionId::new(),
        };
        assert!(expired.is_session_terminal());
        assert!(!expired.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CoordinationError::NoChildrenForEphemerals {
            path: "/election".to_string(),
        };
        assert_eq!(err.to_string(), "Ephemeral node /election cannot have children");
    }
}
