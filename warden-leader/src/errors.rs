//! Error types for leader election operations.

use thiserror::Error;
use warden_core::CoordinationError;

/// Result type for leader election operations
pub type ElectionResult<T> = Result<T, ElectionError>;

/// Errors that can occur during leader election
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElectionError {
    /// The election namespace node does not exist
    #[error("Election namespace {namespace} does not exist")]
    CoordinationUnavailable { namespace: String },

    /// The election namespace is ephemeral and cannot hold candidates
    #[error("Election namespace {namespace} is ephemeral and cannot hold candidates")]
    EphemeralParentRejected { namespace: String },

    /// Leadership was determined before joining
    #[error("Node has not joined the election")]
    NotJoined,

    /// `join` was called while a candidate is already registered
    #[error("Already joined the election as {candidate}")]
    AlreadyJoined { candidate: String },

    /// Own candidate vanished from the namespace (its session ended)
    #[error("Candidate {candidate} is no longer present in the election namespace")]
    CandidateMissing { candidate: String },

    /// Any other coordination store failure
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

impl ElectionError {
    /// Whether the error is a startup misconfiguration that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ElectionError::CoordinationUnavailable { .. }
                | ElectionError::EphemeralParentRejected { .. }
        )
    }

    /// Maps store errors raised while creating a candidate under `namespace`.
    pub(crate) fn from_join(namespace: &str, err: CoordinationError) -> Self {
        match err {
            CoordinationError::NoNode { .. } => ElectionError::CoordinationUnavailable {
                namespace: namespace.to_string(),
            },
            CoordinationError::NoChildrenForEphemerals { .. } => {
                ElectionError::EphemeralParentRejected {
                    namespace: namespace.to_string(),
                }
            }
            other => ElectionError::Coordination(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_error_mapping() {
        let err = ElectionError::from_join("/election", CoordinationError::no_node("/election"));
        assert_eq!(
            err,
            ElectionError::CoordinationUnavailable {
                namespace: "/election".to_string()
            }
        );
        assert!(err.is_fatal());

        let err = ElectionError::from_join(
            "/election",
            CoordinationError::NoChildrenForEphemerals {
                path: "/election".to_string(),
            },
        );
        assert!(matches!(err, ElectionError::EphemeralParentRejected { .. }));
        assert!(err.is_fatal());

        let err = ElectionError::from_join("/election", CoordinationError::ConnectionLoss);
        assert!(!err.is_fatal());
    }
}
