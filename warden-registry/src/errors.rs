//! Error types for the service registry.

use thiserror::Error;
use warden_core::CoordinationError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// The registry namespace has not been created
    #[error("Registry namespace {namespace} does not exist")]
    NamespaceMissing { namespace: String },

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

impl RegistryError {
    /// Maps store errors of operations addressing the namespace itself.
    pub(crate) fn from_namespace(namespace: &str, err: CoordinationError) -> Self {
        match err {
            CoordinationError::NoNode { .. } => RegistryError::NamespaceMissing {
                namespace: namespace.to_string(),
            },
            other => RegistryError::Coordination(other),
        }
    }

    /// An entry vanished between two calls, usually because its session ended.
    pub fn is_transient_race(&self) -> bool {
        matches!(
            self,
            RegistryError::Coordination(CoordinationError::NoNode { .. })
        )
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            RegistryError::NamespaceMissing { .. } => true,
            RegistryError::Coordination(err) => err.is_session_terminal(),
        }
    }
}
