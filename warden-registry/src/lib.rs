//! # Warden Registry
//!
//! Service discovery on top of any [`warden_core::CoordinationClient`].
//!
//! Workers register their advertised address as an ephemeral sequential
//! entry under the registry namespace. The entry disappears with the worker's
//! session, so the membership never lists a dead worker for longer than the
//! session timeout.
//!
//! Readers get immutable [`MembershipSnapshot`]s. Once a registry has
//! refreshed, it keeps a children watch on the namespace and republishes the
//! snapshot after every membership change.

pub mod errors;
pub mod registry;
pub mod snapshot;

pub use errors::{RegistryError, RegistryResult};
pub use registry::{RegistryConfig, RegistryStats, ServiceRegistry};
pub use snapshot::MembershipSnapshot;
