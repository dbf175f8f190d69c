//! Immutable membership views published by the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use warden_core::now_millis;

/// Addresses of the registered workers as of one refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    version: u64,
    taken_at: u64,
    addresses: BTreeSet<String>,
}

impl MembershipSnapshot {
    pub fn new(version: u64, addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            version,
            taken_at: now_millis(),
            addresses: addresses.into_iter().collect(),
        }
    }

    /// Number of the refresh that produced this snapshot, starting at 1
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Milliseconds since the Unix epoch when the snapshot was published
    pub fn taken_at(&self) -> u64 {
        self.taken_at
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Addresses in lexical order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }

    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.addresses
    }
}
