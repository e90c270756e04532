// Ledger State Abstraction
//
// The slice of the external ledger a state transition can see: a keyed
// read and an atomic multi-key write, both scoped to one invocation.
//
// This module defines the interface plus an in-memory backend for tests
// and simulation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::address::PageAddress;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("state unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),
}

/// Key-value state of the external ledger.
///
/// Properties required from implementations:
/// - `read` returns only the addresses that exist; absent keys are missing
///   from the map, never an error
/// - `write_all` is atomic: every key becomes visible, or none does
pub trait StateStore: Send + Sync {
    fn read(
        &self,
        addresses: &[PageAddress],
    ) -> Result<BTreeMap<PageAddress, Vec<u8>>, StoreError>;

    fn write_all(&mut self, changes: BTreeMap<PageAddress, Vec<u8>>) -> Result<(), StoreError>;
}

/// Map-backed state, used by tests and the in-memory ledger.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateStore {
    entries: BTreeMap<PageAddress, Vec<u8>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &PageAddress) -> Option<&[u8]> {
        self.entries.get(address).map(Vec::as_slice)
    }

    /// Overwrite or insert a single entry, bypassing any transition.
    pub fn put(&mut self, address: PageAddress, bytes: Vec<u8>) {
        self.entries.insert(address, bytes);
    }

    pub fn remove(&mut self, address: &PageAddress) -> Option<Vec<u8>> {
        self.entries.remove(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn read(
        &self,
        addresses: &[PageAddress],
    ) -> Result<BTreeMap<PageAddress, Vec<u8>>, StoreError> {
        Ok(addresses
            .iter()
            .filter_map(|a| self.entries.get(a).map(|v| (a.clone(), v.clone())))
            .collect())
    }

    fn write_all(&mut self, changes: BTreeMap<PageAddress, Vec<u8>>) -> Result<(), StoreError> {
        debug!(keys = changes.len(), "committing write set");
        self.entries.extend(changes);
        Ok(())
    }
}
