use std::collections::HashSet;
use std::sync::RwLock;

use crate::storage::{validate_address, StorageError, WatchStore};

/// In-memory watch set guarded by a read-write lock
#[derive(Debug, Default)]
pub struct MemoryWatchStore {
    addresses: RwLock<HashSet<String>>,
}

impl MemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an initial set of addresses
    pub fn with_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: RwLock::new(addresses.into_iter().map(Into::into).collect()),
        }
    }
}

impl WatchStore for MemoryWatchStore {
    fn add(&self, address: &str) -> Result<(), StorageError> {
        validate_address(address)?;
        let mut addresses = self
            .addresses
            .write()
            .map_err(|_| StorageError::Lock("watch set poisoned".to_string()))?;
        addresses.insert(address.to_string());
        Ok(())
    }

    fn remove(&self, address: &str) -> Result<(), StorageError> {
        let mut addresses = self
            .addresses
            .write()
            .map_err(|_| StorageError::Lock("watch set poisoned".to_string()))?;
        addresses.remove(address);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let addresses = self
            .addresses
            .read()
            .map_err(|_| StorageError::Lock("watch set poisoned".to_string()))?;
        Ok(addresses.iter().cloned().collect())
    }

    fn contains(&self, address: &str) -> Result<bool, StorageError> {
        let addresses = self
            .addresses
            .read()
            .map_err(|_| StorageError::Lock("watch set poisoned".to_string()))?;
        Ok(addresses.contains(address))
    }
}
