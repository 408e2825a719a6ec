pub mod memory;
pub mod schema;
pub mod sqlite;

use thiserror::Error;

pub use memory::MemoryWatchStore;
pub use sqlite::SqliteWatchStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Lock acquisition failed: {0}")]
    Lock(String),
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),
}

/// The set of addresses a listener matches transactions against.
///
/// Implementations must tolerate a poll task listing the set while another
/// task adds or removes addresses.
pub trait WatchStore: Send + Sync {
    /// Add an address to the watch set
    fn add(&self, address: &str) -> Result<(), StorageError>;
    /// Remove an address from the watch set
    fn remove(&self, address: &str) -> Result<(), StorageError>;
    /// All currently watched addresses
    fn list(&self) -> Result<Vec<String>, StorageError>;
    /// Check whether an address is watched
    fn contains(&self, address: &str) -> Result<bool, StorageError>;
}

pub(crate) fn validate_address(address: &str) -> Result<(), StorageError> {
    if address.trim().is_empty() || address.trim() != address {
        return Err(StorageError::InvalidAddress(address.to_string()));
    }
    Ok(())
}
