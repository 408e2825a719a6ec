use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::models::Network;
use crate::storage::schema::initialize_schema;
use crate::storage::{validate_address, StorageError, WatchStore};

/// Watch set persisted in SQLite, scoped to one network.
///
/// Clones share the connection, so one database file can back every
/// network via [`SqliteWatchStore::for_network`].
#[derive(Clone)]
pub struct SqliteWatchStore {
    conn: Arc<Mutex<Connection>>,
    network: Network,
}

impl SqliteWatchStore {
    /// Open (or create) a database file and initialize the schema
    pub fn open(path: &str, network: Network) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            network,
        })
    }

    /// Create an in-memory database for testing
    pub fn open_in_memory(network: Network) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            network,
        })
    }

    /// A store over the same connection scoped to another network
    pub fn for_network(&self, network: Network) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            network,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Lock("Failed to acquire lock".to_string()))
    }
}

impl WatchStore for SqliteWatchStore {
    fn add(&self, address: &str) -> Result<(), StorageError> {
        validate_address(address)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO watched_addresses (network, address) VALUES (?1, ?2)",
            params![self.network.as_str(), address],
        )?;
        Ok(())
    }

    fn remove(&self, address: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM watched_addresses WHERE network = ?1 AND address = ?2",
            params![self.network.as_str(), address],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT address FROM watched_addresses WHERE network = ?1 ORDER BY address",
        )?;
        let rows = stmt.query_map(params![self.network.as_str()], |row| row.get::<_, String>(0))?;

        let mut addresses = Vec::new();
        for row in rows {
            addresses.push(row?);
        }
        Ok(addresses)
    }

    fn contains(&self, address: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM watched_addresses WHERE network = ?1 AND address = ?2",
                params![self.network.as_str(), address],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
