use rusqlite::{Connection, Result};

/// Initialize the watch set schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // One row per (network, address); several listeners may share one file
    conn.execute(
        "CREATE TABLE IF NOT EXISTS watched_addresses (
            network TEXT NOT NULL,
            address TEXT NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (network, address)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_watched_addresses_network ON watched_addresses(network)",
        [],
    )?;

    Ok(())
}
