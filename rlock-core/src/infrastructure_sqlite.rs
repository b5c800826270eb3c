//! SQLite-backed SnapshotStore implementation.
//! Keeps the replicated server's checkpoints across process restarts.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! rlock-core = { path = "../rlock-core", features = ["sqlite"] }
//! ```

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::infrastructure::SnapshotStore;

/// A persistent snapshot store backed by SQLite.
///
/// Every save appends a row and prunes the older ones in the same
/// transaction, so the table holds at most one snapshot at rest.
pub struct SqliteSnapshotStore {
    conn: Connection,
    checkpoints: u64,
}

impl SqliteSnapshotStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        // WAL keeps checkpoint writes from blocking a concurrent reader.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    /// A store on a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                taken_at INTEGER NOT NULL DEFAULT (unixepoch()),
                state    BLOB NOT NULL
            );",
        )?;
        Ok(Self {
            conn,
            checkpoints: 0,
        })
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&mut self, snapshot: &[u8]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("INSERT INTO snapshots (state) VALUES (?1)", params![snapshot])?;
        let latest = tx.last_insert_rowid();
        tx.execute("DELETE FROM snapshots WHERE id < ?1", params![latest])?;
        tx.commit()?;
        self.checkpoints += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let latest = self
            .conn
            .query_row(
                "SELECT state FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(latest)
    }

    fn checkpoints(&self) -> u64 {
        self.checkpoints
    }
}
