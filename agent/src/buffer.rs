// Durable per-VIN buffer of encoded records awaiting upload.
// Invariants: an append is either durable or absent; drain order is
// timestamp then insertion id; removes are atomic.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::constants::POISON_LIMIT;
use crate::utils::sanitize_vin;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("buffer storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
}

#[derive(Clone, Debug)]
pub struct BufferEntry {
    pub id: i64,
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub poison_count: i64,
}

pub fn buffer_path(data_dir: &Path, vin: &str) -> PathBuf {
    data_dir.join(format!("buffer_{}.db", sanitize_vin(vin)))
}

pub struct BufferStore {
    conn: Connection,
}

impl BufferStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;

        // WAL keeps appends readable from a concurrent drain pass; ignore
        // quietly where the filesystem does not support it.
        let _ = conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        );

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_records(
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp    INTEGER NOT NULL,
                payload      BLOB NOT NULL,
                poison_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_pending_timestamp
                ON pending_records(timestamp);

            CREATE TABLE IF NOT EXISTS dead_letter(
                id           INTEGER PRIMARY KEY,
                timestamp    INTEGER NOT NULL,
                payload      BLOB NOT NULL,
                poison_count INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(Self { conn })
    }

    pub fn store(&self, timestamp: i64, payload: &[u8]) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO pending_records (timestamp, payload) VALUES (?1, ?2)",
            params![timestamp, payload],
        )?;
        Ok(())
    }

    pub fn oldest_first(&self) -> Result<Vec<BufferEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, payload, poison_count
             FROM pending_records
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BufferEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                payload: row.get(2)?,
                poison_count: row.get(3)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM pending_records WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM pending_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Adds a poison strike to an undecodable entry. Returns true when the
    /// strike limit was reached and the entry moved to the dead-letter table.
    pub fn record_poison(&mut self, id: i64) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE pending_records SET poison_count = poison_count + 1 WHERE id = ?1",
            params![id],
        )?;
        let moved = tx.execute(
            "INSERT INTO dead_letter (id, timestamp, payload, poison_count)
             SELECT id, timestamp, payload, poison_count FROM pending_records
             WHERE id = ?1 AND poison_count >= ?2",
            params![id, POISON_LIMIT],
        )?;
        if moved > 0 {
            tx.execute("DELETE FROM pending_records WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(moved > 0)
    }

    pub fn dead_letter_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM dead_letter", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Closes the connection, flushing any in-flight WAL state.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn
            .close()
            .map_err(|(_, err)| StoreError::Unavailable(err))
    }
}
