use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use calq_core::{CalcError, CalcResult, StateStore};

use crate::schema::init_db;

/// SQLite-backed [`StateStore`]. One row per key, value stored as text.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(path: &Path) -> CalcResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CalcError::Storage(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CalcError::Storage(format!("cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| CalcError::Storage(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> CalcResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CalcError::Storage(format!("cannot open in-memory db: {e}")))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// When `key` was last written, if it exists and has a timestamp.
    pub fn updated_at(&self, key: &str) -> CalcResult<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CalcError::Storage(e.to_string()))?;

        Ok(raw.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }
}

impl StateStore for SqliteStore {
    fn load(&self, key: &str) -> CalcResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CalcError::Storage(e.to_string()))
    }

    fn save(&self, key: &str, value: &str) -> CalcResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map_err(|e| CalcError::Storage(e.to_string()))?;
        debug!(key, bytes = value.len(), "state saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> CalcResult<()> {
        self.conn
            .execute("DELETE FROM kv_state WHERE key = ?1", params![key])
            .map_err(|e| CalcError::Storage(e.to_string()))?;
        Ok(())
    }
}
