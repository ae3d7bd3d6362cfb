use rusqlite::Connection;

use calq_core::CalcError;

pub fn init_db(conn: &Connection) -> Result<(), CalcError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL -- JSON document
        );
        ",
    )
    .map_err(|e| CalcError::Storage(e.to_string()))?;

    // Migration: early databases had no write timestamp
    let has_updated_at: bool = conn
        .prepare("SELECT COUNT(*) FROM pragma_table_info('kv_state') WHERE name='updated_at'")
        .and_then(|mut s| s.query_row([], |row| row.get(0)))
        .map_err(|e| CalcError::Storage(e.to_string()))?;

    if !has_updated_at {
        conn.execute_batch("ALTER TABLE kv_state ADD COLUMN updated_at TEXT NOT NULL DEFAULT ''")
            .map_err(|e| CalcError::Storage(e.to_string()))?;
    }

    Ok(())
}
