use rusqlite::Connection;

use crate::error::Result;

/// Initialise the chats table and its index.
///
/// Safe to call on every startup: uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            id            TEXT PRIMARY KEY,
            messages      TEXT NOT NULL,
            title         TEXT NOT NULL,
            last_modified TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chats_last_modified
            ON chats(last_modified DESC);",
    )?;
    Ok(())
}
