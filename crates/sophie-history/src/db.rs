use rusqlite::{Connection, Result};

/// Initialise history tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_turns_table(conn)
}

/// One row per conversation turn. The compound index serves the
/// `recent(chat_id, limit)` query; `created_at` is RFC 3339 UTC so string
/// comparison orders chronologically. Retention expiry deletes by
/// `created_at` alone.
fn create_turns_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS turns (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            language    TEXT NOT NULL DEFAULT 'en',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_chat_recency
            ON turns(chat_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_turns_created
            ON turns(created_at);",
    )
}
