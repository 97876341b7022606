use std::sync::Mutex;

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::cache::LanguageCache;
use crate::error::HistoryError;
use crate::types::{HistoryEntry, TurnRole};

/// Language cache entries expire after 5 minutes.
const LANGUAGE_CACHE_TTL_SECS: i64 = 300;
/// Maximum language cache entries before eviction.
const LANGUAGE_CACHE_CAPACITY: usize = 100;

/// Narrow store interface used by the turn pipeline. Lets tests substitute
/// an in-memory or always-failing double for the SQLite-backed store.
pub trait HistoryStore: Send + Sync {
    /// Durably record one turn with a store-assigned timestamp. Visible to
    /// subsequent reads immediately.
    fn append(
        &self,
        chat_id: &str,
        role: TurnRole,
        content: &str,
        language: &str,
    ) -> Result<(), HistoryError>;

    /// The most recent `limit` live turns for a chat, oldest first.
    /// Expired turns are excluded even when not yet physically purged.
    fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError>;

    /// Language tag of the chat's most recent turn; "en" for unseen chats.
    /// May serve a bounded-staleness cached value.
    fn language_of(&self, chat_id: &str) -> String;
}

/// SQLite-backed conversation store.
///
/// Thread-safe: wraps the connection in a Mutex and keeps a bounded
/// per-chat language cache that is invalidated on every append for the
/// chat. Turns are append-only; the only deletion path is retention
/// expiry.
pub struct ConversationStore {
    db: Mutex<Connection>,
    cache: Mutex<LanguageCache>,
    retention_days: i64,
}

impl ConversationStore {
    pub fn new(conn: Connection, retention_days: i64) -> Self {
        Self {
            db: Mutex::new(conn),
            cache: Mutex::new(LanguageCache::new(
                LANGUAGE_CACHE_CAPACITY,
                LANGUAGE_CACHE_TTL_SECS,
            )),
            retention_days,
        }
    }

    /// RFC 3339 cutoff below which turns are considered expired.
    fn expiry_cutoff(&self) -> String {
        (Utc::now() - Duration::days(self.retention_days)).to_rfc3339()
    }

    /// Physically delete expired turns. Reads already filter by the cutoff,
    /// so this can run on any cadence from a background task.
    pub fn purge_expired(&self) -> Result<usize, HistoryError> {
        let cutoff = self.expiry_cutoff();
        let db = self.db.lock().unwrap();
        let removed = db.execute(
            "DELETE FROM turns WHERE created_at < ?1",
            rusqlite::params![cutoff],
        )?;
        if removed > 0 {
            debug!(removed, "purged expired turns");
        }
        Ok(removed)
    }
}

impl HistoryStore for ConversationStore {
    fn append(
        &self,
        chat_id: &str,
        role: TurnRole,
        content: &str,
        language: &str,
    ) -> Result<(), HistoryError> {
        // Timestamp assigned here, at write time, under the DB lock — not
        // at call time. The autoincrement id breaks ties for writes that
        // land within the same clock reading.
        {
            let db = self.db.lock().unwrap();
            let now = Utc::now().to_rfc3339();
            db.execute(
                "INSERT INTO turns (chat_id, role, content, language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![chat_id, role.to_string(), content, language, now],
            )?;
        }

        // The chat's language preference may have changed — drop the
        // cached value so the next lookup re-reads.
        self.cache.lock().unwrap().invalidate(chat_id);
        Ok(())
    }

    fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let cutoff = self.expiry_cutoff();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT role, content FROM turns
             WHERE chat_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![chat_id, cutoff, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (role_str, content) = row?;
            let role = role_str
                .parse()
                .map_err(|_| HistoryError::InvalidRole(role_str))?;
            entries.push(HistoryEntry { role, content });
        }
        // Query returns newest first; callers want chronological order.
        entries.reverse();
        Ok(entries)
    }

    fn language_of(&self, chat_id: &str) -> String {
        if let Some(cached) = self.cache.lock().unwrap().get(chat_id) {
            return cached;
        }

        let language: String = {
            let db = self.db.lock().unwrap();
            db.query_row(
                "SELECT language FROM turns
                 WHERE chat_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                rusqlite::params![chat_id],
                |row| row.get(0),
            )
            .unwrap_or_else(|_| sophie_core::types::DEFAULT_LANGUAGE.to_string())
        };

        self.cache.lock().unwrap().insert(chat_id, &language);
        language
    }
}
