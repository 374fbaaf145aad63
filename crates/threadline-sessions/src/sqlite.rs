use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument, warn};

use crate::db::init_db;
use crate::error::{Result, SessionError, StorageFault};
use crate::id::SessionId;
use crate::store::{sort_newest_first, SessionStore};
use crate::types::{Message, SessionRecord, SessionSummary};

/// Session store backed by the SQLite `chats` table.
///
/// Wraps a single connection in a `Mutex`; each operation is one statement,
/// so rows for different ids never interfere.
pub struct SqliteSessionStore {
    db: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open (creating if needed) the database file and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied; keep serving.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for SqliteSessionStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self), fields(id = %id))]
    fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT messages, title, last_modified FROM chats WHERE id = ?1",
                rusqlite::params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((messages, title, last_modified)) = row else {
            debug!("no session row");
            return Ok(None);
        };

        let messages: Vec<Message> = serde_json::from_str(&messages)
            .map_err(|e| SessionError::corrupt(id.as_str(), e))?;
        let last_modified =
            parse_timestamp(&last_modified).map_err(|e| SessionError::corrupt(id.as_str(), e))?;

        Ok(Some(SessionRecord {
            id: id.clone(),
            title,
            last_modified,
            messages,
        }))
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    fn put(&self, record: &SessionRecord) -> Result<()> {
        let messages = serde_json::to_string(&record.messages).map_err(StorageFault::Encode)?;
        self.conn().execute(
            "INSERT INTO chats (id, messages, title, last_modified)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 messages      = excluded.messages,
                 title         = excluded.title,
                 last_modified = excluded.last_modified",
            rusqlite::params![
                record.id.as_str(),
                messages,
                record.title,
                format_timestamp(&record.last_modified),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn list(&self) -> Result<Vec<SessionSummary>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT id, title, last_modified FROM chats
             ORDER BY last_modified DESC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, title, last_modified) = row?;
            let Ok(id) = SessionId::parse(&id) else {
                warn!(%id, "skipping row with malformed id");
                continue;
            };
            let last_modified = parse_timestamp(&last_modified).unwrap_or_else(|e| {
                warn!(id = %id, error = %e, "unparseable last_modified, sorting as oldest");
                DateTime::<Utc>::UNIX_EPOCH
            });
            summaries.push(SessionSummary {
                id,
                title,
                last_modified,
            });
        }

        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}

/// Fixed-width RFC 3339 (UTC, milliseconds) so text order matches time order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn store() -> SqliteSessionStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        SqliteSessionStore::new(conn)
    }

    fn id(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = DateTime::from_timestamp_millis(999).unwrap();
        let late = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
        assert_eq!(parse_timestamp(&format_timestamp(&late)).unwrap(), late);
    }

    #[test]
    fn upsert_keeps_one_row() {
        let store = store();
        let at = DateTime::from_timestamp_millis(1_000).unwrap();
        store
            .put(&SessionRecord::new(id("abc"), vec![Message::text(Role::User, "one")], at))
            .unwrap();
        store
            .put(&SessionRecord::new(id("abc"), vec![Message::text(Role::User, "two")], at))
            .unwrap();

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.get(&id("abc")).unwrap().unwrap().title, "two");
    }

    #[test]
    fn bad_messages_column_is_corrupt() {
        let store = store();
        store
            .conn()
            .execute(
                "INSERT INTO chats (id, messages, title, last_modified)
                 VALUES ('bad', 'not json', 'x', '2026-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.get(&id("bad")),
            Err(SessionError::CorruptRecord { .. })
        ));
        // Listing reads only metadata columns.
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn missing_row_is_none() {
        assert_eq!(store().get(&id("nope")).unwrap(), None);
    }

    #[test]
    fn open_creates_parent_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data").join("threadline.db");
        let store = SqliteSessionStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.list().unwrap().is_empty());
    }
}
