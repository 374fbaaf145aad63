use chrono::{DateTime, Utc};
use threadline_core::config::{Deployment, StorageBackend, StorageConfig};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SessionError};
use crate::file::FileSessionStore;
use crate::id::{new_id, SessionId};
use crate::sqlite::SqliteSessionStore;
use crate::store::SessionStore;
use crate::types::{Message, Session, SessionRecord, SessionSummary};

/// Entry point for session persistence.
///
/// Holds whichever `SessionStore` was chosen at startup. `load` is tolerant
/// (missing, malformed or corrupt all read as an empty transcript); `save` is
/// strict about ids and surfaces storage failures to the caller. Nothing is
/// retried here.
pub struct SessionManager {
    store: Box<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Build the backend selected by config (or by deployment default).
    pub fn from_config(config: &StorageConfig, deployment: Deployment) -> Result<Self> {
        let store: Box<dyn SessionStore> = match config.backend_for(deployment) {
            StorageBackend::File => {
                let dir = config.chat_dir(deployment);
                info!(dir = %dir.display(), "using file session store");
                Box::new(FileSessionStore::new(dir))
            }
            StorageBackend::Sqlite => {
                let path = config.database_path();
                info!(path = %path.display(), "using sqlite session store");
                Box::new(SqliteSessionStore::open(&path)?)
            }
        };
        Ok(Self::new(store))
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Mint a new session id. Nothing is written until the first `save`.
    pub fn create(&self) -> SessionId {
        let id = new_id();
        debug!(id = %id, "minted session id");
        id
    }

    /// Current state of a session.
    ///
    /// A corrupt record is logged and reported as `Unsaved`; the next save
    /// replaces it.
    #[instrument(skip(self), fields(id = %id))]
    pub fn open(&self, id: &SessionId) -> Result<Session> {
        match self.store.get(id) {
            Ok(Some(record)) => Ok(Session::Saved(record)),
            Ok(None) => Ok(Session::Unsaved(id.clone())),
            Err(SessionError::CorruptRecord { reason, .. }) => {
                warn!(%reason, "corrupt session record, treating as empty");
                Ok(Session::Unsaved(id.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Transcript for `id`, or empty if there is none or `id` is malformed.
    ///
    /// Only `StorageUnavailable` is returned as an error.
    pub fn load(&self, id: &str) -> Result<Vec<Message>> {
        match SessionId::parse(id) {
            Ok(id) => Ok(self.open(&id)?.into_messages()),
            Err(_) => {
                debug!(id, "load with malformed id, returning empty transcript");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the whole transcript for `id`, recomputing title and
    /// `lastModified`. Last writer wins.
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    pub fn save(&self, id: &str, messages: Vec<Message>) -> Result<SessionSummary> {
        let id = SessionId::parse(id)?;
        let record = SessionRecord::new(id, messages, now_millis());
        self.store.put(&record)?;
        info!(title = %record.title, backend = self.store.backend(), "session saved");
        Ok(record.summary())
    }

    /// Every saved session, most recently saved first.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        self.store.list()
    }
}

/// Current time truncated to what both backends persist.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn file_manager(dir: &std::path::Path) -> SessionManager {
        SessionManager::new(Box::new(FileSessionStore::new(dir)))
    }

    #[test]
    fn create_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = file_manager(tmp.path());
        let id = manager.create();
        assert!(manager.list().unwrap().is_empty());
        assert!(!manager.open(&id).unwrap().is_saved());
    }

    #[test]
    fn open_reports_saved_after_save() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = file_manager(tmp.path());
        let id = manager.create();
        manager
            .save(id.as_str(), vec![Message::text(Role::User, "Hello")])
            .unwrap();

        let session = manager.open(&id).unwrap();
        assert!(session.is_saved());
        assert_eq!(session.title(), "Hello");
    }

    #[test]
    fn corrupt_record_opens_unsaved() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "[[[").unwrap();
        let manager = file_manager(tmp.path());

        let id = SessionId::parse("bad").unwrap();
        assert_eq!(manager.open(&id).unwrap(), Session::Unsaved(id));
        assert!(manager.load("bad").unwrap().is_empty());
    }

    #[test]
    fn storage_failure_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = tmp.path().join("chats");
        std::fs::write(&blocker, "").unwrap();
        let manager = file_manager(&blocker);

        let err = manager
            .save("abc", vec![Message::text(Role::User, "hi")])
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
    }

    #[test]
    fn from_config_honours_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: Some(StorageBackend::Sqlite),
            dir: None,
            database: Some(tmp.path().join("t.db").display().to_string()),
        };
        let manager = SessionManager::from_config(&config, Deployment::Local).unwrap();
        assert_eq!(manager.backend(), "sqlite");

        let config = StorageConfig {
            backend: None,
            dir: Some(tmp.path().join("chats").display().to_string()),
            database: None,
        };
        let manager = SessionManager::from_config(&config, Deployment::Local).unwrap();
        assert_eq!(manager.backend(), "file");
    }
}
