use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SessionError, StorageFault};
use crate::id::SessionId;
use crate::store::{sort_newest_first, SessionStore};
use crate::title::FALLBACK_TITLE;
use crate::types::{Message, SessionRecord, SessionSummary};

const EXTENSION: &str = "json";

/// Session store keeping one `<id>.json` file per session in a directory.
///
/// The directory is created on first write or listing. Writes land in a
/// temp file in the same directory and are renamed over the target, so a
/// reader sees either the old record or the new one, never a mix.
pub struct FileSessionStore {
    dir: PathBuf,
}

/// On-disk forms accepted when reading.
///
/// Older files hold just the message array; their title is derived on read
/// and the file mtime stands in for `lastModified`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFile {
    Record(SessionRecord),
    Legacy(Vec<Message>),
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Parse a file that is known to exist.
    fn read_record(&self, id: &SessionId, path: &Path) -> Result<SessionRecord> {
        let bytes = fs::read(path)?;
        match serde_json::from_slice::<StoredFile>(&bytes) {
            Ok(StoredFile::Record(record)) if record.id == *id => Ok(record),
            Ok(StoredFile::Record(record)) => Err(SessionError::corrupt(
                id.as_str(),
                format!("file holds record for {}", record.id),
            )),
            Ok(StoredFile::Legacy(messages)) => {
                let modified = modified_at(path)?;
                Ok(SessionRecord::new(id.clone(), messages, modified))
            }
            Err(e) => Err(SessionError::corrupt(id.as_str(), e)),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self), fields(id = %id))]
    fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let path = self.path_for(id);
        match self.read_record(id, &path) {
            Ok(record) => Ok(Some(record)),
            Err(SessionError::StorageUnavailable(StorageFault::Io(e)))
                if e.kind() == io::ErrorKind::NotFound =>
            {
                debug!("no session file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    fn put(&self, record: &SessionRecord) -> Result<()> {
        self.ensure_dir()?;
        let body = serde_json::to_vec_pretty(record).map_err(StorageFault::Encode)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(&record.id))
            .map_err(|e| SessionError::from(e.error))?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn list(&self) -> Result<Vec<SessionSummary>> {
        self.ensure_dir()?;

        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| SessionId::parse(s).ok())
            else {
                continue;
            };

            match self.read_record(&id, &path) {
                Ok(record) => summaries.push(record.summary()),
                Err(SessionError::CorruptRecord { reason, .. }) => {
                    warn!(id = %id, %reason, "corrupt session file, listing with fallback title");
                    summaries.push(SessionSummary {
                        last_modified: modified_at(&path)?,
                        title: FALLBACK_TITLE.to_string(),
                        id,
                    });
                }
                // Removed between read_dir and read.
                Err(SessionError::StorageUnavailable(StorageFault::Io(e)))
                    if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}
