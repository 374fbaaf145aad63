use crate::error::Result;
use crate::id::SessionId;
use crate::types::{SessionRecord, SessionSummary};

/// Storage backend for session records.
///
/// Implementations must be interchangeable: callers only see the shared
/// semantics below, never which medium holds the data.
pub trait SessionStore: Send + Sync {
    /// Backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    /// Fetch a record. `Ok(None)` when no record exists;
    /// `Err(CorruptRecord)` when one exists but cannot be parsed.
    fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Insert or fully replace the record keyed by `record.id`, atomically.
    fn put(&self, record: &SessionRecord) -> Result<()>;

    /// Metadata for every record, newest first (see `sort_newest_first`).
    fn list(&self) -> Result<Vec<SessionSummary>>;
}

/// Order by `last_modified` descending, then id ascending so ties are stable.
pub fn sort_newest_first(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.id.cmp(&b.id))
    });
}
