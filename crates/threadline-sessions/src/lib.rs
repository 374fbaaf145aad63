pub mod db;
pub mod error;
pub mod file;
pub mod id;
pub mod manager;
pub mod sqlite;
pub mod store;
pub mod title;
pub mod types;

pub use error::{SessionError, StorageFault};
pub use file::FileSessionStore;
pub use id::{new_id, SessionId};
pub use manager::SessionManager;
pub use sqlite::SqliteSessionStore;
pub use store::SessionStore;
pub use title::{derive_title, FALLBACK_TITLE};
pub use types::{Message, Part, Role, Session, SessionRecord, SessionSummary, TextPart};
