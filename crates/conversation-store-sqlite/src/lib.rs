//! # Conversation Store (SQLite)
//!
//! A [`MessageStore`](conversation_sync_core::MessageStore) and
//! [`UserDirectory`](conversation_sync_core::UserDirectory) on a local SQLite
//! file.
//!
//! - Message ids are ULIDs; timestamps are Unix milliseconds and strictly
//!   increase within a conversation, so a timestamp cursor never splits two
//!   messages
//! - Tail subscribers are notified after the insert commits
//! - Writes from other processes are picked up by
//!   [`SqliteMessageStore::spawn_change_watcher`]

mod sqlite;

pub use sqlite::SqliteMessageStore;

use conversation_sync_core::StoreError;

/// Errors from the SQLite store.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored timestamp is outside the representable range.
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
