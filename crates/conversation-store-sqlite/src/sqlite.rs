//! SQLite storage for conversation messages and users.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conversation_sync_core::{
    ConversationId, Message, MessageId, MessageStore, NewMessage, ParticipantId, StoreError,
    TailHub, TailSubscription, UserDirectory, UserProfile,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::SqliteStoreError;

type Result<T> = std::result::Result<T, SqliteStoreError>;

struct Inner {
    conn: Connection,
    /// Last seen `PRAGMA data_version`; changes when another connection commits.
    data_version: i64,
}

/// Message store and user directory backed by one SQLite connection.
pub struct SqliteMessageStore {
    inner: Mutex<Inner>,
    hub: Arc<TailHub>,
}

struct MessageRow {
    id: String,
    sender_id: String,
    sender_name: String,
    text: String,
    timestamp_ms: i64,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            sender_name: row.get(2)?,
            text: row.get(3)?,
            timestamp_ms: row.get(4)?,
        })
    }

    fn into_message(self) -> Result<Message> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)
            .ok_or(SqliteStoreError::InvalidTimestamp(self.timestamp_ms))?;
        Ok(Message {
            id: MessageId(self.id),
            sender_id: ParticipantId(self.sender_id),
            sender_name: self.sender_name,
            text: self.text,
            timestamp,
        })
    }
}

impl SqliteMessageStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "opened message database");
        Ok(store)
    }

    /// Creates an in-memory database. Useful for testing.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let data_version = data_version(&conn)?;
        Ok(Self {
            inner: Mutex::new(Inner { conn, data_version }),
            hub: TailHub::new(),
        })
    }

    // ========================================================================
    // Message operations
    // ========================================================================

    /// Inserts a message, assigning a ULID and a timestamp later than every
    /// existing message of the conversation.
    pub fn insert_message(
        &self,
        conversation: &ConversationId,
        message: &NewMessage,
    ) -> Result<Message> {
        let mut inner = self.lock();
        let stored = {
            let tx = inner
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            let last: Option<i64> = tx.query_row(
                "SELECT MAX(timestamp_ms) FROM messages WHERE conversation_id = ?1",
                params![conversation.as_str()],
                |row| row.get(0),
            )?;
            let now = Utc::now().timestamp_millis();
            let timestamp_ms = match last {
                Some(last) if last >= now => last + 1,
                _ => now,
            };
            let row = MessageRow {
                id: Ulid::new().to_string(),
                sender_id: message.sender_id.to_string(),
                sender_name: message.sender_name.clone(),
                text: message.text.clone(),
                timestamp_ms,
            };
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, sender_name, text, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id,
                    conversation.as_str(),
                    row.sender_id,
                    row.sender_name,
                    row.text,
                    row.timestamp_ms
                ],
            )?;
            tx.commit()?;
            row.into_message()?
        };

        // Our own commit does not count as an outside change.
        inner.data_version = data_version(&inner.conn)?;

        self.hub.publish(conversation, |limit| {
            latest(&inner.conn, conversation, limit).map_err(StoreError::from)
        });
        debug!(conversation = %conversation, message_id = %stored.id, "message stored");
        Ok(stored)
    }

    /// The newest `limit` messages, ascending.
    pub fn latest(&self, conversation: &ConversationId, limit: usize) -> Result<Vec<Message>> {
        latest(&self.lock().conn, conversation, limit)
    }

    /// Up to `limit` messages strictly older than `cursor`, ascending.
    pub fn before(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare(
            "SELECT id, sender_id, sender_name, text, timestamp_ms FROM messages
             WHERE conversation_id = ?1 AND timestamp_ms < ?2
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![conversation.as_str(), cursor.timestamp_millis(), sql_limit(limit)],
            MessageRow::from_row,
        )?;
        collect_ascending(rows)
    }

    /// Number of messages stored for a conversation.
    pub fn count(&self, conversation: &ConversationId) -> Result<usize> {
        let inner = self.lock();
        let count: i64 = inner.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Inserts or replaces a user by id.
    pub fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.lock().conn.execute(
            "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email",
            params![user.id.as_str(), user.name, user.email],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &ParticipantId) -> Result<Option<UserProfile>> {
        let inner = self.lock();
        let user = inner
            .conn
            .query_row(
                "SELECT id, name, email FROM users WHERE id = ?1",
                params![id.as_str()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn users(&self) -> Result<Vec<UserProfile>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare("SELECT id, name, email FROM users ORDER BY name, id")?;
        let rows = stmt.query_map([], user_from_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ========================================================================
    // Change detection
    // ========================================================================

    /// Republishes tail windows if another connection committed since the
    /// last check. Returns whether anything changed.
    pub fn refresh_if_changed(&self) -> Result<bool> {
        let mut inner = self.lock();
        let version = data_version(&inner.conn)?;
        if version == inner.data_version {
            return Ok(false);
        }
        inner.data_version = version;

        for conversation in self.hub.conversations() {
            self.hub.publish(&conversation, |limit| {
                latest(&inner.conn, &conversation, limit).map_err(StoreError::from)
            });
        }
        debug!(version, "database changed by another connection");
        Ok(true)
    }

    /// Polls for outside writes every `interval` until the store is dropped.
    pub fn spawn_change_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                if let Err(err) = store.refresh_if_changed() {
                    warn!(error = %err, "change check failed");
                }
            }
        })
    }

    pub fn tail_subscriber_count(&self, conversation: &ConversationId) -> usize {
        self.hub.subscriber_count(conversation)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            text TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
            ON messages(conversation_id, timestamp_ms);

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn latest(conn: &Connection, conversation: &ConversationId, limit: usize) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, sender_name, text, timestamp_ms FROM messages
         WHERE conversation_id = ?1
         ORDER BY timestamp_ms DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![conversation.as_str(), sql_limit(limit)],
        MessageRow::from_row,
    )?;
    collect_ascending(rows)
}

fn collect_ascending(
    rows: impl Iterator<Item = rusqlite::Result<MessageRow>>,
) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?.into_message()?);
    }
    messages.reverse();
    Ok(messages)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: ParticipantId(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
    })
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(
        &self,
        conversation: &ConversationId,
        message: NewMessage,
    ) -> std::result::Result<Message, StoreError> {
        Ok(self.insert_message(conversation, &message)?)
    }

    async fn subscribe_tail(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> std::result::Result<TailSubscription, StoreError> {
        let inner = self.lock();
        let initial = latest(&inner.conn, conversation, limit)?;
        Ok(self.hub.subscribe(conversation, limit, initial))
    }

    async fn page_before(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError> {
        Ok(self.before(conversation, cursor, limit)?)
    }
}

#[async_trait]
impl UserDirectory for SqliteMessageStore {
    async fn list_users(&self) -> std::result::Result<Vec<UserProfile>, StoreError> {
        Ok(self.users()?)
    }

    async fn save_user(&self, user: UserProfile) -> std::result::Result<(), StoreError> {
        Ok(self.upsert_user(&user)?)
    }
}
