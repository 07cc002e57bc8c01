//! Session-scoped conversation memory.
//!
//! A session is an append-only, ordered list of [`Message`]s keyed by an
//! opaque id. Unknown sessions read as empty. The stores do no locking of
//! their own across calls: [`SessionLocks`] is how callers keep two turns on
//! the same session from interleaving.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::llm::Message;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("session storage error: {0}")]
    Storage(String),

    #[error("could not (de)serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Storage(e.to_string())
    }
}

#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Whether history survives a process restart.
    fn is_persistent(&self) -> bool;

    /// Full history of a session, oldest first. Empty for unknown sessions.
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, MemoryError>;

    /// Append one message, creating the session if needed.
    async fn append(&self, session_id: &str, message: Message) -> Result<(), MemoryError>;

    /// Append several messages as one unit.
    async fn append_many(&self, session_id: &str, messages: Vec<Message>) -> Result<(), MemoryError> {
        for message in messages {
            self.append(session_id, message).await?;
        }
        Ok(())
    }

    /// Remove the whole history of a session.
    async fn clear(&self, session_id: &str) -> Result<(), MemoryError>;
}

/// In-memory store (non-persistent).
#[derive(Clone, Default)]
pub struct InMemoryConversationMemory {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn get(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, message: Message) -> Result<(), MemoryError> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn append_many(&self, session_id: &str, messages: Vec<Message>) -> Result<(), MemoryError> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend(messages);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), MemoryError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

/// SQLite-backed store. Messages are kept as JSON rows ordered by insertion.
#[derive(Clone)]
pub struct SqliteConversationMemory {
    conn: Arc<std::sync::Mutex<Connection>>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);
";

impl SqliteConversationMemory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, MemoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MemoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| MemoryError::Storage("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| MemoryError::Task(e.to_string()))?
    }
}

fn insert_all(conn: &mut Connection, session_id: &str, messages: &[Message]) -> Result<(), MemoryError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO messages (session_id, payload, created_at) VALUES (?1, ?2, ?3)")?;
        let now = Utc::now().to_rfc3339();
        for message in messages {
            let payload = serde_json::to_string(message)?;
            stmt.execute(params![session_id, payload, now])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl ConversationMemory for SqliteConversationMemory {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn get(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT payload FROM messages WHERE session_id = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
            let mut messages = Vec::new();
            for payload in rows {
                messages.push(serde_json::from_str(&payload?)?);
            }
            Ok(messages)
        })
        .await
    }

    async fn append(&self, session_id: &str, message: Message) -> Result<(), MemoryError> {
        self.append_many(session_id, vec![message]).await
    }

    async fn append_many(&self, session_id: &str, messages: Vec<Message>) -> Result<(), MemoryError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| insert_all(conn, &session_id, &messages))
            .await
    }

    async fn clear(&self, session_id: &str) -> Result<(), MemoryError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id])?;
            Ok(())
        })
        .await
    }
}

/// One async mutex per session id.
///
/// Holding the guard for a whole turn keeps concurrent turns on the same
/// session from interleaving their appends.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on can go.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
