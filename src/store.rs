//! Persistence of active conversations across restarts

mod schema;

use crate::conversation::ConversationState;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use schema::SCHEMA;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Backend the manager saves active conversations to
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Replace everything saved with `states`
    async fn replace_active(&self, states: &[ConversationState]) -> Result<(), StoreError>;

    async fn load_active(&self) -> Result<Vec<ConversationState>, StoreError>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn replace_active(&self, states: &[ConversationState]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let saved_at = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM active_conversations", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO active_conversations
                    (conversation_id, player_id, npc_id, provider_id,
                     last_activity, state, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for state in states.iter().filter(|s| s.is_active) {
                stmt.execute(params![
                    state.conversation_id,
                    state.player_id,
                    state.npc_id,
                    state.provider_id,
                    state.last_activity.to_rfc3339(),
                    serde_json::to_string(state)?,
                    saved_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(count = states.len(), "Saved active conversations");
        Ok(())
    }

    async fn load_active(&self) -> Result<Vec<ConversationState>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT state FROM active_conversations ORDER BY last_activity")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut states = Vec::new();
        for raw in rows {
            states.push(serde_json::from_str(&raw?)?);
        }
        Ok(states)
    }
}

/// Store that keeps the last save in memory; for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    saved: Mutex<Vec<ConversationState>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn replace_active(&self, states: &[ConversationState]) -> Result<(), StoreError> {
        let mut saved = self.saved.lock().map_err(|_| StoreError::Poisoned)?;
        *saved = states.iter().filter(|s| s.is_active).cloned().collect();
        Ok(())
    }

    async fn load_active(&self) -> Result<Vec<ConversationState>, StoreError> {
        Ok(self
            .saved
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }
}
