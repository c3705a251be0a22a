// src/store/sqlite.rs
// SQLite-backed session store. Each session is one JSON document in a row
// keyed by session_id; `save` is a single upsert, so a write either lands
// whole or not at all. TTL filtering happens in the queries, physical
// deletion is left to the periodic sweeper.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::SessionStore;
use crate::error::ChatError;
use crate::session::ChatSession;

pub struct SqliteSessionStore {
    pool: SqlitePool,
    ttl_seconds: i64,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool, ttl_seconds: i64) -> Self {
        Self { pool, ttl_seconds }
    }

    /// Create the sessions table if it does not exist yet.
    pub async fn init_schema(pool: &SqlitePool) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                doc TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions (user_id, updated_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn expiry_cutoff(&self) -> i64 {
        Utc::now().timestamp() - self.ttl_seconds
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<ChatSession, ChatError> {
        if let Some(sid) = session_id {
            match self.get(sid).await {
                Ok(existing) if existing.user_id == user_id => {
                    debug!(session_id = %sid, "resuming existing session");
                    return Ok(existing);
                }
                // A live session owned by someone else, or no session at
                // all: either way the caller gets a fresh identifier.
                Ok(_) | Err(ChatError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }

        let session = ChatSession::new(user_id);
        self.save(&session).await?;
        debug!(session_id = %session.session_id, user_id = %user_id, "created session");
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> Result<ChatSession, ChatError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT doc FROM chat_sessions WHERE session_id = ? AND updated_at >= ?",
        )
        .bind(session_id)
        .bind(self.expiry_cutoff())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((doc,)) => Ok(serde_json::from_str(&doc)?),
            None => Err(ChatError::NotFound),
        }
    }

    async fn save(&self, session: &ChatSession) -> Result<(), ChatError> {
        let doc = serde_json::to_string(session)?;
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (session_id, user_id, doc, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(&doc)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), ChatError> {
        sqlx::query("DELETE FROM chat_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<ChatSession>, ChatError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT doc FROM chat_sessions
            WHERE user_id = ? AND updated_at >= ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(self.expiry_cutoff())
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for (doc,) in rows {
            sessions.push(serde_json::from_str(&doc)?);
        }
        Ok(sessions)
    }

    async fn purge_expired(&self) -> Result<u64, ChatError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE updated_at < ?")
            .bind(self.expiry_cutoff())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
