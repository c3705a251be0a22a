// src/store/mod.rs
// Durable keyed storage for chat sessions.
//
// All session state lives behind this trait: no component may cache a
// session across requests without re-validating against the store, except
// within one in-flight message-processing call.

mod sqlite;

pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;

use crate::error::ChatError;
use crate::session::ChatSession;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session, or resume idempotently: when `session_id` names an
    /// existing non-expired session owned by `user_id`, that session is
    /// returned unchanged. Any other case allocates a fresh identifier.
    async fn create(&self, user_id: &str, session_id: Option<&str>)
    -> Result<ChatSession, ChatError>;

    /// Fetch by id. Sessions past their idle TTL surface as `NotFound`
    /// even before physical deletion.
    async fn get(&self, session_id: &str) -> Result<ChatSession, ChatError>;

    /// Full-document replace keyed by `session_id`; idempotent for
    /// identical payloads. Either the old or the new version is visible
    /// after a failure, never a partial write.
    async fn save(&self, session: &ChatSession) -> Result<(), ChatError>;

    async fn delete(&self, session_id: &str) -> Result<(), ChatError>;

    /// Non-expired sessions for a user, newest first. Advisory; unbounded.
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<ChatSession>, ChatError>;

    /// Physically remove expired rows. Returns how many were deleted.
    async fn purge_expired(&self) -> Result<u64, ChatError>;
}
