// src/error.rs
// Domain error taxonomy. Everything here is recovered at the controller
// boundary and converted into a client-visible `error` event; only
// authentication failures refuse the connection itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("no active session")]
    NoActiveSession,

    #[error("session not found")]
    NotFound,

    #[error("interview already complete; session is frozen for input")]
    SessionFrozen,

    #[error("a message is already being processed for this session")]
    StreamBusy,

    #[error("completion source failure: {0}")]
    CompletionSource(String),

    #[error("session store unavailable: {0}")]
    Store(String),

    #[error("malformed extraction payload: {0}")]
    MalformedExtraction(String),
}

impl ChatError {
    /// Stable machine-readable code carried on wire `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Authentication(_) => "unauthorized",
            ChatError::NoActiveSession => "no_active_session",
            ChatError::NotFound => "session_not_found",
            ChatError::SessionFrozen => "session_frozen",
            ChatError::StreamBusy => "stream_busy",
            ChatError::CompletionSource(_) => "completion_failed",
            ChatError::Store(_) => "store_unavailable",
            ChatError::MalformedExtraction(_) => "malformed_extraction",
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ChatError::NotFound,
            other => ChatError::Store(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Store(format!("session document corrupt: {}", e))
    }
}
