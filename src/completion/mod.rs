// src/completion/mod.rs
// Completion-source abstraction: the controller only ever sees an ordered
// stream of events over a channel, so providers are swappable (including
// scripted ones in tests).

mod openai;
mod sse;

pub use openai::{OpenAiCompletionSource, build_interview_prompt};
pub use sse::{SseDecoder, SseFrame};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChatError;
use crate::session::ChatSession;

/// Events emitted while one assistant turn streams in.
///
/// Ordering guarantee: zero or more `Delta`s, then exactly one terminal
/// event (`Done` or `Error`), after which the sender hangs up.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    Delta(String),
    Done,
    Error(String),
}

/// One message in the transcript handed to the provider.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnMessage {
    pub role: String,
    pub content: String,
}

/// Everything a provider needs for one assistant turn: system prompt plus
/// the conversation so far, already including the latest user message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub system: String,
    pub messages: Vec<TurnMessage>,
}

impl TurnRequest {
    /// Build a turn request from a session, deriving the system prompt from
    /// the profile collected so far.
    pub fn from_session(session: &ChatSession) -> Self {
        let system = build_interview_prompt(&session.collected_data);
        let messages = session
            .messages
            .iter()
            .map(|m| TurnMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();
        Self { system, messages }
    }
}

#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Start streaming one assistant turn. Events arrive on the returned
    /// receiver; the call itself returns as soon as the stream is set up.
    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<CompletionEvent>, ChatError>;
}
