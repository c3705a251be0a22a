// src/session.rs
// Chat session document: the single unit of persisted conversation state.
//
// Messages are append-only and deduplicated at write time; the profile is
// frozen once the interview completes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::{TOTAL_REQUIRED_FIELDS, TravelProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
}

/// One conversation instance, serialized as a single JSON document in the
/// session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    pub collected_data: TravelProfile,
    // Interview-efficiency counters: advisory only, never correctness-critical.
    pub current_question_index: u32,
    pub questions_asked: u32,
    pub total_questions_available: u32,
    pub interview_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_destination: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatSession {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            messages: Vec::new(),
            collected_data: TravelProfile::default(),
            current_question_index: 0,
            questions_asked: 0,
            total_questions_available: TOTAL_REQUIRED_FIELDS,
            interview_complete: false,
            recommended_destination: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp();
    }

    /// Append a message, skipping consecutive duplicates with identical
    /// `(role, trimmed content)`. Returns whether the message was stored.
    pub fn push_message(&mut self, role: MessageRole, content: &str) -> bool {
        let trimmed = content.trim();
        if let Some(last) = self.messages.last() {
            if last.role == role && last.content.trim() == trimmed {
                return false;
            }
        }
        self.messages.push(ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        self.touch();
        true
    }

    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    /// Flip `interview_complete` and record the recommendation. Monotonic:
    /// once complete, later calls are no-ops and the profile stays frozen.
    pub fn mark_complete(&mut self, destination: String) {
        if self.interview_complete {
            return;
        }
        self.interview_complete = true;
        self.recommended_destination = Some(destination);
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_message_dedups_consecutive_duplicates() {
        let mut session = ChatSession::new("u1");
        assert!(session.push_message(MessageRole::User, "oi"));
        assert!(!session.push_message(MessageRole::User, "  oi  "));
        assert_eq!(session.messages.len(), 1);
    }

    #[test]
    fn push_message_allows_same_content_different_role() {
        let mut session = ChatSession::new("u1");
        assert!(session.push_message(MessageRole::User, "oi"));
        assert!(session.push_message(MessageRole::Assistant, "oi"));
        assert_eq!(session.messages.len(), 2);
    }

    #[test]
    fn push_message_allows_nonconsecutive_repeat() {
        let mut session = ChatSession::new("u1");
        assert!(session.push_message(MessageRole::User, "oi"));
        assert!(session.push_message(MessageRole::Assistant, "olá!"));
        assert!(session.push_message(MessageRole::User, "oi"));
        assert_eq!(session.messages.len(), 3);
    }

    #[test]
    fn mark_complete_is_monotonic() {
        let mut session = ChatSession::new("u1");
        session.mark_complete("Maragogi".into());
        assert!(session.interview_complete);
        session.mark_complete("Gramado".into());
        assert_eq!(session.recommended_destination.as_deref(), Some("Maragogi"));
    }

    #[test]
    fn session_document_round_trips() {
        let mut session = ChatSession::new("u1");
        session.push_message(MessageRole::User, "quero viajar");
        let doc = serde_json::to_string(&session).unwrap();
        assert!(doc.contains("\"sessionId\""));
        let back: ChatSession = serde_json::from_str(&doc).unwrap();
        assert_eq!(back.session_id, session.session_id);
        assert_eq!(back.messages.len(), 1);
    }
}
