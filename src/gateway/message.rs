// src/gateway/message.rs
// Wire protocol for the chat WebSocket. JSON, tagged by `type`, camelCase
// field names throughout.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::session::ChatSession;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsClientMessage {
    /// Open or resume a session for the authenticated user.
    #[serde(rename_all = "camelCase")]
    StartChat {
        #[serde(default)]
        session_id: Option<String>,
    },
    /// One user message into the bound session.
    SendMessage { content: String },
    /// Close the bound session. Idempotent per connection.
    EndChat,
    /// Request a progress snapshot of the bound session.
    SessionInfo,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsServerMessage {
    #[serde(rename_all = "camelCase")]
    ChatResponse {
        session_id: String,
        content: String,
        is_typing: bool,
        is_complete: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<ResponseMetadata>,
    },
    #[serde(rename_all = "camelCase")]
    SessionInfo {
        session_id: String,
        questions_asked: u32,
        total_questions: u32,
        fields_known: u32,
        total_fields: u32,
        interview_complete: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        recommended_destination: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ChatEnded {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error { message: String, code: String },
}

/// Interview-progress payload attached to the final chunk of a turn.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub interview_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_destination: Option<String>,
    pub fields_known: u32,
    pub total_fields: u32,
}

impl WsServerMessage {
    pub fn session_info(session: &ChatSession) -> Self {
        WsServerMessage::SessionInfo {
            session_id: session.session_id.clone(),
            questions_asked: session.questions_asked,
            total_questions: session.total_questions_available,
            fields_known: session.collected_data.fields_known(),
            total_fields: session.total_questions_available,
            interview_complete: session.interview_complete,
            recommended_destination: session.recommended_destination.clone(),
        }
    }

    pub fn error(e: &ChatError) -> Self {
        WsServerMessage::Error {
            message: e.to_string(),
            code: e.code().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_camel_case() {
        let msg: WsClientMessage =
            serde_json::from_str(r#"{"type":"startChat","sessionId":"s1"}"#).unwrap();
        assert!(matches!(
            msg,
            WsClientMessage::StartChat { session_id: Some(ref s) } if s == "s1"
        ));

        let msg: WsClientMessage =
            serde_json::from_str(r#"{"type":"sendMessage","content":"oi"}"#).unwrap();
        assert!(matches!(msg, WsClientMessage::SendMessage { .. }));

        let msg: WsClientMessage = serde_json::from_str(r#"{"type":"endChat"}"#).unwrap();
        assert!(matches!(msg, WsClientMessage::EndChat));
    }

    #[test]
    fn start_chat_session_id_is_optional() {
        let msg: WsClientMessage = serde_json::from_str(r#"{"type":"startChat"}"#).unwrap();
        assert!(matches!(msg, WsClientMessage::StartChat { session_id: None }));
    }

    #[test]
    fn server_messages_serialize_camel_case() {
        let msg = WsServerMessage::ChatResponse {
            session_id: "s1".into(),
            content: "olá".into(),
            is_typing: true,
            is_complete: false,
            metadata: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"chatResponse""#));
        assert!(json.contains(r#""sessionId":"s1""#));
        assert!(json.contains(r#""isTyping":true"#));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn error_events_carry_stable_codes() {
        let msg = WsServerMessage::error(&ChatError::StreamBusy);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""code":"stream_busy""#));
    }
}
