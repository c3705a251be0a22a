// src/controller.rs
// Session controller: owns the lifecycle of a chat turn from client intent
// to persisted session state. Emits wire messages over a channel so the
// gateway stays a thin transport layer.
//
// Concurrency rule: at most one in-flight turn per session. The per-session
// mutex is try-acquired; a second send while streaming is rejected rather
// than queued, so a slow upstream can never build a backlog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{info, warn};

use crate::assembler::ResponseAssembler;
use crate::completion::{CompletionEvent, CompletionSource, TurnRequest};
use crate::error::ChatError;
use crate::gateway::message::{ResponseMetadata, WsServerMessage};
use crate::profile::{merge, recommend_destination};
use crate::session::{ChatSession, MessageRole};
use crate::store::SessionStore;

/// Opening assistant message for a brand-new session.
const GREETING: &str = "Oi! Eu sou seu assistente de viagens. Vou te fazer \
algumas perguntas rápidas para montar o perfil da sua viagem e recomendar \
um destino no Brasil. Para começar: de qual cidade você estaria saindo?";

/// Closing message, also used for idempotent `endChat` replays.
pub const FAREWELL: &str = "Conversa encerrada. Até a próxima viagem!";

/// Per-session lock map. Locks are created on demand and cleaned up when
/// nothing else holds them.
pub struct SessionLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(session_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn cleanup_unused(&self) {
        let mut locks = self.locks.write().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChatController {
    store: Arc<dyn SessionStore>,
    source: Arc<dyn CompletionSource>,
    locks: SessionLocks,
    stall_timeout: Duration,
}

impl ChatController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        source: Arc<dyn CompletionSource>,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            locks: SessionLocks::new(),
            stall_timeout,
        }
    }

    /// Open or resume a session. Fresh sessions get the greeting as their
    /// first assistant message; resumed sessions just get a progress
    /// snapshot. Returns the session id for the gateway to bind.
    pub async fn start_chat(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        tx: &mpsc::Sender<WsServerMessage>,
    ) -> Result<String, ChatError> {
        let mut session = self.store.create(user_id, session_id).await?;

        if session.messages.is_empty() {
            session.push_message(MessageRole::Assistant, GREETING);
            session.questions_asked = 1;
            self.store.save(&session).await?;
            info!(session_id = %session.session_id, "new chat session started");

            let _ = tx
                .send(WsServerMessage::ChatResponse {
                    session_id: session.session_id.clone(),
                    content: GREETING.to_string(),
                    is_typing: false,
                    is_complete: true,
                    metadata: None,
                })
                .await;
        } else {
            info!(session_id = %session.session_id, "chat session resumed");
            // Replay the last assistant turn so the client can re-render
            // where the conversation left off.
            if let Some(last) = session.last_assistant_message() {
                let _ = tx
                    .send(WsServerMessage::ChatResponse {
                        session_id: session.session_id.clone(),
                        content: last.content.clone(),
                        is_typing: false,
                        is_complete: true,
                        metadata: None,
                    })
                    .await;
            }
        }

        let _ = tx.send(WsServerMessage::session_info(&session)).await;
        Ok(session.session_id)
    }

    /// Process one user message: persist it, stream the assistant reply,
    /// then fold the extraction into the profile and run the readiness gate.
    ///
    /// On upstream failure the user message stays persisted but no partial
    /// assistant text is; the caller surfaces the error as one wire event.
    pub async fn send_message(
        &self,
        session_id: &str,
        user_id: &str,
        content: &str,
        tx: &mpsc::Sender<WsServerMessage>,
    ) -> Result<(), ChatError> {
        let lock = self.locks.get_lock(session_id).await;
        let _guard = lock.try_lock().map_err(|_| ChatError::StreamBusy)?;

        let mut session = self.load_owned(session_id, user_id).await?;
        if session.interview_complete {
            return Err(ChatError::SessionFrozen);
        }

        // The user message is durable before the upstream is touched.
        session.push_message(MessageRole::User, content);
        self.store.save(&session).await?;

        let request = TurnRequest::from_session(&session);
        let mut rx = self.source.stream_turn(request).await?;

        let mut assembler = ResponseAssembler::new();
        loop {
            let event = tokio::time::timeout(self.stall_timeout, rx.recv())
                .await
                .map_err(|_| {
                    warn!(session_id = %session_id, "completion stream stalled");
                    ChatError::CompletionSource("completion stream stalled".into())
                })?;

            match event {
                Some(CompletionEvent::Delta(delta)) => {
                    let typing = assembler.push(&delta);
                    // Forwarding is best-effort; a gone client never blocks
                    // the turn from finishing and persisting.
                    let _ = tx
                        .send(WsServerMessage::ChatResponse {
                            session_id: session.session_id.clone(),
                            content: delta,
                            is_typing: typing,
                            is_complete: false,
                            metadata: None,
                        })
                        .await;
                }
                Some(CompletionEvent::Done) => break,
                Some(CompletionEvent::Error(e)) => {
                    return Err(ChatError::CompletionSource(e));
                }
                None => {
                    return Err(ChatError::CompletionSource(
                        "completion stream closed early".into(),
                    ));
                }
            }
        }

        let reply = assembler.finish();
        if let Some(detail) = &reply.extraction_error {
            // Non-fatal: the reply still stands, the profile just does not
            // advance this turn.
            warn!(session_id = %session_id, detail = %detail, "extraction payload malformed");
        }

        session.push_message(MessageRole::Assistant, &reply.text);

        if let Some(extraction) = &reply.extraction {
            session.collected_data = merge(&session.collected_data, extraction);
        }
        session.current_question_index = session.collected_data.fields_known();

        if session.collected_data.is_ready_for_recommendation() {
            let destination = recommend_destination(&session.collected_data);
            info!(session_id = %session_id, destination = %destination, "interview complete");
            session.mark_complete(destination);
        } else {
            session.questions_asked += 1;
        }

        self.store.save(&session).await?;

        let _ = tx
            .send(WsServerMessage::ChatResponse {
                session_id: session.session_id.clone(),
                content: reply.text,
                is_typing: false,
                is_complete: true,
                metadata: Some(ResponseMetadata {
                    interview_complete: session.interview_complete,
                    recommended_destination: session.recommended_destination.clone(),
                    fields_known: session.collected_data.fields_known(),
                    total_fields: session.total_questions_available,
                }),
            })
            .await;

        Ok(())
    }

    /// Close a session. The document is kept (the TTL sweeper reaps it
    /// later), so a later `startChat` with the same id can still resume.
    pub async fn end_chat(
        &self,
        session_id: &str,
        user_id: &str,
        tx: &mpsc::Sender<WsServerMessage>,
    ) -> Result<(), ChatError> {
        let mut session = self.load_owned(session_id, user_id).await?;
        session.touch();
        self.store.save(&session).await?;
        info!(session_id = %session_id, "chat session ended");

        let _ = tx
            .send(WsServerMessage::ChatEnded {
                session_id: session.session_id,
                message: Some(FAREWELL.to_string()),
            })
            .await;
        Ok(())
    }

    pub async fn session_info(
        &self,
        session_id: &str,
        user_id: &str,
        tx: &mpsc::Sender<WsServerMessage>,
    ) -> Result<(), ChatError> {
        let session = self.load_owned(session_id, user_id).await?;
        let _ = tx.send(WsServerMessage::session_info(&session)).await;
        Ok(())
    }

    pub async fn cleanup_locks(&self) {
        self.locks.cleanup_unused().await;
    }

    /// Fetch a session and verify ownership. A live session belonging to a
    /// different user reads as `NotFound` rather than leaking its existence.
    async fn load_owned(&self, session_id: &str, user_id: &str) -> Result<ChatSession, ChatError> {
        let session = self.store.get(session_id).await?;
        if session.user_id != user_id {
            return Err(ChatError::NotFound);
        }
        Ok(session)
    }
}
