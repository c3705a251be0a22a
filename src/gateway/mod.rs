// src/gateway/mod.rs
// WebSocket transport: authenticates the upgrade, binds one session per
// connection, and shuttles wire messages between the socket and the
// controller.

pub mod message;

use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        ConnectInfo, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::auth::TokenAuthenticator;
use crate::config::CONFIG;
use crate::controller::ChatController;
use crate::error::ChatError;
use message::{WsClientMessage, WsServerMessage};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ChatController>,
    pub auth: Arc<dyn TokenAuthenticator>,
}

pub fn router(state: AppState) -> Router {
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    Router::new()
        .route("/ws/chat", get(ws_chat_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn status_handler() -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "service": "rumo",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Authenticate before upgrading. Browsers cannot set headers on a
/// WebSocket handshake, so the token rides a query parameter.
async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let token = params.get("token").map(String::as_str).unwrap_or("");
    match state.auth.authenticate(token) {
        Ok(user_id) => {
            info!(%addr, user_id = %user_id, "websocket connection accepted");
            ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
        }
        Err(_) => {
            warn!(%addr, "websocket upgrade rejected: invalid token");
            (StatusCode::UNAUTHORIZED, "invalid token").into_response()
        }
    }
}

/// Sliding window over recently sent completed messages. Retried turns can
/// produce byte-identical final chunks; the window keeps them off the wire.
struct DedupWindow {
    seen: VecDeque<u64>,
    capacity: usize,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        Self {
            seen: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Only fully-assembled chat responses are eligible: streaming chunks,
    /// progress snapshots and idempotent `chatEnded` resends must always go
    /// through. Dedup key is `(role, trimmed content)`, so a retried turn
    /// with identical text is suppressed even if metadata differs.
    fn should_send(&mut self, msg: &WsServerMessage) -> bool {
        let content = match msg {
            WsServerMessage::ChatResponse {
                is_complete: true,
                content,
                ..
            } => content,
            _ => return true,
        };
        if self.capacity == 0 {
            return true;
        }

        let mut hasher = DefaultHasher::new();
        ("assistant", content.trim()).hash(&mut hasher);
        let digest = hasher.finish();

        if self.seen.contains(&digest) {
            return false;
        }
        if self.seen.len() == self.capacity {
            self.seen.pop_front();
        }
        self.seen.push_back(digest);
        true
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (sink, mut receiver) = socket.split();
    let sink = Arc::new(Mutex::new(sink));

    // Outbound path: controller events are serialized and forwarded here,
    // decoupled from inbound processing.
    let (tx, mut rx) = mpsc::channel::<WsServerMessage>(64);
    let out_sink = sink.clone();
    let forwarder = tokio::spawn(async move {
        let mut dedup = DedupWindow::new(CONFIG.dedup_window);
        while let Some(msg) = rx.recv().await {
            if !dedup.should_send(&msg) {
                debug!("suppressing duplicate completed response");
                continue;
            }
            let payload = match serde_json::to_string(&msg) {
                Ok(p) => p,
                Err(e) => {
                    warn!("failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if out_sink
                .lock()
                .await
                .send(Message::Text(payload.into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut conn = ConnectionState::default();
    let receive_timeout = Duration::from_secs(CONFIG.ws_receive_timeout);

    loop {
        let frame = match tokio::time::timeout(receive_timeout, receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                debug!("websocket receive error: {}", e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                // Idle: probe the client, drop the connection if the probe
                // cannot be written.
                if sink
                    .lock()
                    .await
                    .send(Message::Ping(Vec::new().into()))
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        match frame {
            Message::Text(text) => {
                process_text_frame(&text, &state, &user_id, &mut conn, &tx).await;
            }
            Message::Ping(data) => {
                let _ = sink.lock().await.send(Message::Pong(data)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    let _ = forwarder.await;
    state.controller.cleanup_locks().await;
    info!(user_id = %user_id, "websocket connection closed");
}

/// Per-connection session binding. `ended` remembers the last session this
/// connection closed so repeated `endChat` stays idempotent.
#[derive(Default)]
struct ConnectionState {
    bound: Option<String>,
    ended: Option<String>,
}

async fn process_text_frame(
    text: &str,
    state: &AppState,
    user_id: &str,
    conn: &mut ConnectionState,
    tx: &mpsc::Sender<WsServerMessage>,
) {
    let msg: WsClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let _ = tx
                .send(WsServerMessage::Error {
                    message: format!("unrecognized message: {}", e),
                    code: "bad_request".into(),
                })
                .await;
            return;
        }
    };

    let result = match msg {
        WsClientMessage::StartChat { session_id } => {
            match state
                .controller
                .start_chat(user_id, session_id.as_deref(), tx)
                .await
            {
                Ok(bound_id) => {
                    conn.bound = Some(bound_id);
                    conn.ended = None;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        WsClientMessage::SendMessage { content } => match &conn.bound {
            Some(session_id) => {
                state
                    .controller
                    .send_message(session_id, user_id, &content, tx)
                    .await
            }
            None => Err(ChatError::NoActiveSession),
        },
        WsClientMessage::EndChat => match conn.bound.take() {
            Some(session_id) => {
                let result = state.controller.end_chat(&session_id, user_id, tx).await;
                if result.is_ok() {
                    conn.ended = Some(session_id);
                } else {
                    conn.bound = Some(session_id);
                }
                result
            }
            None => match &conn.ended {
                // Repeating endChat on an already-closed session is fine.
                Some(session_id) => {
                    let _ = tx
                        .send(WsServerMessage::ChatEnded {
                            session_id: session_id.clone(),
                            message: Some(crate::controller::FAREWELL.to_string()),
                        })
                        .await;
                    Ok(())
                }
                None => Err(ChatError::NoActiveSession),
            },
        },
        WsClientMessage::SessionInfo => match &conn.bound {
            Some(session_id) => state.controller.session_info(session_id, user_id, tx).await,
            None => Err(ChatError::NoActiveSession),
        },
    };

    if let Err(e) = result {
        debug!(user_id = %user_id, error = %e, "request failed");
        let _ = tx.send(WsServerMessage::error(&e)).await;
    }
}
