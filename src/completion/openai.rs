// src/completion/openai.rs
// Streaming client for any OpenAI-compatible chat-completions endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::sse::SseDecoder;
use super::{CompletionEvent, CompletionSource, TurnRequest};
use crate::config::CONFIG;
use crate::error::ChatError;
use crate::profile::TravelProfile;

pub struct OpenAiCompletionSource {
    client: HttpClient,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompletionSource {
    pub fn new(url: String, api_key: String, model: String, connect_timeout: u64) -> Self {
        let client = HttpClient::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self {
            client,
            url,
            api_key,
            model,
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            CONFIG.completion_url(),
            CONFIG.completion_api_key.clone(),
            CONFIG.completion_model.clone(),
            CONFIG.completion_connect_timeout,
        )
    }

    fn build_messages(request: &TurnRequest) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: "system".into(),
            content: request.system.clone(),
        });
        for msg in &request.messages {
            messages.push(WireMessage {
                role: msg.role.clone(),
                content: msg.content.clone(),
            });
        }
        messages
    }

    /// Drain the SSE body into completion events. Always ends with exactly
    /// one terminal event.
    async fn process_sse_stream(response: reqwest::Response, tx: mpsc::Sender<CompletionEvent>) {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut saw_done = false;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(CompletionEvent::Error(e.to_string())).await;
                    return;
                }
            };

            for frame in decoder.push(&chunk) {
                if frame.is_done() {
                    saw_done = true;
                    continue;
                }
                let Some(parsed) = frame.try_parse::<StreamChunk>() else {
                    continue;
                };
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            let _ = tx.send(CompletionEvent::Delta(content)).await;
                        }
                    }
                }
            }
        }

        if saw_done {
            let _ = tx.send(CompletionEvent::Done).await;
        } else {
            // Connection closed without the [DONE] sentinel: the reply may
            // be truncated, so report it as a failure.
            let _ = tx
                .send(CompletionEvent::Error(
                    "stream ended without completion sentinel".into(),
                ))
                .await;
        }
    }
}

#[async_trait]
impl CompletionSource for OpenAiCompletionSource {
    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<CompletionEvent>, ChatError> {
        let body = CompletionsRequest {
            model: self.model.clone(),
            messages: Self::build_messages(&request),
            stream: true,
            temperature: 0.7,
        };

        debug!(model = %self.model, messages = body.messages.len(), "starting completion turn");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::CompletionSource(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(%status, "completion endpoint rejected request");
            return Err(ChatError::CompletionSource(format!(
                "upstream returned {status}: {detail}"
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(Self::process_sse_stream(response, tx));
        Ok(rx)
    }
}

/// System prompt for the travel interview. Instructs the model to converse
/// in Portuguese and to append, after its visible reply, a JSON object with
/// whatever profile fields the latest exchange established.
pub fn build_interview_prompt(profile: &TravelProfile) -> String {
    let known = serde_json::to_string(profile).unwrap_or_else(|_| "{}".into());
    let missing = profile.missing_fields();

    let mut prompt = String::from(
        "Você é um assistente de viagens brasileiro, simpático e objetivo. \
         Sua missão é entrevistar o usuário para montar o perfil da viagem \
         dele, fazendo UMA pergunta por vez.\n\n\
         Campos do perfil:\n\
         - origin_name: cidade de origem (texto livre)\n\
         - origin_iata: código IATA do aeroporto de origem mais próximo\n\
         - budget_in_brl: orçamento total em centavos de real (inteiro)\n\
         - activities: lista de atividades desejadas (praia, trilhas, cultura...)\n\
         - purpose: motivo da viagem (lazer, negócios, família...)\n\n",
    );

    prompt.push_str(&format!("Perfil coletado até agora: {known}\n"));
    if missing.is_empty() {
        prompt.push_str(
            "Todos os campos foram coletados. Agradeça e avise que a \
             recomendação está pronta.\n",
        );
    } else {
        prompt.push_str(&format!(
            "Campos ainda faltando: {}. Pergunte sobre o próximo campo faltante.\n",
            missing.join(", ")
        ));
    }

    prompt.push_str(
        "\nRegras de saída:\n\
         1. Responda em português, em tom de conversa.\n\
         2. Ao FINAL da resposta, anexe um objeto JSON contendo somente os \
         campos do perfil que esta troca de mensagens estabeleceu (pode ser \
         vazio: {}). O JSON deve ser a última coisa na resposta.\n\
         3. Nunca invente valores que o usuário não informou.\n\
         4. Converta orçamentos informados em reais para centavos.",
    );

    prompt
}

// Wire types for the chat-completions API.

#[derive(Serialize)]
struct CompletionsRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::TurnMessage;

    #[test]
    fn prompt_lists_missing_fields() {
        let profile = TravelProfile {
            origin_iata: Some("GRU".into()),
            ..Default::default()
        };
        let prompt = build_interview_prompt(&profile);
        assert!(prompt.contains("GRU"));
        assert!(prompt.contains("budget_in_brl"));
        assert!(!prompt.contains("Todos os campos foram coletados"));
    }

    #[test]
    fn prompt_announces_completion_when_nothing_missing() {
        let mut profile = TravelProfile::default();
        profile.origin_name = Some("São Paulo".into());
        profile.origin_iata = Some("GRU".into());
        profile.budget_in_brl = Some(500_000);
        profile.activities.insert("praia".into());
        profile.purpose = Some("lazer".into());
        let prompt = build_interview_prompt(&profile);
        assert!(prompt.contains("Todos os campos foram coletados"));
    }

    #[test]
    fn build_messages_prepends_system() {
        let request = TurnRequest {
            system: "seja breve".into(),
            messages: vec![TurnMessage {
                role: "user".into(),
                content: "oi".into(),
            }],
        };
        let wire = OpenAiCompletionSource::build_messages(&request);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].content, "oi");
    }
}
