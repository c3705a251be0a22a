// src/completion/sse.rs
// Minimal SSE decoder for OpenAI-style chat completion streams. Buffers
// partial chunks and yields complete `data:` frames; the buffer is bounded
// so a malformed stream cannot grow it without limit.

use serde::de::DeserializeOwned;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes and extract complete frames. Incomplete data
    /// stays buffered for the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            tracing::warn!("SSE buffer exceeded limit, dropping oldest half");
            let keep_from = self.buffer.len() - (Self::MAX_BUFFER_SIZE / 2);
            self.buffer = self.buffer[keep_from..].to_string();
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }
            if let Some(data) = line.strip_prefix("data: ") {
                frames.push(SseFrame {
                    data: data.to_string(),
                });
            }
        }
        frames
    }

    #[cfg(test)]
    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }

    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// One complete `data:` line, prefix stripped.
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub data: String,
}

impl SseFrame {
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    pub fn try_parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.data).ok()
    }
}
