// src/assembler.rs
// Streaming response assembly: accumulates completion-source deltas into
// the user-visible reply and, only once the stream has finished, looks for
// the structured extraction payload the model appends to its text.
//
// Parsing is strictly two-phase: intermediate chunks are never inspected
// for JSON. A partial buffer can contain what looks like a complete object
// that the next chunk would have extended, so any mid-stream match would
// corrupt the extraction silently.

use serde_json::Value;
use tracing::debug;

use crate::profile::TravelProfile;

/// Accumulates one assistant turn from streamed text fragments.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    buffer: String,
}

/// Result of a finished assistant turn: display text with the payload span
/// removed, plus the parsed extraction when one was present and valid.
#[derive(Debug)]
pub struct AssembledReply {
    pub text: String,
    pub extraction: Option<TravelProfile>,
    /// Set when a payload candidate existed but failed to parse. Non-fatal:
    /// the plain text is still delivered.
    pub extraction_error: Option<String>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns the typing-indicator state: active only
    /// while the buffer is non-empty, so zero-length fragments never flash
    /// an indicator for an empty reply.
    pub fn push(&mut self, delta: &str) -> bool {
        self.buffer.push_str(delta);
        self.is_typing()
    }

    pub fn is_typing(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Consume the assembler once the upstream signaled completion.
    pub fn finish(self) -> AssembledReply {
        let full = self.buffer;

        let Some(first_open) = full.find('{') else {
            return AssembledReply {
                text: full.trim().to_string(),
                extraction: None,
                extraction_error: None,
            };
        };

        match locate_payload(&full, first_open) {
            Ok((start, end, value)) => {
                let mut text = String::with_capacity(full.len());
                text.push_str(&full[..start]);
                text.push_str(&full[end..]);
                let profile = TravelProfile::from_extraction(&value);
                debug!(payload = %value, "extraction payload parsed");
                AssembledReply {
                    text: text.trim().to_string(),
                    extraction: Some(profile),
                    extraction_error: None,
                }
            }
            Err(e) => AssembledReply {
                text: full.trim().to_string(),
                extraction: None,
                extraction_error: Some(e),
            },
        }
    }
}

/// Find the extraction payload span in the completed text.
///
/// First try the greedy outermost span (first `{` through last `}`). When
/// surrounding prose breaks that parse, fall back to balanced spans and
/// keep the last one that parses as an object, which is the trailing
/// payload position the prompt asks for.
fn locate_payload(full: &str, first_open: usize) -> Result<(usize, usize, Value), String> {
    let last_close = full
        .rfind('}')
        .filter(|close| *close > first_open)
        .ok_or_else(|| "unterminated object in reply".to_string())?;

    let greedy = &full[first_open..=last_close];
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(greedy) {
        return Ok((first_open, last_close + 1, value));
    }

    let mut best: Option<(usize, usize, Value)> = None;
    for (start, _) in full.match_indices('{') {
        if let Some(end) = balanced_span_end(&full[start..]) {
            let candidate = &full[start..start + end];
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                best = Some((start, start + end, value));
            }
        }
    }

    best.ok_or_else(|| "no parseable object in reply".to_string())
}

/// Byte length of the brace-balanced span starting at a `{`, honoring JSON
/// string literals and escapes. None when the text ends unbalanced.
fn balanced_span_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_has_no_extraction() {
        let mut assembler = ResponseAssembler::new();
        assembler.push("Legal! De onde você estaria saindo?");
        let reply = assembler.finish();
        assert_eq!(reply.text, "Legal! De onde você estaria saindo?");
        assert!(reply.extraction.is_none());
        assert!(reply.extraction_error.is_none());
    }

    #[test]
    fn typing_indicator_suppressed_on_empty_buffer() {
        let mut assembler = ResponseAssembler::new();
        assert!(!assembler.push(""));
        assert!(!assembler.is_typing());
        assert!(assembler.push("Oi"));
        assert!(assembler.is_typing());
    }

    #[test]
    fn trailing_payload_is_extracted_and_stripped() {
        let mut assembler = ResponseAssembler::new();
        assembler.push("Anotei! Saindo de São Paulo.\n");
        assembler.push(r#"{"origin_name": "São Paulo", "origin_iata": "GRU", "budget_in_brl": 300000}"#);
        let reply = assembler.finish();
        assert_eq!(reply.text, "Anotei! Saindo de São Paulo.");
        let profile = reply.extraction.expect("payload should parse");
        assert_eq!(profile.origin_iata.as_deref(), Some("GRU"));
        assert_eq!(profile.budget_in_brl, Some(300_000));
    }

    #[test]
    fn payload_split_across_many_fragments() {
        let mut assembler = ResponseAssembler::new();
        let full = r#"Perfeito! {"activities": ["trilhas"], "purpose": "lazer"}"#;
        for ch in full.chars() {
            assembler.push(&ch.to_string());
        }
        let reply = assembler.finish();
        assert_eq!(reply.text, "Perfeito!");
        let profile = reply.extraction.unwrap();
        assert!(profile.activities.contains("trilhas"));
        assert_eq!(profile.purpose.as_deref(), Some("lazer"));
    }

    #[test]
    fn braces_inside_strings_do_not_break_the_span() {
        let mut assembler = ResponseAssembler::new();
        assembler.push(r#"Ok. {"purpose": "lazer", "origin_name": "a } b"}"#);
        let reply = assembler.finish();
        let profile = reply.extraction.unwrap();
        assert_eq!(profile.origin_name.as_deref(), Some("a } b"));
    }

    #[test]
    fn last_object_wins_when_prose_separates_candidates() {
        let mut assembler = ResponseAssembler::new();
        assembler.push(r#"{"purpose": "negócios"} hmm, melhor: {"purpose": "lazer"}"#);
        let reply = assembler.finish();
        let profile = reply.extraction.unwrap();
        assert_eq!(profile.purpose.as_deref(), Some("lazer"));
    }

    #[test]
    fn malformed_payload_is_nonfatal() {
        let mut assembler = ResponseAssembler::new();
        assembler.push("Entendi. {\"budget_in_brl\": ");
        let reply = assembler.finish();
        assert!(reply.extraction.is_none());
        assert!(reply.extraction_error.is_some());
        assert!(reply.text.starts_with("Entendi."));
    }

    #[test]
    fn buffer_grows_append_only() {
        let mut assembler = ResponseAssembler::new();
        assembler.push("abc");
        assembler.push("def");
        assert_eq!(assembler.text(), "abcdef");
    }
}
