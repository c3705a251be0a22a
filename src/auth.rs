// src/auth.rs
// Token authentication for the WebSocket gateway. Tokens map to user ids
// through a static table loaded from the environment; an empty table means
// nobody gets in.

use std::collections::HashMap;

use crate::error::ChatError;

pub trait TokenAuthenticator: Send + Sync {
    /// Resolve a bearer token to a user id, or fail with `Authentication`.
    fn authenticate(&self, token: &str) -> Result<String, ChatError>;
}

/// Authenticator backed by a `token:user_id,token:user_id` table, the shape
/// `RUMO_AUTH_TOKENS` carries.
pub struct EnvTokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl EnvTokenAuthenticator {
    pub fn from_spec(spec: &str) -> Self {
        let mut tokens = HashMap::new();
        for pair in spec.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once(':') {
                Some((token, user_id)) if !token.is_empty() && !user_id.is_empty() => {
                    tokens.insert(token.to_string(), user_id.trim().to_string());
                }
                _ => {
                    tracing::warn!("ignoring malformed auth token entry");
                }
            }
        }
        Self { tokens }
    }
}

impl TokenAuthenticator for EnvTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Result<String, ChatError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ChatError::Authentication("invalid token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_tokens() {
        let auth = EnvTokenAuthenticator::from_spec("abc:u1, def:u2");
        assert_eq!(auth.authenticate("abc").unwrap(), "u1");
        assert_eq!(auth.authenticate("def").unwrap(), "u2");
    }

    #[test]
    fn rejects_unknown_token() {
        let auth = EnvTokenAuthenticator::from_spec("abc:u1");
        assert!(matches!(
            auth.authenticate("nope"),
            Err(ChatError::Authentication(_))
        ));
    }

    #[test]
    fn empty_spec_rejects_everything() {
        let auth = EnvTokenAuthenticator::from_spec("");
        assert!(auth.authenticate("abc").is_err());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let auth = EnvTokenAuthenticator::from_spec("abc:u1,broken,:x,y:");
        assert_eq!(auth.authenticate("abc").unwrap(), "u1");
        assert!(auth.authenticate("broken").is_err());
    }
}
