// src/config.rs
// All tunables load from the environment (.env supported), with defaults
// suitable for local development.

use once_cell::sync::Lazy;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RumoConfig {
    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Session Configuration
    pub session_ttl_seconds: i64,
    pub session_sweep_interval_seconds: u64,

    // ── WebSocket Settings
    pub ws_receive_timeout: u64,
    pub dedup_window: usize,

    // ── Authentication
    // Comma-separated `token:user_id` pairs; empty means every token is rejected.
    pub auth_tokens: String,

    // ── Completion Provider (OpenAI-compatible chat completions)
    pub completion_base_url: String,
    pub completion_api_key: String,
    pub completion_model: String,
    pub completion_connect_timeout: u64,
    pub completion_stall_timeout: u64,

    // ── Logging
    pub log_level: String,
}

/// Parse an env var, trimming whitespace and inline `#` comments before parsing.
/// Missing or unparseable values fall back to the default.
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl RumoConfig {
    pub fn from_env() -> Self {
        // Load .env first if present; plain env vars still win.
        let _ = dotenvy::dotenv();

        Self {
            host: env_var_or("RUMO_HOST", "0.0.0.0".to_string()),
            port: env_var_or("RUMO_PORT", 3001),
            database_url: env_var_or("DATABASE_URL", "sqlite:./rumo.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 5),
            session_ttl_seconds: env_var_or("RUMO_SESSION_TTL_SECONDS", 86_400),
            session_sweep_interval_seconds: env_var_or("RUMO_SESSION_SWEEP_INTERVAL", 3_600),
            ws_receive_timeout: env_var_or("RUMO_WS_RECEIVE_TIMEOUT", 60),
            dedup_window: env_var_or("RUMO_DEDUP_WINDOW", 32),
            auth_tokens: env_var_or("RUMO_AUTH_TOKENS", String::new()),
            completion_base_url: env_var_or(
                "RUMO_COMPLETION_BASE_URL",
                "https://api.openai.com/v1".to_string(),
            ),
            completion_api_key: env_var_or("RUMO_COMPLETION_API_KEY", String::new()),
            completion_model: env_var_or("RUMO_COMPLETION_MODEL", "gpt-4o-mini".to_string()),
            completion_connect_timeout: env_var_or("RUMO_COMPLETION_CONNECT_TIMEOUT", 10),
            completion_stall_timeout: env_var_or("RUMO_COMPLETION_STALL_TIMEOUT", 30),
            log_level: env_var_or("RUMO_LOG_LEVEL", "info".to_string()),
        }
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full URL for the streaming chat-completions endpoint
    pub fn completion_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.completion_base_url.trim_end_matches('/')
        )
    }
}

// Global config instance - loaded once at startup
pub static CONFIG: Lazy<RumoConfig> = Lazy::new(RumoConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_strips_comments_and_whitespace() {
        unsafe { std::env::set_var("RUMO_TEST_COMMENTED", " 42 # seconds ") };
        let v: i64 = env_var_or("RUMO_TEST_COMMENTED", 0);
        assert_eq!(v, 42);
        unsafe { std::env::remove_var("RUMO_TEST_COMMENTED") };
    }

    #[test]
    fn env_var_or_falls_back_on_garbage() {
        unsafe { std::env::set_var("RUMO_TEST_GARBAGE", "not-a-number") };
        let v: u16 = env_var_or("RUMO_TEST_GARBAGE", 7);
        assert_eq!(v, 7);
        unsafe { std::env::remove_var("RUMO_TEST_GARBAGE") };
    }

    #[test]
    fn completion_url_handles_trailing_slash() {
        let mut config = RumoConfig::from_env();
        config.completion_base_url = "https://example.test/v1/".to_string();
        assert_eq!(
            config.completion_url(),
            "https://example.test/v1/chat/completions"
        );
    }
}
