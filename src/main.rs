// src/main.rs

use std::str::FromStr;
use std::sync::Arc;
use std::net::SocketAddr;
use std::time::Duration;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rumo::completion::OpenAiCompletionSource;
use rumo::config::CONFIG;
use rumo::controller::ChatController;
use rumo::gateway::{self, AppState};
use rumo::store::{SessionStore, SqliteSessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let level = Level::from_str(&CONFIG.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Rumo travel chat backend");
    info!("Completion model: {}", CONFIG.completion_model);

    if CONFIG.auth_tokens.is_empty() {
        warn!("RUMO_AUTH_TOKENS is empty; every connection will be rejected");
    }

    // Database pool; the sqlite file is created on first run
    let connect_options = SqliteConnectOptions::from_str(&CONFIG.database_url)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(CONFIG.sqlite_max_connections)
        .connect_with(connect_options)
        .await?;
    SqliteSessionStore::init_schema(&pool).await?;

    let store: Arc<dyn SessionStore> =
        Arc::new(SqliteSessionStore::new(pool, CONFIG.session_ttl_seconds));
    let source = Arc::new(OpenAiCompletionSource::from_config());
    let controller = Arc::new(ChatController::new(
        store.clone(),
        source,
        Duration::from_secs(CONFIG.completion_stall_timeout),
    ));

    let state = AppState {
        controller,
        auth: Arc::new(rumo::auth::EnvTokenAuthenticator::from_spec(
            &CONFIG.auth_tokens,
        )),
    };

    // Periodic reaper for expired session rows
    let sweep_store = store.clone();
    let sweep_interval = Duration::from_secs(CONFIG.session_sweep_interval_seconds);
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // first tick fires immediately, skip it
        loop {
            ticker.tick().await;
            match sweep_store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!("purged {} expired sessions", n),
                Err(e) => warn!("session sweep failed: {}", e),
            }
        }
    });
    info!(
        "Session sweeper started - running every {} seconds",
        sweep_interval.as_secs()
    );

    let app = gateway::router(state);

    let bind_address = CONFIG.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("WebSocket server listening on ws://{}/ws/chat", bind_address);

    let server_future = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = server_future => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = sweeper => {
            error!("Session sweeper unexpectedly terminated");
        }
    }

    Ok(())
}
