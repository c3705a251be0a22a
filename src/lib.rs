// src/lib.rs

pub mod assembler;
pub mod auth;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod profile;
pub mod session;
pub mod store;

pub use assembler::{AssembledReply, ResponseAssembler};
pub use auth::{EnvTokenAuthenticator, TokenAuthenticator};
pub use completion::{CompletionEvent, CompletionSource, OpenAiCompletionSource, TurnRequest};
pub use config::{CONFIG, RumoConfig};
pub use controller::ChatController;
pub use error::ChatError;
pub use gateway::{AppState, router};
pub use profile::{TravelProfile, merge, recommend_destination};
pub use session::{ChatMessage, ChatSession, MessageRole};
pub use store::{SessionStore, SqliteSessionStore};
