//! Route definitions
//!
//! Chat and conversation routes are served under `/api` and under
//! `/api/v1`, the prefix the PandaLora web client calls.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::handlers::{chat_speech, chat_stream, chat_text, conversation_history, health, new_conversation};
use crate::server::AppState;

/// Upload limit for speech requests
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health))
        .nest("/api", chat_routes())
        .nest("/api/v1", chat_routes())
}

fn chat_routes() -> Router<AppState> {
    Router::new()
        // Chat
        .route("/chat/text", post(chat_text))
        .route(
            "/chat/speech",
            post(chat_speech).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .route("/chat/stream/{conversation_id}", get(chat_stream))
        // Conversations
        .route("/conversation/new", post(new_conversation))
        .route("/conversation/{conversation_id}", get(conversation_history))
}
