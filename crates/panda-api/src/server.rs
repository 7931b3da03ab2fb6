//! HTTP API state and router assembly

use axum::Router;
use std::sync::Arc;

use panda_core::ChatService;

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    /// Language assumed for speech uploads without a `language` field
    pub default_language: String,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, default_language: impl Into<String>) -> Self {
        Self {
            chat,
            default_language: default_language.into(),
        }
    }
}

/// Build the HTTP API router
///
/// Middleware (CORS, tracing) is applied by the binary once the API and
/// WebSocket routers are merged.
pub fn build_router(state: AppState) -> Router {
    routes().with_state(state)
}
