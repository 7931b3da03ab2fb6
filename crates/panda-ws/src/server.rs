//! WebSocket server state and routes

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use panda_core::ChatService;

use crate::handler::websocket_handler;

/// Shared WebSocket server state
#[derive(Clone)]
pub struct WsState {
    pub chat: Arc<ChatService>,
    /// Close a connection after this many failed exchanges in a row (0 = never)
    pub max_consecutive_errors: u32,
    pub(crate) connections: Arc<AtomicUsize>,
}

impl WsState {
    pub fn new(chat: Arc<ChatService>, max_consecutive_errors: u32) -> Self {
        Self {
            chat,
            max_consecutive_errors,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of open WebSocket connections
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Build the WebSocket router
pub fn build_router(state: WsState) -> Router {
    Router::new()
        .route("/ws/chat/{conversation_id}", get(websocket_handler))
        .with_state(state)
}
