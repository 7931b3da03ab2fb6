//! panda-api: HTTP API for the PandaLora gateway
//!
//! REST endpoints for text and speech chat, server-sent event streaming and
//! conversation history. Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, build_router};
