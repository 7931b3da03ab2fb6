//! panda-ws: WebSocket gateway for PandaLora
//!
//! Real-time chat over a WebSocket per conversation. Replies stream back
//! as frames while they are generated.

pub mod error;
pub mod handler;
pub mod message;
pub mod server;

pub use error::{Result, WsError};
pub use handler::websocket_handler;
pub use message::{ClientMessage, ServerMessage};
pub use server::{WsState, build_router};
