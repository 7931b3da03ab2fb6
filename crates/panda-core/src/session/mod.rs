//! Session management module
//!
//! Conversation history lives in memory for the lifetime of the process.

mod store;
mod types;

pub use store::{DEFAULT_MAX_MESSAGES, SessionStore};
pub use types::{ConversationId, Message, Role};
