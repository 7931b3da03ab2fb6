//! WebSocket message types
//!
//! Defines the JSON message format for WebSocket communication.

use panda_core::{ConversationId, Message, StreamFrame};
use serde::{Deserialize, Serialize};

/// Message from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Send a chat message to the panda
    Chat { message: String },

    /// Request the conversation history
    History,

    /// Ping for keepalive
    Ping,
}

impl ClientMessage {
    /// Decode an incoming text frame
    ///
    /// Anything that is not a JSON `ClientMessage` is taken as the chat text
    /// itself, which is what the browser client sends.
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| ClientMessage::Chat {
            message: text.to_string(),
        })
    }
}

/// Message from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One streamed frame of the assistant reply
    Frame(StreamFrame),

    /// Conversation history
    History {
        conversation_id: ConversationId,
        messages: Vec<Message>,
    },

    /// Error message
    Error { message: String },

    /// Pong response
    Pong,
}
