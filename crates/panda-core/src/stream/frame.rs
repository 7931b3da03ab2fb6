//! Stream frame type
//!
//! Field names on the wire match the chunk format clients already consume:
//! `{"chunk": ..., "is_complete": ..., "conversation_id": ...}`.

use serde::{Deserialize, Serialize};

use crate::session::ConversationId;

/// One unit of streamed output delivered to a transport consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFrame {
    #[serde(rename = "chunk")]
    pub payload: String,
    #[serde(rename = "is_complete")]
    pub is_final: bool,
    /// Set only on the terminal frame of a failed generation
    #[serde(rename = "error", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    pub conversation_id: ConversationId,
}

impl StreamFrame {
    /// Intermediate frame carrying a chunk of text
    pub fn chunk(conversation_id: ConversationId, payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            is_final: false,
            is_error: false,
            conversation_id,
        }
    }

    /// Terminal frame of a successful stream
    pub fn done(conversation_id: ConversationId) -> Self {
        Self {
            payload: String::new(),
            is_final: true,
            is_error: false,
            conversation_id,
        }
    }

    /// Terminal frame of a failed stream
    pub fn error(conversation_id: ConversationId, message: impl Into<String>) -> Self {
        Self {
            payload: message.into(),
            is_final: true,
            is_error: true,
            conversation_id,
        }
    }
}
