//! Session types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest conversation id accepted from a client
const MAX_ID_LEN: usize = 128;

/// Opaque conversation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Generate a fresh random id (UUIDv4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Accept an id supplied by a client
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("conversation id is empty".to_string()));
        }
        if trimmed.chars().count() > MAX_ID_LEN {
            return Err(Error::InvalidInput(format!(
                "conversation id longer than {} characters",
                MAX_ID_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering a transcript for the model
    pub fn speaker(&self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "PandaLora",
        }
    }
}

/// A message stored in a conversation log. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Position in the conversation, assigned by the store
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub(crate) fn new(role: Role, content: String, sequence: u64) -> Self {
        Self {
            role,
            content,
            sequence,
            created_at: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}
