//! In-memory conversation store
//!
//! One lock per conversation, created lazily and never removed. The id map
//! itself is a `DashMap`, so creating conversations never blocks appends to
//! unrelated ones.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::session::{ConversationId, Message, Role};
use crate::{Error, Result};

/// Default number of messages retained per conversation
pub const DEFAULT_MAX_MESSAGES: usize = 50;

/// Bounded, append-only log for a single conversation
#[derive(Debug, Default)]
struct LogState {
    messages: VecDeque<Message>,
    next_sequence: u64,
}

#[derive(Debug, Default)]
struct ConversationLog {
    state: Mutex<LogState>,
}

impl ConversationLog {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        // Push and pop cannot leave the deque half-updated, so a poisoned
        // lock still guards a consistent log.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Concurrency-safe store of conversation logs
pub struct SessionStore {
    logs: DashMap<ConversationId, Arc<ConversationLog>>,
    max_messages: usize,
    closed: AtomicBool,
}

impl SessionStore {
    /// Create a store with the default per-conversation cap
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MESSAGES)
    }

    /// Create a store keeping at most `max_messages` per conversation
    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            logs: DashMap::new(),
            max_messages: max_messages.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a new, empty conversation
    pub fn create_conversation(&self) -> ConversationId {
        let id = ConversationId::generate();
        self.logs.insert(id.clone(), Arc::new(ConversationLog::default()));
        info!("Created conversation: {}", id);
        id
    }

    /// Snapshot of a conversation's messages, oldest first
    ///
    /// Unknown ids yield an empty history.
    pub fn history(&self, id: &ConversationId) -> Result<Vec<Message>> {
        self.ensure_open()?;

        let Some(log) = self.lookup(id) else {
            return Ok(Vec::new());
        };
        let state = log.lock();
        Ok(state.messages.iter().cloned().collect())
    }

    /// Append a message, assigning the next sequence number
    ///
    /// Appends to the same conversation are serialized; the oldest message is
    /// evicted once the cap is exceeded.
    pub fn append(
        &self,
        id: &ConversationId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Message> {
        self.ensure_open()?;

        let log = self.lookup_or_insert(id);
        let mut state = log.lock();

        state.next_sequence += 1;
        let message = Message::new(role, content.into(), state.next_sequence);
        state.messages.push_back(message.clone());

        if state.messages.len() > self.max_messages {
            let excess = state.messages.len() - self.max_messages;
            state.messages.drain(..excess);
            debug!("Evicted {} old messages from conversation {}", excess, id);
        }

        Ok(message)
    }

    /// Whether the store knows this conversation
    pub fn contains(&self, id: &ConversationId) -> bool {
        self.logs.contains_key(id)
    }

    /// Number of conversations tracked
    pub fn conversation_count(&self) -> usize {
        self.logs.len()
    }

    /// Per-conversation message cap
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Tear the store down; further reads and appends fail with `StoreClosed`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Session store closed ({} conversations)", self.logs.len());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    // The map guard is released before the conversation lock is taken.
    fn lookup(&self, id: &ConversationId) -> Option<Arc<ConversationLog>> {
        self.logs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn lookup_or_insert(&self, id: &ConversationId) -> Arc<ConversationLog> {
        if let Some(log) = self.lookup(id) {
            return log;
        }
        let entry = self.logs.entry(id.clone()).or_default();
        Arc::clone(entry.value())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
