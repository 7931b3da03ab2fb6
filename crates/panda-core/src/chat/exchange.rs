//! Exchange lifecycle and results

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Error;
use crate::session::ConversationId;

/// How the user's turn arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Speech,
}

/// Outcome of one exchange as seen by a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub response: String,
    pub conversation_id: ConversationId,
    pub input_type: InputType,
    pub processing_time_ms: u64,
}

/// Stages of one user turn → assistant turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Received,
    InputResolved,
    HistoryLoaded,
    UserAppended,
    Generating,
    AssistantAppended,
    Done,
    Errored,
}

impl ExchangeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Done | ExchangeState::Errored)
    }

    /// Whether `next` directly follows `self`
    pub fn can_advance_to(self, next: ExchangeState) -> bool {
        use ExchangeState::*;
        match (self, next) {
            (s, Errored) => !s.is_terminal(),
            (Received, InputResolved)
            | (InputResolved, HistoryLoaded)
            | (HistoryLoaded, UserAppended)
            | (UserAppended, Generating)
            | (Generating, AssistantAppended)
            | (AssistantAppended, Done) => true,
            _ => false,
        }
    }
}

/// Tracks one exchange through its states
#[derive(Debug)]
pub(crate) struct Exchange {
    state: ExchangeState,
    input_type: InputType,
    conversation_id: Option<ConversationId>,
    started: Instant,
}

impl Exchange {
    pub(crate) fn start(input_type: InputType, conversation_id: Option<ConversationId>) -> Self {
        Self {
            state: ExchangeState::Received,
            input_type,
            conversation_id,
            started: Instant::now(),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ExchangeState {
        self.state
    }

    pub(crate) fn input_type(&self) -> InputType {
        self.input_type
    }

    pub(crate) fn bind(&mut self, conversation_id: &ConversationId) {
        self.conversation_id = Some(conversation_id.clone());
    }

    pub(crate) fn advance(&mut self, next: ExchangeState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid exchange transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            "Exchange {:?} -> {:?} (conversation: {})",
            self.state,
            next,
            self.conversation_label()
        );
        self.state = next;
    }

    /// Move to `Errored` and hand the error back for propagation
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        warn!(
            "Exchange failed in state {:?} (conversation: {}): {}",
            self.state,
            self.conversation_label(),
            err
        );
        self.state = ExchangeState::Errored;
        err
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn conversation_label(&self) -> &str {
        self.conversation_id
            .as_ref()
            .map(ConversationId::as_str)
            .unwrap_or("<new>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExchangeState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Received,
            InputResolved,
            HistoryLoaded,
            UserAppended,
            Generating,
            AssistantAppended,
            Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_errored_reachable_from_non_terminal_only() {
        assert!(Received.can_advance_to(Errored));
        assert!(Generating.can_advance_to(Errored));
        assert!(!Done.can_advance_to(Errored));
        assert!(!Errored.can_advance_to(Errored));
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!Received.can_advance_to(UserAppended));
        assert!(!HistoryLoaded.can_advance_to(Generating));
        assert!(!Done.can_advance_to(Received));
    }

    #[test]
    fn test_fail_marks_errored() {
        let mut exchange = Exchange::start(InputType::Speech, None);
        let err = exchange.fail(Error::InvalidAudio("noise".into()));
        assert_eq!(exchange.state(), Errored);
        assert!(matches!(err, Error::InvalidAudio(_)));
    }

    #[test]
    fn test_chat_result_serialization() {
        let result = ChatResult {
            response: "Hi!".to_string(),
            conversation_id: ConversationId::parse("c-1").unwrap(),
            input_type: InputType::Speech,
            processing_time_ms: 42,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["conversation_id"], "c-1");
        assert_eq!(json["input_type"], "speech");
        assert_eq!(json["processing_time_ms"], 42);
    }
}
