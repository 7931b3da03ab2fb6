//! Chat orchestration

mod exchange;
mod service;

pub use exchange::{ChatResult, ExchangeState, InputType};
pub use service::{ChatService, DEFAULT_LANGUAGE, FALLBACK_RESPONSE, NOT_CONFIGURED_RESPONSE};
