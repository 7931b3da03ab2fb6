//! Error types for panda-ws

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// WebSocket error type
#[derive(Error, Debug)]
pub enum WsError {
    #[error("Invalid conversation id: {0}")]
    InvalidConversation(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl IntoResponse for WsError {
    fn into_response(self) -> Response {
        let status = match self {
            WsError::InvalidConversation(_) => StatusCode::BAD_REQUEST,
            WsError::ChannelSend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Result type alias for panda-ws
pub type Result<T> = std::result::Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_conversation_is_bad_request() {
        let resp = WsError::InvalidConversation("id is empty".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = WsError::ChannelSend("closed".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
