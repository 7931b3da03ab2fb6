//! HTTP API handlers
//!
//! Request handlers for chat exchanges and conversation history.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::{debug, info, warn};

use panda_core::stream::ChannelSink;
use panda_core::{AudioClip, ChatResult, ConversationId, FrameSink, Message, StreamFrame};

use crate::error::{ApiError, Result};
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Text chat request payload
#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: String,
    pub conversation_id: Option<String>,
}

/// Optional conversation id passed as a query parameter
#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    pub conversation_id: Option<String>,
}

/// Streaming chat query
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub conversations: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewConversationResponse {
    pub conversation_id: ConversationId,
}

/// Parse an optional client-supplied id; blank counts as absent
fn optional_id(raw: Option<&str>) -> Result<Option<ConversationId>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Ok(Some(ConversationId::parse(raw)?)),
    }
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        conversations: state.chat.store().conversation_count(),
    })
}

/// POST /api/chat/text
pub async fn chat_text(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    payload: std::result::Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<ChatResult>> {
    let Json(input) = payload?;
    debug!("Text chat request: {} chars", input.text.len());

    let raw_id = input
        .conversation_id
        .as_deref()
        .or(query.conversation_id.as_deref());
    let conversation_id = optional_id(raw_id)?;

    let result = state
        .chat
        .handle_text_exchange(conversation_id, &input.text)
        .await?;
    Ok(Json(result))
}

/// POST /api/chat/speech (multipart)
///
/// The conversation id may come as a form field or a query parameter; the
/// form field wins.
pub async fn chat_speech(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    mut multipart: Multipart,
) -> Result<Json<ChatResult>> {
    let mut audio = None;
    let mut language = None;
    let mut raw_id = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("audio_file") => {
                let mime_type = field.content_type().unwrap_or_default().to_string();
                if !mime_type.starts_with("audio/") {
                    return Err(ApiError::BadRequest("File must be an audio file".to_string()));
                }
                let file_name = field.file_name().unwrap_or("audio").to_string();
                let data = field.bytes().await?;
                audio = Some(AudioClip::new(data.to_vec(), file_name, mime_type));
            }
            Some("language") => language = Some(field.text().await?),
            Some("conversation_id") => raw_id = Some(field.text().await?),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("audio_file is required".to_string()))?;
    let language = language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| state.default_language.clone());
    let raw_id = raw_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .or(query.conversation_id.as_deref());
    let conversation_id = optional_id(raw_id)?;

    info!(
        "Speech chat request: {} bytes of {}, language {}",
        audio.data.len(),
        audio.mime_type,
        language
    );

    let result = state
        .chat
        .handle_speech_exchange(conversation_id, &audio, &language)
        .await?;
    Ok(Json(result))
}

/// GET /api/chat/stream/{conversation_id}?message=
///
/// Input is validated before the stream opens. Afterwards every outcome,
/// including failure, arrives as a frame.
pub async fn chat_stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let conversation_id = ConversationId::parse(&conversation_id)?;
    let message = state.chat.validate_text(&query.message)?;

    let (mut sink, rx) = ChannelSink::channel(state.chat.config().stream_buffer);
    let chat = state.chat.clone();
    let id = conversation_id.clone();
    tokio::spawn(async move {
        if let Err(e) = chat
            .handle_streaming_exchange(Some(id.clone()), &message, &mut sink)
            .await
        {
            warn!("Streaming exchange failed for {}: {}", id, e);
            let _ = sink.push(StreamFrame::error(id, format!("Error: {}", e))).await;
        }
    });

    let events = ReceiverStream::new(rx).map(|frame| Ok(frame_event(&frame)));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn frame_event(frame: &StreamFrame) -> Event {
    let data = serde_json::to_string(frame).unwrap_or_default();
    Event::default().data(data)
}

/// GET /api/conversation/{conversation_id}
pub async fn conversation_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<HistoryResponse>> {
    let conversation_id = ConversationId::parse(&conversation_id)?;
    let messages = state.chat.history(&conversation_id)?;
    Ok(Json(HistoryResponse {
        conversation_id,
        messages,
    }))
}

/// POST /api/conversation/new
pub async fn new_conversation(State(state): State<AppState>) -> Json<NewConversationResponse> {
    Json(NewConversationResponse {
        conversation_id: state.chat.new_conversation(),
    })
}
