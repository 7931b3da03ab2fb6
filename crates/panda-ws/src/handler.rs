//! WebSocket connection handler
//!
//! Each connection is bound to one conversation. Incoming messages are
//! handled one at a time; replies stream back as `frame` messages.

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use axum::{
    extract::{
        Path, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use panda_core::{ConversationId, FrameSink, PushStatus, StreamFrame};

use crate::message::{ClientMessage, ServerMessage};
use crate::server::WsState;
use crate::{Result, WsError};

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<String>,
    State(state): State<WsState>,
) -> Result<Response> {
    let conversation_id = ConversationId::parse(&conversation_id)
        .map_err(|e| WsError::InvalidConversation(e.to_string()))?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, conversation_id)))
}

/// Sink that forwards frames to the connection's writer task
pub(crate) struct WsSink {
    tx: mpsc::Sender<ServerMessage>,
    saw_error: bool,
}

impl WsSink {
    pub(crate) fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            tx,
            saw_error: false,
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn push(&mut self, frame: StreamFrame) -> PushStatus {
        self.saw_error |= frame.is_error;
        match self.tx.send(ServerMessage::Frame(frame)).await {
            Ok(()) => PushStatus::Delivered,
            Err(_) => PushStatus::ConsumerGone,
        }
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Handle established WebSocket connection
async fn handle_socket(socket: WebSocket, state: WsState, conversation_id: ConversationId) {
    let active = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    info!(
        "WebSocket connected: {} (active connections: {})",
        conversation_id, active
    );

    let (mut ws_tx, mut ws_rx) = socket.split();
    let buffer = state.chat.config().stream_buffer.max(1);
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(buffer);
    let (in_tx, in_rx) = mpsc::channel::<String>(buffer);
    let (gone_tx, mut gone_rx) = oneshot::channel::<()>();

    // Reader: forwards client text until the client goes away
    let reader_id = conversation_id.clone();
    let reader = tokio::spawn(async move {
        let _gone = gone_tx;
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    if in_tx.send(text.as_str().to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Close(_)) => {
                    info!("Client closed connection: {}", reader_id);
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        debug!("Reader ended for conversation: {}", reader_id);
    });

    // Writer: stops on socket failure or once the reader is gone, which
    // closes `out_rx` and tells any running exchange its consumer left
    let writer_id = conversation_id.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = out_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode message: {}", e);
                            continue;
                        }
                    };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = &mut gone_rx => break,
            }
        }
        let _ = ws_tx.close().await;
        debug!("Writer ended for conversation: {}", writer_id);
    });

    if let Err(e) = serve_connection(&state, &conversation_id, in_rx, out_tx).await {
        debug!("Connection loop ended: {}", e);
    }

    let _ = writer.await;
    reader.abort();

    let active = state.connections.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(
        "WebSocket disconnected: {} (active connections: {})",
        conversation_id, active
    );
}

/// Process client messages until the inbox closes, the client leaves, or
/// the error policy gives up on the connection
pub(crate) async fn serve_connection(
    state: &WsState,
    conversation_id: &ConversationId,
    mut inbox: mpsc::Receiver<String>,
    outbox: mpsc::Sender<ServerMessage>,
) -> Result<()> {
    let mut consecutive_errors = 0u32;

    while let Some(text) = inbox.recv().await {
        debug!("Received WebSocket message: {} chars", text.len());

        let failed = match ClientMessage::parse(&text) {
            ClientMessage::Chat { message } => {
                chat(state, conversation_id, &message, &outbox).await?
            }
            ClientMessage::History => {
                let reply = match state.chat.history(conversation_id) {
                    Ok(messages) => ServerMessage::History {
                        conversation_id: conversation_id.clone(),
                        messages,
                    },
                    Err(e) => ServerMessage::Error {
                        message: format!("Error: {}", e),
                    },
                };
                let failed = matches!(reply, ServerMessage::Error { .. });
                send(&outbox, reply).await?;
                failed
            }
            ClientMessage::Ping => {
                send(&outbox, ServerMessage::Pong).await?;
                false
            }
        };

        if failed {
            consecutive_errors += 1;
            let limit = state.max_consecutive_errors;
            if limit > 0 && consecutive_errors >= limit {
                warn!(
                    "Closing WebSocket for {} after {} consecutive errors",
                    conversation_id, consecutive_errors
                );
                break;
            }
        } else {
            consecutive_errors = 0;
        }
    }

    Ok(())
}

/// Run one streaming exchange; returns whether it failed
async fn chat(
    state: &WsState,
    conversation_id: &ConversationId,
    message: &str,
    outbox: &mpsc::Sender<ServerMessage>,
) -> Result<bool> {
    let mut sink = WsSink::new(outbox.clone());
    let result = state
        .chat
        .handle_streaming_exchange(Some(conversation_id.clone()), message, &mut sink)
        .await;

    match result {
        Ok(_) => Ok(sink.saw_error),
        Err(e) => {
            error!("Error processing WebSocket message: {}", e);
            send(
                outbox,
                ServerMessage::Error {
                    message: format!("Error: {}", e),
                },
            )
            .await?;
            Ok(true)
        }
    }
}

async fn send(outbox: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> Result<()> {
    outbox
        .send(msg)
        .await
        .map_err(|e| WsError::ChannelSend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use panda_core::llm::{Generator, PromptContext};
    use panda_core::stream::ChunkStream;
    use panda_core::{ChatConfig, ChatService, GenerationError, SessionStore};
    use std::sync::Arc;

    /// Streams "Hel" + "lo", or fails when asked to
    struct StubGenerator;

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(
            &self,
            ctx: &PromptContext,
        ) -> std::result::Result<String, GenerationError> {
            Ok(ctx.user_text.clone())
        }

        fn generate_stream(&self, ctx: PromptContext) -> ChunkStream {
            let chunks = if ctx.user_text == "fail" {
                vec![Err(GenerationError::Transport("reset".into()))]
            } else {
                vec![Ok("Hel".to_string()), Ok("lo".to_string())]
            };
            futures::stream::iter(chunks).boxed()
        }
    }

    fn state(max_consecutive_errors: u32) -> WsState {
        let chat = ChatService::new(
            Arc::new(SessionStore::new()),
            Arc::new(StubGenerator),
            ChatConfig::default(),
        );
        WsState::new(Arc::new(chat), max_consecutive_errors)
    }

    async fn run(state: &WsState, inputs: &[&str]) -> Vec<ServerMessage> {
        let id = ConversationId::parse("ws-1").unwrap();
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        for input in inputs {
            in_tx.send(input.to_string()).await.unwrap();
        }
        drop(in_tx);

        serve_connection(state, &id, in_rx, out_tx).await.unwrap();

        let mut out = Vec::new();
        while let Some(msg) = out_rx.recv().await {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_raw_text_streams_frames() {
        let state = state(0);
        let out = run(&state, &["hello"]).await;

        let frames: Vec<&StreamFrame> = out
            .iter()
            .map(|m| match m {
                ServerMessage::Frame(f) => f,
                other => panic!("unexpected message: {:?}", other),
            })
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload, "Hel");
        assert_eq!(frames[1].payload, "lo");
        assert!(frames[2].is_final);

        let id = ConversationId::parse("ws-1").unwrap();
        let history = state.chat.history(&id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_ping_and_history() {
        let state = state(0);
        let out = run(&state, &[r#"{"type":"chat","message":"hi"}"#, r#"{"type":"ping"}"#, r#"{"type":"history"}"#]).await;

        assert_eq!(out[3], ServerMessage::Pong);
        match &out[4] {
            ServerMessage::History { messages, .. } => assert_eq!(messages.len(), 2),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open_by_default() {
        let state = state(0);
        let out = run(&state, &["fail", "fail", "fail", "hello"]).await;

        let errors = out
            .iter()
            .filter(|m| matches!(m, ServerMessage::Frame(f) if f.is_error))
            .count();
        assert_eq!(errors, 3);
        assert!(matches!(out.last(), Some(ServerMessage::Frame(f)) if f.is_final && !f.is_error));
    }

    #[tokio::test]
    async fn test_error_policy_closes_after_limit() {
        let state = state(2);
        let out = run(&state, &["fail", "fail", "hello"]).await;

        assert_eq!(out.len(), 2);
        let id = ConversationId::parse("ws-1").unwrap();
        assert_eq!(state.chat.history(&id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_success_resets_error_count() {
        let state = state(2);
        let out = run(&state, &["fail", "hello", "fail", "hello"]).await;

        let finals = out
            .iter()
            .filter(|m| matches!(m, ServerMessage::Frame(f) if f.is_final))
            .count();
        assert_eq!(finals, 4);
    }

    #[tokio::test]
    async fn test_rejected_input_sends_error_message() {
        let state = state(0);
        let out = run(&state, &["   "]).await;

        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], ServerMessage::Error { message } if message.starts_with("Error:")));
    }

    #[tokio::test]
    async fn test_sink_reports_consumer_gone() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = WsSink::new(tx);
        assert!(sink.is_open());
        drop(rx);

        let id = ConversationId::parse("ws-1").unwrap();
        assert!(!sink.is_open());
        assert_eq!(sink.push(StreamFrame::done(id)).await, PushStatus::ConsumerGone);
    }
}
