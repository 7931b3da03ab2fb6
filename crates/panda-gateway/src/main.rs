//! pandalora-gateway: PandaLora Gateway Main Binary
//!
//! Serves the HTTP API (text, speech, SSE streaming) and the WebSocket chat
//! endpoint on one port.
//!
//! Usage:
//!   pandalora-gateway                   - Start the server
//!   pandalora-gateway --config <path>   - Start with a TOML config file
//!   pandalora-gateway --help            - Show help

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use http::{HeaderValue, Method};
use panda_core::{ChatService, Config, GeminiClient, SessionStore};
use panda_voice::WhisperClient;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Start the server, optionally from a config file
    Server { config_path: Option<String> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match parse_args(&args)? {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("pandalora-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server { config_path } => config_path,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting PandaLora gateway...");
    tracing::info!("Model: {}", config.llm.model);

    run_server(config).await
}

/// Parse command line arguments
fn parse_args(args: &[String]) -> anyhow::Result<RunMode> {
    let mut config_path = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config_path = Some(path.clone());
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config_path = Some(path.to_string());
                } else {
                    anyhow::bail!("Unknown argument: {} (see --help)", other);
                }
            }
        }
    }

    Ok(RunMode::Server { config_path })
}

/// Print help message
fn print_help() {
    println!("pandalora-gateway - PandaLora chat gateway");
    println!();
    println!("Usage:");
    println!("  pandalora-gateway                  Start the server");
    println!("  pandalora-gateway --config <path>  Load settings from a TOML file");
    println!("  pandalora-gateway --help           Show this help message");
    println!("  pandalora-gateway --version        Show version");
    println!();
    println!("Without --config, ./pandalora.toml is used when present.");
    println!();
    println!("Environment Variables:");
    println!("  GEMINI_API_KEY             Gemini API key");
    println!("  GEMINI_MODEL               Model name (default: gemini-2.0-flash-lite)");
    println!("  GEMINI_BASE_URL            Custom Gemini endpoint");
    println!("  SPEECH_API_KEY             Whisper API key (enables speech input)");
    println!("  SPEECH_PROVIDER            openai or groq (default: openai)");
    println!("  SPEECH_MODEL               Whisper model override");
    println!("  SPEECH_BASE_URL            Custom Whisper endpoint");
    println!("  HOST / PORT                Bind address (default: 0.0.0.0:8000)");
    println!("  ALLOWED_ORIGINS            Comma-separated CORS origins (default: any)");
    println!("  SYSTEM_PROMPT              Persona prompt override");
    println!("  MAX_MESSAGES               Messages kept per conversation (default: 50)");
    println!("  CONTEXT_WINDOW             Messages sent to the model (default: 10)");
    println!("  WS_MAX_CONSECUTIVE_ERRORS  Close a WebSocket after N failures (default: 0, never)");
    println!("  RUST_LOG                   Log filter (default: info)");
}

/// Assemble services and the merged router
fn build_app(config: &Config) -> anyhow::Result<(Router, Arc<SessionStore>)> {
    let generator = GeminiClient::new(&config.llm)
        .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;
    if !generator.is_configured() {
        tracing::warn!("GEMINI_API_KEY is not set; replies will be an apology until it is");
    }

    let store = Arc::new(SessionStore::with_capacity(config.chat.max_messages));
    let mut chat = ChatService::new(Arc::clone(&store), Arc::new(generator), config.chat.clone());

    match WhisperClient::from_config(&config.speech)
        .map_err(|e| anyhow::anyhow!("Failed to create speech client: {}", e))?
    {
        Some(whisper) => {
            tracing::info!(
                "Speech input enabled ({:?}, model {})",
                whisper.config().provider,
                whisper.config().model
            );
            chat = chat.with_transcriber(Arc::new(whisper));
        }
        None => tracing::info!("Speech input disabled (no SPEECH_API_KEY configured)"),
    }
    let chat = Arc::new(chat);

    let api_state = panda_api::AppState::new(Arc::clone(&chat), config.speech.default_language.clone());
    let ws_state = panda_ws::WsState::new(Arc::clone(&chat), config.ws.max_consecutive_errors);

    let app = Router::new()
        .merge(panda_api::build_router(api_state))
        .merge(panda_ws::build_router(ws_state))
        .layer(cors_layer(config.server.allowed_origins.as_deref())?)
        .layer(TraceLayer::new_for_http());

    Ok((app, store))
}

/// Build the CORS layer; no configured origins means any origin
fn cors_layer(origins: Option<&[String]>) -> anyhow::Result<CorsLayer> {
    let allow_origin = match origins {
        None => AllowOrigin::from(Any),
        Some(origins) if origins.iter().any(|o| o == "*") => AllowOrigin::from(Any),
        Some(origins) => {
            let values = origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o)
                        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            AllowOrigin::list(values)
        }
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

/// Run the gateway until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let (app, store) = build_app(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("HTTP API listening on http://{}", addr);
    tracing::info!("WebSocket endpoint: ws://{}/ws/chat/{{conversation_id}}", addr);
    tracing::info!("Press Ctrl+C to exit");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    store.close();
    tracing::info!(
        "Session store closed ({} conversations dropped)",
        store.conversation_count()
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}
