//! HTTP gateway for Chatloom.
//!
//! Exposes the chat loop over REST plus an SSE streaming variant, thread
//! listing for resuming old conversations, and the embedded browser UI.
//!
//! Built on Axum.

pub mod frontend;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use chatloom_checkpoint::{InMemoryStore, SqliteStore};
use chatloom_core::error::Error;
use chatloom_core::message::{Message, ThreadId};
use chatloom_core::CheckpointStore;
use chatloom_providers::OpenAiCompatProvider;
use chatloom_turn::TurnRunner;

/// Shared application state for the gateway.
pub struct AppState {
    pub runner: TurnRunner,
    pub store: Arc<dyn CheckpointStore>,
    pub provider_name: String,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/threads", get(threads_handler))
        .route("/threads/{id}", get(thread_history_handler))
        .with_state(state)
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: chatloom_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config).await?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!("Gateway listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Wire provider, store, tools, and runner from config.
pub async fn build_state(
    config: &chatloom_config::AppConfig,
) -> Result<SharedState, Box<dyn std::error::Error>> {
    let api_key = config
        .api_key
        .clone()
        .ok_or("No API key configured: set CHATLOOM_API_KEY or GROQ_API_KEY")?;
    let provider: Arc<dyn chatloom_core::Provider> =
        Arc::new(OpenAiCompatProvider::new("groq", &config.api_url, api_key)?);

    let store: Arc<dyn CheckpointStore> = match config.checkpoint.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(SqliteStore::new(&config.checkpoint.db_path).await?),
    };

    let tools = Arc::new(chatloom_tools::builtin_registry(config, provider.clone())?);

    let mut runner = TurnRunner::new(
        provider.clone(),
        config.model.clone(),
        config.temperature,
        tools,
        store.clone(),
    );
    if let Some(max_tokens) = config.max_tokens {
        runner = runner.with_max_tokens(max_tokens);
    }

    Ok(Arc::new(AppState {
        runner,
        store,
        provider_name: provider.name().to_string(),
    }))
}

// ── Request / response types ──

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Existing thread to continue; omitted to start a new one
    pub thread_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    thread_id: String,
    response: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct ThreadListResponse {
    threads: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ThreadHistoryResponse {
    thread_id: String,
    messages: Vec<Message>,
}

fn internal_error(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    warn!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ── Handlers ──

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "provider": state.provider_name,
        "store": state.store.name(),
    }))
}

/// `POST /chat`: run one turn to completion and return the final reply.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let thread_id = payload
        .thread_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let thread = ThreadId::from(&thread_id);
    info!(thread = %thread, "Chat request");

    let reply = state
        .runner
        .run(&thread, &payload.message)
        .await
        .map_err(internal_error)?;

    Ok(Json(ChatResponse {
        thread_id,
        response: reply.content,
    }))
}

/// `POST /chat/stream`: run one turn, streaming progress as SSE events.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let thread_id = payload
        .thread_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(thread = %thread_id, "Streaming chat request");

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let thread = ThreadId::from(&thread_id);
    tokio::spawn(async move {
        // Failures already reach the client as an error event
        if let Err(e) = state.runner.run_stream(&thread, &payload.message, tx).await {
            warn!(thread = %thread, error = %e, "Streaming turn failed");
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Sse::new(stream)
}

/// `GET /threads`: ids of all threads with persisted history.
async fn threads_handler(
    State(state): State<SharedState>,
) -> Result<Json<ThreadListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let ids = state
        .store
        .list_thread_ids()
        .await
        .map_err(|e| internal_error(e.into()))?;

    Ok(Json(ThreadListResponse {
        threads: ids.into_iter().map(|id| id.to_string()).collect(),
    }))
}

/// `GET /threads/{id}`: full message history of one thread.
async fn thread_history_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadHistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let thread = ThreadId::from(&id);
    let messages = state
        .store
        .load(&thread)
        .await
        .map_err(|e| internal_error(e.into()))?;

    Ok(Json(ThreadHistoryResponse {
        thread_id: id,
        messages,
    }))
}
