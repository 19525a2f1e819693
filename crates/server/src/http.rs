//! HTTP boundary: `/ask`, `/ask/stream`, `/search`, `/health`, `/memory`.
//!
//! Router composition (CORS built from configured origins, then Trace,
//! then Compression, `with_state` last) is grounded on the teacher's
//! `create_router`/`build_cors_layer`. Handler bodies are new — the
//! teacher's session/tool/websocket/webrtc endpoints have no counterpart
//! here.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use askd_core::domain::{AskResponse, MemoryEntry, MemoryType};

use crate::error::ServerError;
use crate::orchestrator::{AskRequest, StreamEvent};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_origins, state.settings.server.cors_enabled);
    let timeout = Duration::from_secs(state.settings.server.request_timeout_seconds);

    // `/ask/stream` carries its own `TimeoutLayer`-free route: an SSE
    // response legitimately runs longer than a normal request's budget.
    let timed = Router::new()
        .route("/ask", post(ask))
        .route("/search", post(search))
        .route("/health", get(health))
        .route("/memory", post(add_memory).get(list_memory))
        .layer(TimeoutLayer::new(timeout));

    let streaming = Router::new().route("/ask/stream", post(ask_stream));

    timed
        .merge(streaming)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[derive(Debug, Deserialize)]
struct AskRequestBody {
    query: String,
    session_id: Option<String>,
    top_k: Option<usize>,
    confidence_threshold: Option<f32>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    genre_filter: Option<String>,
    sub_domain_filter: Option<String>,
}

impl From<AskRequestBody> for AskRequest {
    fn from(body: AskRequestBody) -> Self {
        AskRequest {
            query: body.query,
            session_id: body.session_id,
            top_k: body.top_k,
            confidence_threshold: body.confidence_threshold,
            temperature: body.temperature,
            max_tokens: body.max_tokens,
            genre_filter: body.genre_filter,
            sub_domain_filter: body.sub_domain_filter,
        }
    }
}

fn validate(body: &AskRequestBody) -> Result<(), ServerError> {
    if body.query.trim().is_empty() {
        return Err(ServerError::InvalidInput("query must not be empty".to_string()));
    }
    if body.query.len() > 4_000 {
        return Err(ServerError::InvalidInput("query exceeds 4000 characters".to_string()));
    }
    Ok(())
}

async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskRequestBody>,
) -> Result<Json<AskResponse>, ServerError> {
    validate(&body)?;
    let response = state.orchestrator.ask(body.into()).await?;
    Ok(Json(response))
}

async fn ask_stream(
    State(state): State<AppState>,
    Json(body): Json<AskRequestBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    validate(&body)?;

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let cancel = CancellationToken::new();
    let orchestrator = state.orchestrator.clone();
    let request: AskRequest = body.into();

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        orchestrator.ask_stream(request, task_cancel, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(move |event| {
        let sse_event = match event {
            StreamEvent::Step(step) => Event::default().event("step").data(step),
            StreamEvent::Sources(sources) => Event::default()
                .event("sources")
                .json_data(sources)
                .unwrap_or_else(|_| Event::default().event("sources").data("[]")),
            StreamEvent::Chunk(text) => Event::default().event("chunk").data(text),
            StreamEvent::Done(response) => Event::default()
                .event("done")
                .json_data(*response)
                .unwrap_or_else(|_| Event::default().event("done").data("{}")),
            StreamEvent::Error(message) => Event::default().event("error").data(message),
        };
        Ok(sse_event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    intent: String,
    results: Vec<SearchResultItem>,
}

#[derive(Debug, Serialize)]
struct SearchResultItem {
    source_name: String,
    source_path: String,
    page_number: Option<u32>,
    score: f32,
    text: String,
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<AskRequestBody>,
) -> Result<Json<SearchResponse>, ServerError> {
    validate(&body)?;
    let request: AskRequest = body.into();
    let (chunks, intent) = state.orchestrator.search(&request).await?;
    Ok(Json(SearchResponse {
        intent,
        results: chunks
            .into_iter()
            .map(|c| SearchResultItem {
                source_name: c.chunk.source_name,
                source_path: c.chunk.source_path,
                page_number: c.chunk.page_number,
                score: c.score,
                text: c.chunk.text,
            })
            .collect(),
    }))
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

#[derive(Debug, Deserialize)]
struct AddMemoryRequest {
    session_id: String,
    memory_type: MemoryType,
    content: String,
}

async fn add_memory(
    State(state): State<AppState>,
    Json(body): Json<AddMemoryRequest>,
) -> Result<StatusCode, ServerError> {
    let Some(store) = &state.memory_store else {
        return Err(ServerError::Internal("memory store not configured".to_string()));
    };
    if body.content.trim().is_empty() {
        return Err(ServerError::InvalidInput("content must not be empty".to_string()));
    }

    let embedded = state.orchestrator.embedding_client().embed_one(&body.content).await?;
    let entry = MemoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: body.session_id,
        memory_type: body.memory_type,
        content: body.content,
        embedding: embedded.vector,
        created_at: chrono::Utc::now(),
    };
    store.add(entry).await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct ListMemoryQuery {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct MemoryEntryView {
    id: String,
    memory_type: MemoryType,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MemoryEntry> for MemoryEntryView {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id,
            memory_type: entry.memory_type,
            content: entry.content,
            created_at: entry.created_at,
        }
    }
}

async fn list_memory(
    State(state): State<AppState>,
    Query(query): Query<ListMemoryQuery>,
) -> Result<Json<Vec<MemoryEntryView>>, ServerError> {
    let Some(store) = &state.memory_store else {
        return Err(ServerError::Internal("memory store not configured".to_string()));
    };
    let entries = store.list(&query.session_id).await?;
    Ok(Json(entries.into_iter().map(MemoryEntryView::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        let body = AskRequestBody {
            query: "   ".to_string(),
            session_id: None,
            top_k: None,
            confidence_threshold: None,
            temperature: None,
            max_tokens: None,
            genre_filter: None,
            sub_domain_filter: None,
        };
        assert!(validate(&body).is_err());
    }

    #[test]
    fn accepts_nonempty_query() {
        let body = AskRequestBody {
            query: "how do I compress a kick drum".to_string(),
            session_id: None,
            top_k: None,
            confidence_threshold: None,
            temperature: None,
            max_tokens: None,
            genre_filter: None,
            sub_domain_filter: None,
        };
        assert!(validate(&body).is_ok());
    }
}
