//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for chat turns, search, and corpus browsing.
//! A conversation in use by a request is shared per id, so concurrent turns
//! on one session run one at a time. Idle sessions are evicted and reloaded
//! from the store on their next request.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::Conversation;
use crate::error::WiseoneError;
use crate::orchestrator::Orchestrator;
use crate::rag::RagEngine;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

type Session = Arc<Mutex<Conversation>>;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    engine: RagEngine,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl AppState {
    /// The shared session for `id`, loaded from the store when no request
    /// holds it. The cache lock is not held while loading.
    async fn session(&self, id: Uuid) -> Result<Option<Session>, WiseoneError> {
        if let Some(session) = self.sessions.lock().await.get(&id).cloned() {
            return Ok(Some(session));
        }
        let Some(conversation) = self.engine.conversations().load_conversation(id).await? else {
            return Ok(None);
        };
        let session = self
            .sessions
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(conversation)))
            .clone();
        Ok(Some(session))
    }

    /// Drop a request's handle on a session, evicting it once no other
    /// request holds it.
    async fn release(&self, id: Uuid, session: Session) {
        drop(session);
        let mut sessions = self.sessions.lock().await;
        if sessions.get(&id).is_some_and(|s| Arc::strong_count(s) == 1) {
            sessions.remove(&id);
        }
    }
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Answer, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let engine = orchestrator.engine(None, None);

    let state = Arc::new(AppState {
        orchestrator,
        engine,
        sessions: Mutex::new(HashMap::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/retry", post(retry))
        .route("/conversations", get(list_conversations))
        .route("/conversations/{id}", get(get_conversation))
        .route("/search", post(search))
        .route("/transcripts", get(list_transcripts))
        .route("/transcripts/{filename}", get(get_transcript))
        .route("/themes", get(themes))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Wiseone API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Chat turn", "POST /chat");
    Output::kv("Retry turn", "POST /chat/retry");
    Output::kv("Conversations", "GET  /conversations");
    Output::kv("Conversation", "GET  /conversations/:id");
    Output::kv("Search", "POST /search");
    Output::kv("Sessions", "GET  /transcripts");
    Output::kv("Session chunks", "GET  /transcripts/:filename");
    Output::kv("Themes", "GET  /themes");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    /// Continue this conversation; a new one is started when absent.
    #[serde(default)]
    conversation_id: Option<Uuid>,
    message: String,
}

#[derive(Deserialize)]
struct RetryRequest {
    conversation_id: Uuid,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    threshold: Option<f32>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    20
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<Uuid>,
    retryable: bool,
}

/// HTTP status for a failed request.
fn status_for(error: &WiseoneError) -> StatusCode {
    match error {
        WiseoneError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        WiseoneError::Turn(_)
        | WiseoneError::Timeout(_)
        | WiseoneError::Embedding(_)
        | WiseoneError::Generation { .. }
        | WiseoneError::Retrieval(_)
        | WiseoneError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: WiseoneError, conversation_id: Option<Uuid>) -> Response {
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
            conversation_id,
            retryable: error.is_retryable(),
        }),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{} not found", what),
            conversation_id: None,
            retryable: false,
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.transcripts().stats().await {
        Ok(stats) => Json(serde_json::json!({ "status": "ok", "stats": stats })).into_response(),
        Err(e) => error_response(e, None),
    }
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let session = match req.conversation_id {
        Some(id) => match state.session(id).await {
            Ok(Some(session)) => session,
            Ok(None) => return not_found("Conversation"),
            Err(e) => return error_response(e, Some(id)),
        },
        None => Arc::new(Mutex::new(Conversation::new())),
    };

    let mut conversation = session.lock().await;
    let result = state.engine.turn(&mut conversation, &req.message).await;

    // A failed first turn still has an id once its question is stored.
    let id = conversation.id;
    drop(conversation);
    if let Some(id) = id {
        state.release(id, session).await;
    }

    match result {
        Ok(outcome) => {
            info!("Answered turn in {}", outcome.conversation_id);
            Json(outcome).into_response()
        }
        Err(e) => {
            warn!("Chat turn failed: {}", e);
            error_response(e, id)
        }
    }
}

async fn retry(State(state): State<Arc<AppState>>, Json(req): Json<RetryRequest>) -> Response {
    let id = req.conversation_id;
    let session = match state.session(id).await {
        Ok(Some(session)) => session,
        Ok(None) => return not_found("Conversation"),
        Err(e) => return error_response(e, Some(id)),
    };

    let mut conversation = session.lock().await;
    let result = state.engine.retry(&mut conversation).await;
    drop(conversation);
    state.release(id, session).await;

    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            warn!("Retry failed: {}", e);
            error_response(e, Some(id))
        }
    }
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    match state.engine.conversations().list_conversations(params.limit).await {
        Ok(conversations) => Json(serde_json::json!({
            "total": conversations.len(),
            "conversations": conversations,
        }))
        .into_response(),
        Err(e) => error_response(e, None),
    }
}

async fn get_conversation(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let session = match state.session(id).await {
        Ok(Some(session)) => session,
        Ok(None) => return not_found("Conversation"),
        Err(e) => return error_response(e, Some(id)),
    };

    let body = {
        let conversation = session.lock().await;
        serde_json::json!({
            "id": id,
            "title": conversation.title,
            "messages": conversation.messages(),
            "pending": conversation.pending_question().is_some(),
        })
    };
    state.release(id, session).await;
    Json(body).into_response()
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    let mut retriever = state.engine.retriever().clone();
    if let Some(limit) = req.limit {
        retriever = retriever.with_top_k(limit);
    }
    if let Some(threshold) = req.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return error_response(
                WiseoneError::InvalidInput(format!("threshold {} is outside [0, 1]", threshold)),
                None,
            );
        }
        retriever = retriever.with_threshold(threshold);
    }
    if retriever.top_k() == 0 {
        return error_response(
            WiseoneError::InvalidInput("limit must be at least 1".to_string()),
            None,
        );
    }

    match retriever.retrieve(&req.query, Some(&req.query)).await {
        Ok(results) => Json(serde_json::json!({ "results": results })).into_response(),
        Err(e) => error_response(e, None),
    }
}

async fn list_transcripts(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.transcripts().list_transcripts().await {
        Ok(transcripts) => Json(serde_json::json!({
            "total": transcripts.len(),
            "transcripts": transcripts,
        }))
        .into_response(),
        Err(e) => error_response(e, None),
    }
}

async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    match state.orchestrator.transcripts().chunks(&filename).await {
        Ok(chunks) if chunks.is_empty() => not_found("Transcript"),
        Ok(chunks) => Json(serde_json::json!({
            "filename": filename,
            "chunk_count": chunks.len(),
            "chunks": chunks,
        }))
        .into_response(),
        Err(e) => error_response(e, None),
    }
}

async fn themes(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.transcripts().theme_counts().await {
        Ok(themes) => Json(serde_json::json!({ "themes": themes })).into_response(),
        Err(e) => error_response(e, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::store::{MemoryStore, NewChunk, TranscriptStore};
    use crate::test_support::{ScriptedGenerator, StaticEmbedder};
    use crate::transcript::Transcript;
    use chrono::NaiveDate;

    async fn app_state() -> (Arc<AppState>, Arc<ScriptedGenerator>) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_transcript(
                &Transcript::new(
                    "2026-02-08-ego.md",
                    NaiveDate::from_ymd_opt(2026, 2, 8).unwrap(),
                    "Ego and Awakening",
                    "",
                ),
                &[NewChunk {
                    index: 0,
                    content: "The ego is a story we keep telling.".to_string(),
                    section_header: Some("Key Teachings".to_string()),
                    token_count: 8,
                    embedding: vec![1.0, 0.0],
                }],
            )
            .await
            .unwrap();

        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = Orchestrator::with_components(
            Settings::default(),
            Prompts::default(),
            Arc::new(StaticEmbedder::new()),
            generator.clone(),
            store.clone(),
            store,
        );
        let engine = orchestrator.engine(None, None);
        let state = Arc::new(AppState {
            orchestrator,
            engine,
            sessions: Mutex::new(HashMap::new()),
        });
        (state, generator)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_failed_turn_returns_id_and_retry_answers() {
        let (state, generator) = app_state().await;
        generator.push_err("upstream 503");

        let request = ChatRequest {
            conversation_id: None,
            message: "What is ego?".to_string(),
        };
        let response = chat(State(state.clone()), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["retryable"], true);
        let id: Uuid = serde_json::from_value(body["conversation_id"].clone()).unwrap();

        let response = get_conversation(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["pending"], true);

        generator.push_ok("synthesis");
        generator.push_ok("The ego is a story.");
        let response = retry(State(state.clone()), Json(RetryRequest { conversation_id: id })).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["answer"], "The ego is a story.");
        assert_eq!(body["conversation_id"], id.to_string());
        assert_eq!(body["sources"].as_array().unwrap().len(), 1);

        // Nothing holds the session once the requests are done.
        assert!(state.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_turn_on_stored_conversation() {
        let (state, generator) = app_state().await;
        let first = ChatRequest {
            conversation_id: None,
            message: "What is ego?".to_string(),
        };
        let body = body_json(chat(State(state.clone()), Json(first)).await).await;
        let id: Uuid = serde_json::from_value(body["conversation_id"].clone()).unwrap();

        generator.push_ok("synthesis");
        generator.push_ok("Notice the teller.");
        let follow_up = ChatRequest {
            conversation_id: Some(id),
            message: "How do I see through it?".to_string(),
        };
        let response = chat(State(state.clone()), Json(follow_up)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["answer"], "Notice the teller.");

        let stored = state
            .engine
            .conversations()
            .load_conversation(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.messages().len(), 4);
        assert!(state.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        let (state, _) = app_state().await;
        let id = Uuid::new_v4();

        let response = retry(State(state.clone()), Json(RetryRequest { conversation_id: id })).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = get_conversation(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_for_errors() {
        assert_eq!(
            status_for(&WiseoneError::InvalidInput("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        let failed_turn =
            WiseoneError::Turn(Box::new(WiseoneError::generation("reflection", "503")));
        assert_eq!(status_for(&failed_turn), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&WiseoneError::Store("locked".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_chat_request_without_conversation() {
        let req: ChatRequest = serde_json::from_str(r#"{"message": "What is ego?"}"#).unwrap();
        assert!(req.conversation_id.is_none());
        assert_eq!(req.message, "What is ego?");
    }
}
