// SPDX-License-Identifier: MIT

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::CopilotError;
use crate::adk::graph::GraphEvent;
use crate::copilot::agent::{AskRequest, AskResponse, ResearchAgent};
use crate::copilot::config::ServerConfig;
use crate::copilot::state::ResearchState;

#[derive(Clone)]
pub struct AppState {
    agent: Arc<ResearchAgent>,
}

/// Error body `{"error": ...}` with a status code
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn no_query() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "No query provided")
    }
}

impl From<CopilotError> for ApiError {
    fn from(err: CopilotError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        log::error!("Request failed: {}", err);
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        log::warn!("Rejected request body: {}", rejection.body_text());
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct InputRequest {
    #[serde(default)]
    input: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ThreadResponse {
    thread_id: String,
    state: ResearchState,
}

pub fn router(agent: Arc<ResearchAgent>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/copilotkit_remote", post(copilotkit_remote))
        .route("/copilotkit_remote/stream", post(stream_remote))
        .route("/input", post(handle_input))
        .route("/threads/{id}", get(get_thread))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { agent })
}

pub async fn serve(agent: Arc<ResearchAgent>, config: &ServerConfig) -> Result<(), CopilotError> {
    let app = router(agent);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "message": "Research copilot is running",
        "status": "ok"
    }))
}

/// Body must name a non-empty user question
fn checked(request: AskRequest) -> Result<AskRequest, ApiError> {
    match request.query() {
        Some(query) => {
            log::info!("Received query: {}", query.content);
            Ok(request)
        }
        None => {
            log::error!("No query provided in the payload.");
            Err(ApiError::no_query())
        }
    }
}

async fn copilotkit_remote(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = payload?;
    let request = checked(request)?;
    Ok(Json(state.agent.ask(request).await?))
}

async fn handle_input(
    State(state): State<AppState>,
    payload: Result<Json<InputRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(payload) = payload?;
    let request = checked(AskRequest::from_input(payload.input, payload.thread_id))?;
    Ok(Json(state.agent.ask(request).await?))
}

async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadResponse>, ApiError> {
    match state.agent.thread_state(&id).await? {
        Some(research) => Ok(Json(ThreadResponse {
            thread_id: id,
            state: research,
        })),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "Thread not found")),
    }
}

fn sse_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Graph events as `event: graph`, then one `result` or `error` event
async fn stream_remote(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    let request = checked(request)?;
    let (tx, rx) = mpsc::channel::<Event>(100);

    tokio::spawn(async move {
        log::info!("Starting streaming run");
        let (graph_tx, mut graph_rx) = mpsc::channel::<GraphEvent>(100);

        let forward_tx = tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = graph_rx.recv().await {
                if forward_tx.send(sse_event("graph", &event)).await.is_err() {
                    break;
                }
            }
        });

        let result = state.agent.ask_stream(request, graph_tx).await;
        let _ = forward.await;

        let last = match result {
            Ok(response) => sse_event("result", &response),
            Err(e) => {
                log::error!("Streaming run failed: {}", e);
                sse_event("error", &json!({ "error": e.to_string() }))
            }
        };
        let _ = tx.send(last).await;
        log::info!("Streaming run finished");
    });

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}
