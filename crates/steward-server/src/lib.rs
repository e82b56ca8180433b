//! HTTP transport for Steward.
//!
//! Exposes the [`Dispatcher`] over a small JSON API meant for a local browser
//! extension, and records every routed interaction in a [`HistoryStore`].
//!
//! | Route            | Body / query                 | Routes to          |
//! |------------------|------------------------------|--------------------|
//! | `GET /health`    |                              |                    |
//! | `POST /execute`  | `{command}`                  | `MainAgent`        |
//! | `POST /explain`  | `{text}`                     | `GoogleExplainer`  |
//! | `POST /task`     | `{agent_name, payload}`      | `agent_name`       |
//! | `GET /history`   | `?agent=<name>&limit=<n>`    |                    |
//!
//! Replies are flat JSON objects. A success carries `status: "success"` plus
//! the handler's payload fields at the top level; a non-object payload (the
//! built-in interpreter's reply text) is placed under `result`. A failure is
//! `{"status": "error", "message": ...}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use steward::{
    BUILTIN_HANDLER, Dispatcher, EXPLAINER_NAME, Envelope, HistoryRecord, HistoryStore, Task,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Default number of records returned by `GET /history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
/// Upper bound on `limit` for `GET /history`.
pub const MAX_HISTORY_LIMIT: usize = 100;

const EXPLAIN_LOG_CHARS: usize = 200;

type ApiError = (StatusCode, Json<Value>);

/// Shared state for every request.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    history: Arc<dyn HistoryStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state from a dispatcher and the store interactions are recorded in.
    pub fn new(dispatcher: Dispatcher, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            dispatcher,
            history,
        }
    }

    /// Record an interaction on a blocking thread. Failures are logged only.
    async fn record(&self, handler: String, input: String, output: String) {
        let history = self.history.clone();
        let result = tokio::task::spawn_blocking(move || {
            if let Err(e) = history.record(&handler, &input, &output) {
                tracing::warn!(handler = %handler, error = %e, "failed to record history");
            }
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "history task failed");
        }
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/execute", post(execute_handler))
        .route("/explain", post(explain_handler))
        .route("/task", post(task_handler))
        .route("/history", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until the process is stopped.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "steward server listening");
    }
    axum::serve(listener, build_router(state).into_make_service()).await
}

/// Bind `addr` and serve the API.
pub async fn run(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "agents": state.dispatcher.registry().names(),
    }))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    command: String,
}

async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Json<Value> {
    tracing::info!(command = %request.command, "received command");
    let task = Task::new(BUILTIN_HANDLER).with_field("command", request.command.clone());
    let envelope = state.dispatcher.route(task).await;
    state
        .record(BUILTIN_HANDLER.to_string(), request.command, envelope.to_text())
        .await;
    Json(to_wire(envelope))
}

#[derive(Debug, Deserialize)]
struct ExplainRequest {
    text: String,
}

fn clip(text: &str) -> String {
    let head: String = text.chars().take(EXPLAIN_LOG_CHARS).collect();
    format!("{head}...")
}

async fn explain_handler(
    State(state): State<AppState>,
    Json(request): Json<ExplainRequest>,
) -> Result<Json<Value>, ApiError> {
    tracing::info!(length = request.text.chars().count(), "received explanation request");
    let task = Task::new(EXPLAINER_NAME)
        .with_field("action", "explain")
        .with_field("text", request.text.clone());

    match state.dispatcher.route(task).await {
        Envelope::Error { message } => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": message })),
        )),
        envelope => {
            let explanation = envelope
                .payload()
                .and_then(|p| p.get("explanation"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            state
                .record(
                    EXPLAINER_NAME.to_string(),
                    clip(&request.text),
                    clip(explanation),
                )
                .await;
            Ok(Json(to_wire(envelope)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    agent_name: String,
    #[serde(default)]
    payload: Map<String, Value>,
}

async fn task_handler(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Json<Value> {
    let input = Value::Object(request.payload.clone()).to_string();
    let task = Task {
        target_handler: Some(request.agent_name.clone()),
        fields: request.payload,
    };
    let envelope = state.dispatcher.route(task).await;
    state
        .record(request.agent_name, input, envelope.to_text())
        .await;
    Json(to_wire(envelope))
}

/// Flatten an envelope into the reply body the extension reads.
fn to_wire(envelope: Envelope) -> Value {
    match envelope {
        Envelope::Success {
            payload: Value::Object(mut fields),
        } => {
            fields.insert("status".to_string(), json!("success"));
            Value::Object(fields)
        }
        Envelope::Success { payload } => json!({ "status": "success", "result": payload }),
        Envelope::Error { message } => json!({ "status": "error", "message": message }),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    agent: Option<String>,
    limit: Option<usize>,
}

async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let agent = params.agent.filter(|a| !a.is_empty());
    let history = state.history.clone();

    let records: Vec<HistoryRecord> =
        tokio::task::spawn_blocking(move || history.fetch(agent.as_deref(), limit))
            .await
            .map_err(|e| internal(e.to_string()))?
            .map_err(|e| internal(e.to_string()))?;

    Ok(Json(json!({ "history": records })))
}

fn internal(detail: String) -> ApiError {
    tracing::error!(error = %detail, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": detail })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_flattens_object_payloads() {
        let body = to_wire(Envelope::success(json!({ "explanation": "ok" })));
        assert_eq!(body, json!({ "status": "success", "explanation": "ok" }));
    }

    #[test]
    fn test_wire_puts_text_under_result() {
        let body = to_wire(Envelope::success("done"));
        assert_eq!(body, json!({ "status": "success", "result": "done" }));
        let body = to_wire(Envelope::error("nope"));
        assert_eq!(body, json!({ "status": "error", "message": "nope" }));
    }

    #[test]
    fn test_clip_counts_characters() {
        assert_eq!(clip("short"), "short...");
        let long = "é".repeat(250);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), EXPLAIN_LOG_CHARS + 3);
    }
}
