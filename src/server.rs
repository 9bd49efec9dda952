//! HTTP surface for workflow engines: classification and rule evaluation
//! as JSON endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::pipeline::classifier::{ClassificationRequest, Classifier};
use crate::pipeline::processor::SweepProcessor;
use crate::pipeline::rules::SearchResult;
use crate::pipeline::types::Message;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub processor: Arc<SweepProcessor>,
}

/// Build the Axum router.
pub fn sweep_routes(classifier: Arc<Classifier>, processor: Arc<SweepProcessor>) -> Router {
    let state = AppState {
        classifier,
        processor,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/classify", post(classify))
        .route("/api/evaluate", post(evaluate))
        .route("/api/resolve", post(resolve))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mailsweep",
        "model": state.classifier.model_name(),
        "rules": state.processor.rules().rules().len(),
    }))
}

// ── Classification ──────────────────────────────────────────────────────

async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassificationRequest>,
) -> impl IntoResponse {
    let classification = state.classifier.classify_request(&request).await;
    Json(classification)
}

// ── Rules ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    messages: Vec<Message>,
    /// Evaluation clock; defaults to the server's.
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> impl IntoResponse {
    if state.processor.rules().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "No rules loaded"})),
        );
    }

    let now = request.now.unwrap_or_else(Utc::now);
    match state.processor.process_batch(&request.messages, now).await {
        Ok(report) => {
            info!(run_id = %report.run_id, messages = report.summary.messages, "Evaluated batch");
            (StatusCode::OK, Json(serde_json::json!(report)))
        }
        Err(e) => {
            warn!(error = %e, "Batch evaluation failed");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    results: Vec<SearchResult>,
}

async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> impl IntoResponse {
    match state.processor.rules().resolve_search_results(&request.results) {
        Ok(decisions) => (
            StatusCode::OK,
            Json(serde_json::json!({ "decisions": decisions })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}
