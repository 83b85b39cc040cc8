use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, routing::post, routing::put, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use isaac_assistant::{CaseInput, Orchestrator, ResponseLength, SessionView, WorkflowError};

pub type SharedOrchestrator = Arc<Orchestrator>;

pub fn router(orchestrator: SharedOrchestrator) -> Router {
    Router::new()
        .route("/", get(serve_ui))
        .route("/healthz", get(healthz))
        .route("/api/session", get(get_session))
        .route("/api/session/inputs", put(put_inputs))
        .route("/api/session/submit", post(submit))
        .route("/api/session/reset", post(reset))
        .route("/api/session/verify", post(verify))
        .route(
            "/api/session/recommendations/management",
            post(recommend_management),
        )
        .route(
            "/api/session/recommendations/antibiotics",
            post(recommend_antibiotics),
        )
        .route("/api/session/compliance", post(assess_compliance))
        .with_state(orchestrator)
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Body of `PUT /api/session/inputs`. Missing fields are stored as empty.
#[derive(Debug, Deserialize)]
pub struct InputsRequest {
    #[serde(flatten)]
    pub inputs: CaseInput,
    pub response_length: Option<String>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

async fn serve_ui() -> Html<&'static str> {
    Html(include_str!("../ui/index.html"))
}

async fn healthz() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn get_session(State(orchestrator): State<SharedOrchestrator>) -> Json<SessionView> {
    Json(orchestrator.view())
}

async fn put_inputs(
    State(orchestrator): State<SharedOrchestrator>,
    payload: Result<Json<InputsRequest>, JsonRejection>,
) -> Result<Json<SessionView>, AppError> {
    let Json(request) = payload.map_err(AppError::bad_request)?;
    let length = request
        .response_length
        .as_deref()
        .map(str::parse::<ResponseLength>)
        .transpose()
        .map_err(AppError::bad_request)?;
    orchestrator.set_inputs(request.inputs);
    if let Some(length) = length {
        orchestrator.set_response_length(length);
    }
    debug!("case inputs updated");
    Ok(Json(orchestrator.view()))
}

async fn submit(State(orchestrator): State<SharedOrchestrator>) -> Json<SessionView> {
    orchestrator.submit().await;
    Json(orchestrator.view())
}

async fn reset(State(orchestrator): State<SharedOrchestrator>) -> Json<SessionView> {
    Json(orchestrator.reset())
}

async fn verify(
    State(orchestrator): State<SharedOrchestrator>,
) -> Result<Json<SessionView>, AppError> {
    orchestrator.verify().await.map_err(AppError::internal)?;
    Ok(Json(orchestrator.view()))
}

async fn recommend_management(
    State(orchestrator): State<SharedOrchestrator>,
) -> Json<SessionView> {
    let outcome = orchestrator.recommend_management().await;
    workflow_view(&orchestrator, outcome.map(|_| ()))
}

async fn recommend_antibiotics(
    State(orchestrator): State<SharedOrchestrator>,
) -> Json<SessionView> {
    let outcome = orchestrator.recommend_antibiotics().await;
    workflow_view(&orchestrator, outcome.map(|_| ()))
}

async fn assess_compliance(State(orchestrator): State<SharedOrchestrator>) -> Json<SessionView> {
    let outcome = orchestrator.assess_compliance().await;
    workflow_view(&orchestrator, outcome.map(|_| ()))
}

/// Step failures are already written into the session; the caller sees them
/// in the returned view.
fn workflow_view(orchestrator: &Orchestrator, outcome: Result<(), WorkflowError>) -> Json<SessionView> {
    if let Err(err) = outcome {
        warn!(error = %err, "workflow step returned an error to the page");
    }
    Json(orchestrator.view())
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
