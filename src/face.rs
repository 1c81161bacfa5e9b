//! HTTP surface: start runs, poll and override jobs, stream job events.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Result, bail};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::jobs::{JobError, JobEvent};
use crate::orchestrator::Orchestrator;

/// How many ports after the configured one are tried before giving up.
const PORT_FALLBACKS: u16 = 10;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Deserialize)]
struct RunAgentPayload {
    url: Option<String>,
}

#[derive(Deserialize)]
struct JobPayload {
    #[serde(rename = "jobId")]
    job_id: Option<String>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });

    Router::new()
        .route("/api/run-agent", post(run_agent_handler))
        .route("/api/job-status", post(job_status_handler))
        .route("/api/mark-job-complete", post(mark_job_complete_handler))
        .route("/api/events", get(sse_handler))
        .route("/submit-data", post(submit_data_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port`, falling back to the next few ports if it is taken.
pub async fn bind(host: &str, port: u16) -> Result<(TcpListener, u16)> {
    let last = port.saturating_add(PORT_FALLBACKS - 1);
    for p in port..=last {
        match TcpListener::bind((host, p)).await {
            Ok(listener) => return Ok((listener, p)),
            Err(e) => warn!(port = p, error = %e, "port unavailable, trying next"),
        }
    }
    bail!("could not bind to any port {port}-{last} on {host}")
}

async fn run_agent_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunAgentPayload>, JsonRejection>,
) -> Response {
    let url = payload
        .ok()
        .and_then(|Json(p)| p.url)
        .map(|u| u.trim().to_string())
        .unwrap_or_default();
    if url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "url is required in the body");
    }
    if let Err(e) = reqwest::Url::parse(&url) {
        return error_response(StatusCode::BAD_REQUEST, &format!("invalid url: {e}"));
    }

    let ticket = state.orchestrator.start_run(&url).await;
    info!(job_id = %ticket.job_id, url = %url, "run accepted");
    Json(json!({ "status": 200, "jobId": ticket.job_id })).into_response()
}

async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobPayload>, JsonRejection>,
) -> Response {
    let job_id = job_id_from(payload);
    match state.orchestrator.jobs().get(&job_id).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn mark_job_complete_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobPayload>, JsonRejection>,
) -> Response {
    let job_id = job_id_from(payload);
    match state.orchestrator.jobs().mark_complete(&job_id).await {
        Ok(outcome) => Json(json!({ "message": outcome.message() })).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// Test sink for the sample form: echoes whatever it was sent.
async fn submit_data_handler(Json(data): Json<Value>) -> Json<Value> {
    info!(body = %data, "form data received");
    Json(json!({
        "status": "success",
        "message": "Data received successfully.",
        "receivedData": data,
    }))
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.orchestrator.jobs().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(to_sse_event(&event))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &JobEvent) -> Event {
    Event::default()
        .event("job")
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()))
}

fn job_id_from(payload: Result<Json<JobPayload>, JsonRejection>) -> String {
    payload
        .ok()
        .and_then(|Json(p)| p.job_id)
        .unwrap_or_default()
}

fn job_error_response(err: JobError) -> Response {
    let status = match err {
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::MissingId => StatusCode::BAD_REQUEST,
    };
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
