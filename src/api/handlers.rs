//! HTTP request handlers

use super::types::{
    CreateSessionRequest, CreateSessionResponse, EngineInfo, EnginesResponse, ErrorResponse,
    ReportResponse, RunRequest, RunResponse, SessionView, SuccessResponse, TurnRequest,
    TurnResponse,
};
use super::AppState;
use crate::oneshot::run_single_shot;
use crate::session::{Session, SessionError, SessionRunner};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Catalog
        .route("/api/engines", get(list_engines))
        .route("/api/engines/:id/run", post(run_engine))
        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/turns", post(send_turn))
        .route("/api/sessions/:id/report", post(request_report))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Catalog
// ============================================================

async fn list_engines(State(state): State<AppState>) -> Json<EnginesResponse> {
    Json(EnginesResponse {
        engines: state
            .catalog
            .list()
            .map(|def| EngineInfo::from(def.as_ref()))
            .collect(),
    })
}

async fn run_engine(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, AppError> {
    let engine = state
        .catalog
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Unknown engine: {id}")))?;
    let runner = runner(&state)?;

    let result = run_single_shot(runner.gateway(), &engine, &req.fields).await?;

    Ok(Json(RunResponse {
        engine: id,
        result: Value::Object(result),
    }))
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let engine = state
        .catalog
        .get(&req.engine)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown engine: {}", req.engine)))?;
    let runner = runner(&state)?;

    let (session, opening) = runner.open(engine, req.config).await?;
    let view = SessionView::from(&session);
    tracing::info!(session = %view.id, engine = %view.engine, "Session created");

    state
        .sessions
        .write()
        .await
        .insert(view.id, Arc::new(Mutex::new(session)));

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session: view,
            opening,
        }),
    ))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let handle = session_handle(&state, id).await?;
    let session = handle.lock().await;
    Ok(Json(SessionView::from(&*session)))
}

async fn send_turn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let runner = runner(&state)?;
    let handle = session_handle(&state, id).await?;
    let mut session = handle.try_lock().map_err(|_| busy())?;

    let turn = runner.advance(&mut session, &req.text).await?;
    Ok(Json(TurnResponse::from(turn)))
}

async fn request_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportResponse>, AppError> {
    let runner = runner(&state)?;
    let handle = session_handle(&state, id).await?;
    let mut session = handle.try_lock().map_err(|_| busy())?;

    let report = runner.request_report(&mut session).await?;
    Ok(Json(ReportResponse {
        report: Value::Object(report),
        report_count: session.report_count(),
        phase: session.phase(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))?;

    tracing::info!(session = %id, "Session deleted");
    Ok(Json(SuccessResponse { success: true }))
}

async fn session_handle(state: &AppState, id: Uuid) -> Result<Arc<Mutex<Session>>, AppError> {
    state
        .sessions
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))
}

fn runner(state: &AppState) -> Result<&SessionRunner, AppError> {
    state.runner.as_ref().ok_or_else(|| {
        AppError::Unavailable("No completion provider configured (set ANTHROPIC_API_KEY)".into())
    })
}

fn busy() -> AppError {
    AppError::Conflict("Another request for this session is still in progress".into())
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("sage-engines ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    RateLimited(String, Option<Duration>),
    BadGateway(String),
    Unavailable(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::Configuration(_)
            | SessionError::WrongEngineKind { .. }
            | SessionError::EmptyMessage => AppError::BadRequest(message),
            SessionError::Transition(_) => AppError::Conflict(message),
            SessionError::RateLimited(e) => AppError::RateLimited(message, e.retry_after),
            SessionError::Transport(_) | SessionError::MalformedReply { .. } => {
                tracing::warn!(error = %message, "Completion failed");
                AppError::BadGateway(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::RateLimited(msg, after) => (StatusCode::TOO_MANY_REQUESTS, msg, after),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
        };

        let mut response = (status, Json(ErrorResponse::new(message))).into_response();
        if let Some(after) = retry_after {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(after.as_secs().max(1)),
            );
        }
        response
    }
}
