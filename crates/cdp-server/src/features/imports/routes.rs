//! Import HTTP routes

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::ingest::{ImportOrchestrator, ProgressSnapshot, StartImportError};

pub fn import_routes() -> Router<Arc<ImportOrchestrator>> {
    Router::new()
        .route("/sync", post(start_sync))
        .route("/progress", get(get_progress))
}

/// Start (or resume) the CSV import
///
/// The streaming work runs detached; the response carries the admitted run
/// snapshot so clients can begin polling immediately.
#[tracing::instrument(skip(orchestrator))]
async fn start_sync(
    State(orchestrator): State<Arc<ImportOrchestrator>>,
) -> Result<Response, ImportApiError> {
    let run = orchestrator.start().await?;

    tracing::info!(run_id = %run.id, "Import started via API");

    let snapshot = ProgressSnapshot::from(run);
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(snapshot))).into_response())
}

/// Latest run snapshot, or the IDLE default when nothing ever ran
#[tracing::instrument(skip(orchestrator))]
async fn get_progress(
    State(orchestrator): State<Arc<ImportOrchestrator>>,
) -> Result<Response, ImportApiError> {
    let snapshot = orchestrator.progress().await.map_err(ImportApiError::Progress)?;

    Ok((StatusCode::OK, Json(ApiResponse::success(snapshot))).into_response())
}

#[derive(Debug)]
enum ImportApiError {
    Start(StartImportError),
    Progress(sqlx::Error),
}

impl From<StartImportError> for ImportApiError {
    fn from(err: StartImportError) -> Self {
        Self::Start(err)
    }
}

impl IntoResponse for ImportApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ImportApiError::Start(StartImportError::Source(e)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string())
            },
            ImportApiError::Start(StartImportError::AlreadyRunning) => {
                (StatusCode::CONFLICT, "CONFLICT", self.to_string())
            },
            ImportApiError::Start(StartImportError::Database(_))
            | ImportApiError::Progress(_) => {
                tracing::error!("Database error in import API: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "A database error occurred".to_string(),
                )
            },
        };

        let error = ErrorResponse::new(code, message);
        (status, Json(error)).into_response()
    }
}

impl std::fmt::Display for ImportApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start(e) => write!(f, "{}", e),
            Self::Progress(e) => write!(f, "{}", e),
        }
    }
}
