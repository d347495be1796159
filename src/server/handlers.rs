//! Request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::dispatch::{dispatch, AnalysisRequest};
use crate::error::ServiceError;
use crate::report::ApiResponse;
use crate::session::AnalysisSession;

/// GET carries no body and runs the default action
pub async fn analyze_get(State(session): State<Arc<AnalysisSession>>) -> Result<Response, ServiceError> {
    run(session, AnalysisRequest::default()).await
}

pub async fn analyze_post(
    State(session): State<Arc<AnalysisSession>>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    run(session, AnalysisRequest::from_body(&body)).await
}

/// Analysis is CPU-bound and runs on the blocking pool; a panic there becomes a 500
async fn run(session: Arc<AnalysisSession>, request: AnalysisRequest) -> Result<Response, ServiceError> {
    let response = tokio::task::spawn_blocking(move || dispatch(&session, &request))
        .await
        .map_err(|e| ServiceError::Internal(format!("analysis task aborted: {}", e)))??;
    Ok(json(StatusCode::OK, response))
}

/// CORS preflight
pub async fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
            (header::ACCESS_CONTROL_MAX_AGE, "3600"),
        ],
    )
        .into_response()
}

pub async fn method_not_allowed() -> Response {
    json(
        StatusCode::METHOD_NOT_ALLOWED,
        ApiResponse::failure("Method not allowed. Use GET, POST or OPTIONS."),
    )
}

pub async fn not_found() -> Response {
    json(
        StatusCode::NOT_FOUND,
        ApiResponse::failure("Not found. Send requests to / or /analisar."),
    )
}

fn json(status: StatusCode, body: ApiResponse) -> Response {
    (status, [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(body)).into_response()
}
