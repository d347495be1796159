//! Router construction

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::session::AnalysisSession;

/// Build the router serving the analysis endpoint at `/` and `/analisar`
pub fn create_router(session: Arc<AnalysisSession>) -> Router {
    let endpoint = || {
        get(handlers::analyze_get)
            .post(handlers::analyze_post)
            .options(handlers::preflight)
            .fallback(handlers::method_not_allowed)
    };

    Router::new()
        .route("/", endpoint())
        .route("/analisar", endpoint())
        .fallback(handlers::not_found)
        .with_state(session)
        .layer(TraceLayer::new_for_http())
}
