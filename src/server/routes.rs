//! Router configuration for the admin server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/hc", get(handlers::health))
        // Catalog uploads (replace-all)
        .route("/api/upload/keywords", post(handlers::upload_keywords))
        .route("/api/upload/urls", post(handlers::upload_urls))
        // Manual dispatch and job state
        .route("/api/dispatch", post(handlers::dispatch))
        .route("/api/status", get(handlers::job_status))
        .route("/api/report/check", post(handlers::report_check))
        // Diagnostics
        .route("/api/diag/identities", get(handlers::diag_identities))
        .route("/api/diag/hrefs", get(handlers::diag_hrefs))
        .route("/api/diag/match", get(handlers::diag_match))
        .route("/api/diag/crawl", get(handlers::diag_crawl))
        .route("/api/diag/run-test", post(handlers::diag_run_test))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
