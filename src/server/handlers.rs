//! HTTP request handlers for the admin server.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::catalog::{dedupe_keywords, dedupe_urls};
use crate::diagnostics;
use crate::models::{KeywordEntry, RegisteredUrlEntry};
use crate::orchestrator::RunOutcome;

/// Default keyword cap for manual dispatch.
const DEFAULT_DISPATCH_LIMIT: i64 = 100;

/// Error response with a JSON body.
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

    fn internal(e: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// Liveness probe.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Replace the keyword catalog.
pub async fn upload_keywords(
    State(state): State<AppState>,
    Json(entries): Json<Vec<KeywordEntry>>,
) -> ApiResult {
    let entries = dedupe_keywords(entries);
    let inserted = state
        .db
        .keywords()
        .replace_all(&entries)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "message": "keywords replaced", "inserted": inserted })))
}

/// Replace the registered URL catalog.
pub async fn upload_urls(
    State(state): State<AppState>,
    Json(entries): Json<Vec<RegisteredUrlEntry>>,
) -> ApiResult {
    let entries = dedupe_urls(entries);
    let inserted = state
        .db
        .urls()
        .replace_all(&entries)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "message": "urls replaced", "inserted": inserted })))
}

#[derive(Debug, Deserialize)]
pub struct DispatchParams {
    limit: Option<i64>,
}

/// Manual dispatch over the first `limit` keywords; bypasses the daily lock.
pub async fn dispatch(
    State(state): State<AppState>,
    Query(params): Query<DispatchParams>,
) -> ApiResult {
    let limit = params.limit.unwrap_or(DEFAULT_DISPATCH_LIMIT);
    if limit < 1 {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "limit must be positive"));
    }

    let outcome = state
        .orchestrator
        .dispatch_manual(limit)
        .await
        .map_err(ApiError::internal)?;
    let status = outcome.label();

    match outcome {
        RunOutcome::Dispatched { summary, handle } => {
            tokio::spawn(async move {
                match handle.wait().await {
                    Ok(done) => tracing::info!("Manual dispatch finished: {}", done.label()),
                    Err(e) => tracing::error!("Manual dispatch failed: {}", e),
                }
            });
            let mut body = serde_json::to_value(&summary).map_err(ApiError::internal)?;
            body["status"] = json!(status);
            Ok(Json(body))
        }
        RunOutcome::NoKeywordsForServer { server_id } => {
            Ok(Json(json!({ "status": status, "server_id": server_id })))
        }
        RunOutcome::AlreadyRunning { server_id } => {
            Ok(Json(json!({ "status": status, "server_id": server_id })))
        }
        RunOutcome::NoKeywords => Ok(Json(json!({ "status": status }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct DateParams {
    date: Option<NaiveDate>,
}

/// Progress of the job for a day (today by default).
pub async fn job_status(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> ApiResult {
    let date = params.date.unwrap_or_else(|| state.orchestrator.today());
    let status = state
        .db
        .jobs()
        .status(date)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no job for {}", date)))?;

    let complete = status.is_complete();
    let mut body = serde_json::to_value(&status).map_err(ApiError::internal)?;
    body["complete"] = json!(complete);
    Ok(Json(body))
}

/// Re-run the completion check for a day's job.
pub async fn report_check(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> ApiResult {
    let date = params.date.unwrap_or_else(|| state.orchestrator.today());
    let job = state
        .db
        .jobs()
        .get_by_date(date)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no job for {}", date)))?;

    let outcome = state
        .trigger
        .check(job.id)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "label": outcome.label(), "outcome": outcome })))
}

/// Probe the first few egress identities.
pub async fn diag_identities(State(state): State<AppState>) -> ApiResult {
    let probe = diagnostics::probe_identities(&state.processor).await;
    serde_json::to_value(probe)
        .map(Json)
        .map_err(ApiError::internal)
}

#[derive(Debug, Deserialize)]
pub struct KeywordParams {
    keyword: String,
}

/// Every href on the result page for a keyword.
pub async fn diag_hrefs(
    State(state): State<AppState>,
    Query(params): Query<KeywordParams>,
) -> ApiResult {
    let dump = diagnostics::dump_hrefs(&state.processor, &params.keyword)
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()))?;
    serde_json::to_value(dump)
        .map(Json)
        .map_err(ApiError::internal)
}

/// Matching trace for a keyword against its registered URLs.
pub async fn diag_match(
    State(state): State<AppState>,
    Query(params): Query<KeywordParams>,
) -> ApiResult {
    let report = diagnostics::trace_match(&state.processor, &state.db.urls(), &params.keyword)
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()))?;
    serde_json::to_value(report)
        .map(Json)
        .map_err(ApiError::internal)
}

#[derive(Debug, Deserialize)]
pub struct CrawlParams {
    keywords: String,
}

/// Run the pipeline for comma separated keywords without persisting.
pub async fn diag_crawl(
    State(state): State<AppState>,
    Query(params): Query<CrawlParams>,
) -> ApiResult {
    let keywords = diagnostics::split_keywords(&params.keywords);
    if keywords.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "no keywords given"));
    }
    let result = diagnostics::crawl_test(&state.processor, &state.db.urls(), &keywords).await;
    serde_json::to_value(result)
        .map(Json)
        .map_err(ApiError::internal)
}

/// Crawl comma separated keywords and mail the workbook without a job.
pub async fn diag_run_test(
    State(state): State<AppState>,
    Query(params): Query<CrawlParams>,
) -> ApiResult {
    let keywords = diagnostics::split_keywords(&params.keywords);
    if keywords.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "no keywords given"));
    }
    let template = diagnostics::test_template(&state.settings.report);
    let result = diagnostics::run_test(
        &state.processor,
        &state.db.urls(),
        &keywords,
        &template,
        state.sender.as_ref(),
        state.orchestrator.today(),
    )
    .await
    .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()))?;
    serde_json::to_value(result)
        .map(Json)
        .map_err(ApiError::internal)
}
