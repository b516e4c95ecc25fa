use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use super::ApiError;
use crate::models::{CheckRun, StartCheckRequest};
use crate::services::checker::{CheckOptions, CheckSelection};
use crate::AppState;

#[derive(Serialize)]
struct ProgressResponse {
    #[serde(flatten)]
    run: CheckRun,
    percent: f64,
}

/// POST /api/check - start a background run (202), 409 while one is active
pub async fn start_check(
    State(state): State<Arc<AppState>>,
    request: Option<Json<StartCheckRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let config = &state.config;

    let options = CheckOptions::new(
        request.concurrency.unwrap_or(config.check_concurrency),
        request.timeout_ms.unwrap_or(config.check_timeout_ms),
        request.auto_repair.unwrap_or(config.auto_repair),
    )?;

    let selection = match (request.urls, request.group) {
        (Some(urls), _) => CheckSelection::Urls(urls),
        (None, Some(group)) if !group.trim().is_empty() => CheckSelection::Group(group),
        _ => CheckSelection::All,
    };

    let run = state.checker.start_check(selection, options).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// GET /api/check/progress - current or last run, null before the first
pub async fn check_progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let progress = state.checker.progress().map(|run| ProgressResponse {
        percent: run.percent(),
        run,
    });
    Json(progress)
}
