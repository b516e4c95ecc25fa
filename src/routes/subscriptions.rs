//! Feed subscriptions and the manual update trigger

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::models::{AddSubscriptionRequest, PipelineTrigger, UrlQuery};
use crate::AppState;

/// GET /api/subscriptions
pub async fn list_subscriptions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscriptions = state.subscriptions.list().await;
    Json(serde_json::json!({
        "total": subscriptions.len(),
        "subscriptions": subscriptions,
    }))
}

/// POST /api/subscriptions
pub async fn add_subscription(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state.subscriptions.add(&request.url, request.name).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// DELETE /api/subscriptions?url=
pub async fn remove_subscription(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.subscriptions.remove(&query.url).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "url": query.url,
    })))
}

/// POST /api/update - run the pipeline now and return its summary
pub async fn trigger_update(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.pipeline.run(PipelineTrigger::Manual).await?;
    Ok(Json(summary))
}
