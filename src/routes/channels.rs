use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

use super::ApiError;
use crate::error::CoreError;
use crate::models::{CatalogQuery, GroupsResponse, UrlQuery};
use crate::AppState;

/// GET /api/channels?group=&search=&status=&limit=&offset=
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> impl IntoResponse {
    let page = state
        .catalog
        .read()
        .await
        .query(&query, state.config.max_items_page);
    Json(page)
}

/// GET /api/groups
pub async fn list_groups(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let groups = state.catalog.read().await.groups();
    Json(GroupsResponse {
        total: groups.len(),
        groups,
    })
}

/// DELETE /api/channels?url=
pub async fn delete_channel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (removed, channels) = {
        let mut catalog = state.catalog.write().await;
        let removed = catalog
            .remove(&query.url)
            .ok_or_else(|| CoreError::ChannelNotFound(query.url.clone()))?;
        (removed, catalog.channels().to_vec())
    };

    state.store.save_catalog(&channels).await.map_err(CoreError::from)?;
    tracing::info!("Channel removed: {}", removed.url);

    Ok(Json(serde_json::json!({
        "success": true,
        "removed": removed,
    })))
}

/// POST /api/cleanup - drop channels offline beyond the retention window
pub async fn cleanup_offline(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let retention = Duration::hours(state.config.offline_retention_hours.max(0));

    let (report, channels) = {
        let mut catalog = state.catalog.write().await;
        let report = catalog.cleanup_offline(retention, Utc::now());
        (report, catalog.channels().to_vec())
    };

    if report.removed > 0 {
        state.store.save_catalog(&channels).await.map_err(CoreError::from)?;
        tracing::info!(
            "Cleanup: removed {} offline channels, {} remaining",
            report.removed,
            report.remaining
        );
    }

    Ok(Json(report))
}
