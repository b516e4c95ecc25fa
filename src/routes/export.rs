use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::ApiError;
use crate::error::CoreError;
use crate::models::ExportQuery;
use crate::services::exporter;
use crate::AppState;

async fn render(state: &AppState, query: &ExportQuery) -> Result<impl IntoResponse, ApiError> {
    let export = {
        let catalog = state.catalog.read().await;
        exporter::export(&catalog, query).map_err(CoreError::from)?
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", export.filename),
            ),
        ],
        export.body,
    ))
}

/// GET /api/export?format=m3u|json&group=&only_online=
pub async fn export_catalog(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    render(&state, &query).await
}

/// GET /playlist.m3u - the whole catalog for players
pub async fn full_playlist(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    render(&state, &ExportQuery::default()).await
}
