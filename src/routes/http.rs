// GET handlers: version, api/readings

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::config::MAX_READINGS_LIMIT;
use crate::models::ReadingView;
use crate::store::SortOrder;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct ReadingsQuery {
    limit: Option<u32>,
}

/// GET /api/readings: latest readings, newest first, with THI and comfort status.
pub(super) async fn readings_handler(
    State(state): State<AppState>,
    Query(query): Query<ReadingsQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(state.config.server.readings_limit)
        .clamp(1, MAX_READINGS_LIMIT);
    let collection = &state.config.collections.readings;
    let docs = match state
        .store
        .find_sorted(
            collection,
            &state.config.fields.timestamp,
            SortOrder::Descending,
            Some(limit),
        )
        .await
    {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!(error = %e, collection = %collection, "readings query failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    tracing::debug!(count = docs.len(), collection = %collection, "readings served");
    let views: Vec<ReadingView> = docs
        .iter()
        .map(|d| ReadingView::from_document(d, &state.config.fields))
        .collect();
    Json(views).into_response()
}
