use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::clamped;
use crate::aggregator::{self, DEFAULT_NEAR_MISSES};
use crate::AppState;

const MAX_NEAR_MISSES: usize = 500;

#[derive(Deserialize)]
pub struct NearMissQuery {
    pub limit: Option<String>,
}

/// GET /api/near-misses
///
/// Signals the bot declined to trade, newest first. `limit` is clamped to 1..=500.
pub async fn get_near_misses(
    State(state): State<AppState>,
    Query(params): Query<NearMissQuery>,
) -> impl IntoResponse {
    let limit = clamped(params.limit.as_deref(), DEFAULT_NEAR_MISSES, 1, MAX_NEAR_MISSES);
    let (source, near_misses) = aggregator::near_misses(&state, limit).await;
    (
        StatusCode::OK,
        Json(json!({ "near_misses": near_misses, "_source": source })),
    )
}
