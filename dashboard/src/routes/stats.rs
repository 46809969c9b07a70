use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::aggregator;
use crate::AppState;

#[derive(Deserialize)]
pub struct StatsQuery {
    /// "paper" (default) or "live"
    pub mode: Option<String>,
}

/// GET /api/stats
///
/// Per-strategy stats from the bot, or computed from fallback trades when it is down.
pub async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> impl IntoResponse {
    let mode = params.mode.unwrap_or_else(|| "paper".to_string());
    if !["paper", "live"].contains(&mode.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid mode. Use paper or live" })),
        );
    }

    let (source, stats) = aggregator::stats(&state, &mode).await;
    (
        StatusCode::OK,
        Json(json!({ "stats": stats, "_source": source })),
    )
}
