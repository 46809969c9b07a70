use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::clamped;
use crate::aggregator;
use crate::metrics;
use crate::sources::Source;
use crate::AppState;

const DEFAULT_POINTS: usize = 300;
const MIN_POINTS: usize = 2;
const MAX_POINTS: usize = 1000;

#[derive(Deserialize)]
pub struct EquityQuery {
    pub points: Option<String>,
}

/// GET /api/equity
///
/// Balance after each completed trade, downsampled to at most `points` (2..=1000).
pub async fn get_equity(
    State(state): State<AppState>,
    Query(params): Query<EquityQuery>,
) -> impl IntoResponse {
    let points = clamped(params.points.as_deref(), DEFAULT_POINTS, MIN_POINTS, MAX_POINTS);

    let (source, equity) = match aggregator::trade_book(&state).await {
        Some((source, book)) => {
            let initial = book.initial_balance.unwrap_or(state.config.initial_balance);
            let trades = book.trades.unwrap_or_default();
            (source, metrics::equity_curve(&trades, initial, points))
        }
        None => (Source::None, Vec::new()),
    };

    (
        StatusCode::OK,
        Json(json!({ "equity": equity, "_source": source })),
    )
}
