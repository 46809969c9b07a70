use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::aggregator::build_dashboard;
use crate::metrics::Range;
use crate::AppState;

#[derive(Deserialize)]
pub struct DataQuery {
    /// Time window for range-scoped fields: "all" (default), "24h", "7d", "30d"
    pub range: Option<String>,
}

/// GET /api/data
///
/// Returns the full dashboard view. Always 200 once the range is valid: when every
/// source fails the body is the zeroed view with an `error` field.
pub async fn get_data(State(state): State<AppState>, Query(params): Query<DataQuery>) -> Response {
    let range = match params.range.as_deref().unwrap_or("all").parse::<Range>() {
        Ok(range) => range,
        Err(msg) => {
            warn!("rejected /api/data request: {}", msg);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response();
        }
    };

    let data = build_dashboard(&state, range).await;
    (StatusCode::OK, Json(data)).into_response()
}

#[cfg(test)]
mod tests {
    use crate::config::DashboardConfig;
    use crate::routes::router;
    use crate::routes::test_support::get_json;
    use crate::sources::files::TRADES_FILE;
    use crate::testing::dead_url;
    use crate::AppState;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_invalid_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(DashboardConfig::for_tests(&dead_url(), dir.path())).unwrap();

        let (status, cache, body) = get_json(router(state), "/api/data?range=1y").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(cache, "no-store, no-cache, must-revalidate");
        assert!(body["error"].as_str().unwrap().contains("1y"));
    }

    #[tokio::test]
    async fn test_data_from_files_with_no_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TRADES_FILE),
            json!({ "balance": 99, "trades": [
                { "timestamp": "2026-02-09T13:00:00Z", "result": "LOSS", "profit": -1 }
            ]})
            .to_string(),
        )
        .unwrap();
        let state = AppState::from_config(DashboardConfig::for_tests(&dead_url(), dir.path())).unwrap();

        let (status, cache, body) = get_json(router(state), "/api/data?range=7d").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache, "no-store, no-cache, must-revalidate");
        assert_eq!(body["_source"], json!("files"));
        assert_eq!(body["performance"]["balance"], json!(99.0));
        assert_eq!(body["performance"]["current_streak"], json!(-1));
        assert!(body["edge_analysis"]["0-5¢"].is_object());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_total_outage_is_still_ok() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(DashboardConfig::for_tests(&dead_url(), dir.path())).unwrap();

        let (status, _, body) = get_json(router(state), "/api/data").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].is_string());
        assert_eq!(body["performance"]["balance"], json!(100.0));
        assert_eq!(body["gate_status"]["threshold"], json!(0.15));
    }
}
