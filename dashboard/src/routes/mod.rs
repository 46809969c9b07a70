pub mod data;
pub mod equity;
pub mod health;
pub mod near_misses;
pub mod stats;

use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::AppState;

/// Every response is live data; browsers and proxies must never cache it.
const NO_STORE: &str = "no-store, no-cache, must-revalidate";

/// Paths served, for the startup log.
pub const ROUTES: [&str; 5] = [
    "GET  /api/data?range=all|24h|7d|30d",
    "GET  /api/stats?mode=paper|live",
    "GET  /api/near-misses?limit=50",
    "GET  /api/equity?points=300",
    "GET  /api/health",
];

pub fn router(state: AppState) -> Router {
    // Public read-only API: any origin may fetch it.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/data", get(data::get_data))
        .route("/api/stats", get(stats::get_stats))
        .route("/api/near-misses", get(near_misses::get_near_misses))
        .route("/api/equity", get(equity::get_equity))
        .route("/api/health", get(health::health))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(NO_STORE),
        ))
        .layer(cors)
        .with_state(state)
}

/// Parse an integer query parameter and clamp it, falling back to `default` when it is
/// missing or not a number.
pub(crate) fn clamped(raw: Option<&str>, default: usize, min: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(min as i64, max as i64) as usize)
        .unwrap_or(default)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::testing::dead_url;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_clamped() {
        assert_eq!(clamped(None, 50, 1, 500), 50);
        assert_eq!(clamped(Some("abc"), 50, 1, 500), 50);
        assert_eq!(clamped(Some("0"), 50, 1, 500), 1);
        assert_eq!(clamped(Some("-3"), 50, 1, 500), 1);
        assert_eq!(clamped(Some("9999"), 50, 1, 500), 500);
        assert_eq!(clamped(Some(" 20 "), 50, 1, 500), 20);
    }

    #[tokio::test]
    async fn test_cors_preflight_and_unknown_route() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(DashboardConfig::for_tests(&dead_url(), dir.path())).unwrap();

        let resp = router(state.clone())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/data")
                    .header("origin", "https://example.com")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");

        let resp = router(state)
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
