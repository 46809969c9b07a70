use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{decode_list, get_json, SourceError};
use crate::config::DashboardConfig;
use crate::types::{
    lenient, CurrentRegime, FundingRate, GateStats, GateStatus, LiveSignal, LiveTrading, NearMiss,
    StatRow, StrategyRanking, TradeBook,
};

/// Everything the bot publishes on `GET /api/live`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotLive {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub trades: TradeBook,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub signal: Option<LiveSignal>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub rankings: Vec<StrategyRanking>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub gate_status: Option<GateStatus>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub gate_stats: Option<GateStats>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub funding_rate: Option<FundingRate>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub orderbook_imbalance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number_map")]
    pub strategies_config: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub current_regime: Option<CurrentRegime>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub live_trading: Option<LiveTrading>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub near_misses: Vec<NearMiss>,
}

/// HTTP client for the trading bot's data server.
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl BotClient {
    pub fn new(http: reqwest::Client, config: &DashboardConfig) -> Self {
        Self {
            http,
            base_url: config.bot_api_url.clone(),
            api_key: config.bot_api_key.clone(),
            timeout: config.bot_timeout(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Cache-Control", "no-store")
            .timeout(self.timeout);

        // Older bot builds check the bearer token, newer ones the X-API-Key header.
        if !self.api_key.is_empty() {
            req = req
                .bearer_auth(&self.api_key)
                .header("X-API-Key", &self.api_key);
        }
        req
    }

    /// `GET /api/live`: trades, current signal, rankings and gate state in one payload.
    pub async fn live(&self) -> Result<BotLive, SourceError> {
        let live: BotLive = get_json("bot /api/live", self.get("/api/live")).await?;
        debug!(
            "bot /api/live: {} trades, {} rankings",
            live.trades.trades.as_ref().map_or(0, Vec::len),
            live.rankings.len()
        );
        Ok(live)
    }

    /// `GET /api/stats?mode=`: per-strategy stats for paper or live trading.
    pub async fn stats(&self, mode: &str) -> Result<Vec<StatRow>, SourceError> {
        let body: Value =
            get_json("bot /api/stats", self.get("/api/stats").query(&[("mode", mode)])).await?;
        decode_list("bot /api/stats", body, "stats")
    }

    /// `GET /api/near-misses?limit=`: recent signals the bot declined to trade.
    pub async fn near_misses(&self, limit: usize) -> Result<Vec<NearMiss>, SourceError> {
        let body: Value = get_json(
            "bot /api/near-misses",
            self.get("/api/near-misses").query(&[("limit", limit)]),
        )
        .await?;
        decode_list("bot /api/near-misses", body, "near_misses")
    }

    /// `GET /api/health`, passed through untouched.
    pub async fn health(&self) -> Result<Value, SourceError> {
        get_json("bot /api/health", self.get("/api/health")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spawn_stub, test_client};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    fn client_for(url: &str) -> BotClient {
        let cfg = DashboardConfig::for_tests(url, std::path::Path::new("unused"));
        BotClient::new(test_client(), &cfg)
    }

    #[tokio::test]
    async fn test_live_sends_auth_and_decodes() {
        let app = Router::new().route(
            "/api/live",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer test-key" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "no" })));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "trades": { "balance": "104.5", "trades": [
                            { "timestamp": "2026-02-09T13:00:00Z", "result": "WIN", "profit": 1.0 }
                        ]},
                        "signal": { "action": "BUY_UP", "confidence": 0.71, "ensemble": "x" },
                        "rankings": [{ "name": "momentum", "sortino": "1.2" }],
                        "strategies_config": { "momentum": 1, "bad": "??" },
                        "mode": "paper"
                    })),
                )
            }),
        );
        let url = spawn_stub(app).await;

        let live = client_for(&url).live().await.unwrap();
        assert_eq!(live.trades.balance, Some(104.5));
        assert_eq!(live.trades.trades.as_ref().map(Vec::len), Some(1));
        let signal = live.signal.unwrap();
        assert_eq!(signal.action.as_deref(), Some("BUY_UP"));
        assert_eq!(signal.extra["ensemble"], json!("x"));
        assert_eq!(live.rankings[0].sortino, Some(1.2));
        assert_eq!(live.strategies_config.len(), 1);
        assert!(live.gate_status.is_none());
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let app = Router::new().route(
            "/api/live",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let url = spawn_stub(app).await;

        let err = client_for(&url).live().await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status, .. } if status == StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn test_slow_bot_times_out() {
        let app = Router::new().route(
            "/api/live",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let url = spawn_stub(app).await;

        let err = client_for(&url).live().await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_list_endpoints_accept_both_shapes() {
        let app = Router::new()
            .route(
                "/api/stats",
                get(|| async {
                    Json(json!({ "stats": [{ "strategy_name": "momentum", "wins": 3, "total_trades": 4 }] }))
                }),
            )
            .route(
                "/api/near-misses",
                get(|| async {
                    Json(json!([{ "id": 1, "strategy": "rsi", "would_have_won": null }]))
                }),
            );
        let url = spawn_stub(app).await;
        let bot = client_for(&url);

        let stats = bot.stats("paper").await.unwrap();
        assert_eq!(stats[0].strategy_name, "momentum");
        assert_eq!(stats[0].wins, 3);

        let misses = bot.near_misses(10).await.unwrap();
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].would_have_won, None);
    }

    #[test]
    fn test_odd_fields_do_not_reject_live_payload() {
        let live: BotLive = serde_json::from_value(json!({
            "trades": { "balance": 99.0, "trades": [
                null,
                { "timestamp": "2026-02-09T13:00:00Z", "result": "WIN", "price": 0.52, "buy_price": 0.52, "profit": 1.0, "pnl": 1.0 },
                { "timestamp": "2026-02-09T13:15:00Z", "result": "LOSS", "pnl": -1.0 }
            ]},
            "signal": { "action": "BUY_UP", "market": "closed" },
            "gate_status": { "atr_pct": 0.2, "is_open": null },
            "gate_stats": "n/a",
            "funding_rate": [],
            "current_regime": 7,
            "live_trading": { "balance_usdc": 12.0, "open_positions": [null] }
        }))
        .unwrap();

        let trades = live.trades.trades.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].entry_price(), Some(0.52));
        assert_eq!(trades[1].profit(), -1.0);
        assert!(live.signal.unwrap().market.is_none());
        let gate = live.gate_status.unwrap();
        assert!(gate.is_open);
        assert_eq!(gate.atr_pct, 0.2);
        assert!(live.gate_stats.is_none());
        assert!(live.funding_rate.is_none());
        assert!(live.current_regime.is_none());
        let lt = live.live_trading.unwrap();
        assert_eq!(lt.balance_usdc, 12.0);
        assert!(lt.open_positions.is_empty());

        let live: BotLive = serde_json::from_value(json!({ "trades": null })).unwrap();
        assert!(live.trades.trades.is_none());
    }

    #[test]
    fn test_decode_list_rejects_wrong_shape() {
        let err = decode_list::<StatRow>("t", json!({ "rows": [] }), "stats").unwrap_err();
        assert!(matches!(err, SourceError::Decode(..)));
        let err = decode_list::<StatRow>("t", json!(3), "stats").unwrap_err();
        assert!(matches!(err, SourceError::Decode(..)));
    }
}
