use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{get_json, SourceError};
use crate::config::DashboardConfig;
use crate::types::num;

/// Length of one Polymarket BTC up/down market.
const WINDOW_MINUTES: u32 = 15;

/// The Polymarket market for the current 15-minute window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMarket {
    pub slug: String,
    pub yes_price: f64,
    pub no_price: f64,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(default, rename = "outcomePrices")]
    outcome_prices: Value,
}

/// Public market data: BTC spot price and the Polymarket window prices.
#[derive(Clone)]
pub struct MarketClient {
    http: reqwest::Client,
    coingecko_url: String,
    gamma_url: String,
    timeout: Duration,
}

impl MarketClient {
    pub fn new(http: reqwest::Client, config: &DashboardConfig) -> Self {
        Self {
            http,
            coingecko_url: config.coingecko_url.clone(),
            gamma_url: config.gamma_api_url.clone(),
            timeout: config.market_timeout(),
        }
    }

    /// BTC/USD from CoinGecko's simple price endpoint.
    pub async fn btc_price(&self) -> Result<f64, SourceError> {
        let req = self
            .http
            .get(format!("{}/simple/price", self.coingecko_url))
            .query(&[("ids", "bitcoin"), ("vs_currencies", "usd")])
            .timeout(self.timeout);
        let body: Value = get_json("coingecko", req).await?;
        body.pointer("/bitcoin/usd")
            .and_then(num)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| SourceError::Decode("coingecko", "no bitcoin.usd price".into()))
    }

    /// The `btc-updown-15m-{ts}` market for the window containing `now`, if listed yet.
    pub async fn window_market(&self, now: DateTime<Utc>) -> Result<Option<WindowMarket>, SourceError> {
        let slug = window_slug(now);
        let req = self
            .http
            .get(format!("{}/markets", self.gamma_url))
            .query(&[("slug", slug.as_str())])
            .timeout(self.timeout);
        let markets: Vec<GammaMarket> = get_json("gamma", req).await?;

        Ok(markets.into_iter().next().map(|m| {
            let prices = outcome_prices(&m.outcome_prices);
            WindowMarket {
                slug,
                yes_price: prices.first().copied().unwrap_or(0.5),
                no_price: prices.get(1).copied().unwrap_or(0.5),
            }
        }))
    }
}

/// Start of the 15-minute UTC window containing `now`.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let minute = now.minute() - now.minute() % WINDOW_MINUTES;
    now.with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

pub fn window_slug(now: DateTime<Utc>) -> String {
    format!("btc-updown-15m-{}", window_start(now).timestamp())
}

/// Gamma sends `outcomePrices` either as an array or as a JSON-encoded string of one.
fn outcome_prices(raw: &Value) -> Vec<f64> {
    let parsed;
    let arr = match raw {
        Value::Array(items) => items,
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).unwrap_or(Value::Null);
            match &parsed {
                Value::Array(items) => items,
                _ => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };
    arr.iter().map(|v| num(v).unwrap_or(0.5)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spawn_stub, test_client};
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_window_start_floors_to_quarter_hour() {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 13, 44, 59).unwrap();
        let start = window_start(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 9, 13, 30, 0).unwrap());
        assert_eq!(window_slug(now), format!("btc-updown-15m-{}", start.timestamp()));

        let exact = Utc.with_ymd_and_hms(2026, 2, 9, 13, 0, 0).unwrap();
        assert_eq!(window_start(exact), exact);
    }

    #[test]
    fn test_outcome_prices_shapes() {
        assert_eq!(outcome_prices(&json!(["0.61", "0.39"])), vec![0.61, 0.39]);
        assert_eq!(outcome_prices(&json!("[\"0.2\", \"0.8\"]")), vec![0.2, 0.8]);
        assert!(outcome_prices(&json!("not json")).is_empty());
        assert!(outcome_prices(&Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_btc_price_and_window_market() {
        let app = Router::new()
            .route(
                "/simple/price",
                get(|| async { Json(json!({ "bitcoin": { "usd": 97123.5 } })) }),
            )
            .route(
                "/markets",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let now = Utc.with_ymd_and_hms(2026, 2, 9, 13, 7, 0).unwrap();
                    if q.get("slug") != Some(&window_slug(now)) {
                        return Json(json!([]));
                    }
                    Json(json!([{ "outcomePrices": "[\"0.55\", \"0.45\"]", "liquidity": "1200.5" }]))
                }),
            );
        let url = spawn_stub(app).await;
        let cfg = DashboardConfig::for_tests(&url, std::path::Path::new("unused"));
        let market = MarketClient::new(test_client(), &cfg);

        assert_eq!(market.btc_price().await.unwrap(), 97123.5);

        let now = Utc.with_ymd_and_hms(2026, 2, 9, 13, 7, 0).unwrap();
        let m = market.window_market(now).await.unwrap().unwrap();
        assert_eq!(m.yes_price, 0.55);
        assert_eq!(m.no_price, 0.45);
        assert_eq!(m.slug, window_slug(now));
    }

    #[tokio::test]
    async fn test_unlisted_window_is_none() {
        let app = Router::new().route("/markets", get(|| async { Json(json!([])) }));
        let url = spawn_stub(app).await;
        let cfg = DashboardConfig::for_tests(&url, std::path::Path::new("unused"));
        let market = MarketClient::new(test_client(), &cfg);

        assert_eq!(market.window_market(Utc::now()).await.unwrap(), None);
    }
}
