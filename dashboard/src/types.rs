use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Predicted move for a 15-minute BTC window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up,
    Down,
    #[default]
    Unknown,
}

impl Direction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UP" | "YES" | "LONG" => Direction::Up,
            "DOWN" | "NO" | "SHORT" => Direction::Down,
            _ => Direction::Unknown,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Outcome of a trade. Anything the bot reports that is not a win or a loss is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradeResult {
    Win,
    Loss,
    #[default]
    Pending,
}

impl TradeResult {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WIN" | "WON" => TradeResult::Win,
            "LOSS" | "LOST" => TradeResult::Loss,
            _ => TradeResult::Pending,
        }
    }

    pub fn is_completed(self) -> bool {
        !matches!(self, TradeResult::Pending)
    }
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
            TradeResult::Pending => write!(f, "PENDING"),
        }
    }
}

/// One bot trade as exported by the bot, its JSON files or its SQLite database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: String,
    /// Raw direction as reported; see [`Trade::direction`].
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Entry price as a probability (0..1). Older exports call it `buy_price`.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub buy_price_cents: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    /// Raw outcome as reported; see [`Trade::result`].
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    /// SQLite rows name the realised profit `pnl`.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_u32", skip_serializing_if = "Option::is_none")]
    pub entry_minute: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub edge: Option<f64>,
    /// Strategy name -> the direction that strategy voted for.
    #[serde(default, deserialize_with = "lenient::votes", skip_serializing_if = "BTreeMap::is_empty")]
    pub indicators: BTreeMap<String, Direction>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub volatility_regime: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub market_regime: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub orderbook_imbalance: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trade {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    pub fn direction(&self) -> Direction {
        self.direction.as_deref().map(Direction::parse).unwrap_or_default()
    }

    pub fn result(&self) -> TradeResult {
        self.result.as_deref().map(TradeResult::parse).unwrap_or_default()
    }

    pub fn is_completed(&self) -> bool {
        self.result().is_completed()
    }

    pub fn is_win(&self) -> bool {
        self.result() == TradeResult::Win
    }

    /// Realised profit, from `profit` or `pnl`; 0 while unknown.
    pub fn profit(&self) -> f64 {
        self.profit.or(self.pnl).unwrap_or(0.0)
    }

    /// Entry price as a probability, from `price`, `buy_price` or `buy_price_cents`.
    pub fn entry_price(&self) -> Option<f64> {
        self.price
            .or(self.buy_price)
            .or_else(|| self.buy_price_cents.map(|c| c / 100.0))
    }

    /// Reported edge, else model confidence minus the market-implied probability.
    pub fn effective_edge(&self) -> f64 {
        if let Some(edge) = self.edge {
            return edge;
        }
        match (self.confidence, self.entry_price()) {
            (Some(conf), Some(price))
                if (0.0..=1.0).contains(&conf) && (0.0..=1.0).contains(&price) =>
            {
                conf - price
            }
            _ => 0.0,
        }
    }
}

/// `data/trades.json` and the `trades` block of the bot's live payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeBook {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub balance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub initial_balance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_vec")]
    pub trades: Option<Vec<Trade>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    #[serde(default, deserialize_with = "lenient::f64")]
    pub yes_price: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub no_price: f64,
}

/// Current market window state as published by the bot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveSignal {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub window_start: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub window_end: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub btc_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketPrices>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub orderbook_imbalance: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-strategy ranking. Bot-provided keys the dashboard does not know are passed through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyRanking {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub live_trades: u32,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub live_win_rate: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub live_pnl: f64,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub live_wins: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub live_losses: u32,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub ev: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub sortino: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub max_dd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub p_dd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub avg_confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_i64", skip_serializing_if = "Option::is_none")]
    pub streak: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateStatus {
    #[serde(default, deserialize_with = "lenient::f64")]
    pub atr_pct: f64,
    #[serde(default = "default_gate_threshold", deserialize_with = "lenient::f64")]
    pub threshold: f64,
    #[serde(default = "default_true", deserialize_with = "lenient::bool_or_true")]
    pub is_open: bool,
}

impl Default for GateStatus {
    fn default() -> Self {
        Self {
            atr_pct: 0.0,
            threshold: default_gate_threshold(),
            is_open: true,
        }
    }
}

fn default_gate_threshold() -> f64 {
    0.15
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateStats {
    #[serde(default, deserialize_with = "lenient::u64")]
    pub windows_checked: u64,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub windows_traded: u64,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub windows_skipped: u64,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub windows_passed_gate: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    #[serde(default, deserialize_with = "lenient::string")]
    pub direction: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentRegime {
    #[serde(default = "unknown", deserialize_with = "lenient::string")]
    pub volatility: String,
    #[serde(default = "unknown", deserialize_with = "lenient::string")]
    pub market: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

impl Default for CurrentRegime {
    fn default() -> Self {
        Self {
            volatility: unknown(),
            market: unknown(),
            volume: None,
        }
    }
}

fn unknown() -> String {
    "unknown".to_string()
}

/// A signal the bot saw but did not trade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NearMiss {
    #[serde(default, deserialize_with = "lenient::i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub strategy: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub direction: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub signal_strength: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub threshold: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub reason_skipped: String,
    /// 1 = would have won, 0 = would have lost, null = window not resolved yet.
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub would_have_won: Option<i64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub btc_move_pct: f64,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub entry_minute: u32,
}

/// Per-strategy stats row served by `/api/stats`. `win_rate` is a fraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatRow {
    #[serde(default, deserialize_with = "lenient::string")]
    pub strategy_name: String,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub total_trades: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub wins: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub losses: u32,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub total_pnl: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub max_drawdown: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivePosition {
    #[serde(default, deserialize_with = "lenient::string")]
    pub market: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub side: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub entry_price: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub current_price: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub pnl: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub strategy: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub opened_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveOrder {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub market: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub side: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub strategy: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Real-money account state, only present when the bot trades live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveTrading {
    #[serde(default, deserialize_with = "lenient::f64")]
    pub balance_usdc: f64,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub open_positions: Vec<LivePosition>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub recent_orders: Vec<LiveOrder>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub daily_pnl: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub total_pnl: f64,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub total_trades: u32,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub win_rate: f64,
}

/// Parse the timestamp formats the bot has used: RFC 3339, naive ISO / SQLite datetimes
/// (taken as UTC), and unix epochs in seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(epoch) = raw.parse::<f64>() {
        let millis = if epoch.abs() >= 1e12 { epoch } else { epoch * 1000.0 };
        return Utc.timestamp_millis_opt(millis as i64).single();
    }

    None
}

/// Convert a loosely typed JSON value to a finite number.
pub fn num(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Serde adapters for the bot's loosely typed JSON: numbers may arrive as strings,
/// anything may be null, and a bad value degrades to the default instead of failing.
pub mod lenient {
    use super::*;

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(opt_f64(d)?.unwrap_or(0.0))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(num(&v))
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(opt_u32(d)?.unwrap_or(0))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(num(&v).filter(|n| *n >= 0.0).map(|n| n as u32))
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(num(&v).filter(|n| *n >= 0.0).map(|n| n as u64).unwrap_or(0))
    }

    pub fn i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(opt_i64(d)?.unwrap_or(0))
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(num(&v).map(|n| n as i64))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Any value that degrades to `None` when it is absent, null or does not decode.
    pub fn opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let v = Value::deserialize(d)?;
        Ok(serde_json::from_value(v).ok())
    }

    /// A value that falls back to its default when it does not decode.
    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned + Default,
    {
        Ok(opt(d)?.unwrap_or_default())
    }

    /// A list whose malformed elements are dropped rather than failing the whole payload.
    pub fn vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let v = Value::deserialize(d)?;
        Ok(match v {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Like [`vec`], but a missing or non-list value stays `None`.
    pub fn opt_vec<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let v = Value::deserialize(d)?;
        let Value::Array(items) = v else {
            return Ok(None);
        };
        Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ))
    }

    pub fn bool_or_true<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(match &v {
            Value::Bool(b) => *b,
            Value::Number(_) => num(&v).map_or(true, |n| n != 0.0),
            Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"),
            _ => true,
        })
    }

    pub fn votes<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Direction>, D::Error> {
        let v = Value::deserialize(d)?;
        let Value::Object(map) = v else {
            return Ok(BTreeMap::new());
        };
        Ok(map
            .into_iter()
            .filter_map(|(name, vote)| vote.as_str().map(|s| (name, Direction::parse(s))))
            .collect())
    }

    pub fn number_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, f64>, D::Error> {
        let v = Value::deserialize(d)?;
        let Value::Object(map) = v else {
            return Ok(BTreeMap::new());
        };
        Ok(map
            .into_iter()
            .filter_map(|(k, v)| num(&v).map(|n| (k, n)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trade_accepts_stringly_numbers() {
        let t: Trade = serde_json::from_value(json!({
            "id": 42,
            "timestamp": "2026-02-09T13:05:00Z",
            "direction": "up",
            "result": "WIN",
            "profit": "0.87",
            "entry_minute": "3",
            "buy_price": 0.52,
            "confidence": null,
            "indicators": { "momentum": "UP", "rsi": "DOWN", "junk": 5 },
            "note": "kept"
        }))
        .unwrap();

        assert_eq!(t.id.as_deref(), Some("42"));
        assert_eq!(t.direction(), Direction::Up);
        assert_eq!(t.result(), TradeResult::Win);
        assert!((t.profit() - 0.87).abs() < 1e-12);
        assert_eq!(t.entry_minute, Some(3));
        assert_eq!(t.entry_price(), Some(0.52));
        assert_eq!(t.confidence, None);
        assert_eq!(t.indicators.len(), 2);
        assert_eq!(t.indicators["rsi"], Direction::Down);
        assert_eq!(t.extra["note"], json!("kept"));
    }

    #[test]
    fn test_garbage_profit_becomes_zero() {
        let t: Trade = serde_json::from_value(json!({
            "timestamp": "2026-02-09 13:05:00",
            "result": "LOSS",
            "profit": "n/a"
        }))
        .unwrap();
        assert_eq!(t.profit(), 0.0);
        assert_eq!(t.direction(), Direction::Unknown);
        assert!(t.time().is_some());
    }

    #[test]
    fn test_trade_with_both_price_and_pnl_names() {
        let t: Trade = serde_json::from_value(json!({
            "timestamp": "2026-02-09T13:05:00Z",
            "direction": "DOWN",
            "result": "LOSS",
            "price": 0.52,
            "buy_price": 0.55,
            "profit": -1.0,
            "pnl": -0.9
        }))
        .unwrap();

        assert_eq!(t.entry_price(), Some(0.52));
        assert_eq!(t.profit(), -1.0);

        let only_pnl: Trade = serde_json::from_value(json!({ "result": "WIN", "pnl": 0.8 })).unwrap();
        assert_eq!(only_pnl.profit(), 0.8);
    }

    #[test]
    fn test_trade_echo_keeps_raw_fields() {
        let t: Trade = serde_json::from_value(json!({
            "timestamp": "2026-02-09T13:05:00Z",
            "result": "OPEN",
            "buy_price": 0.52
        }))
        .unwrap();
        assert_eq!(t.result(), TradeResult::Pending);

        let echoed = serde_json::to_value(&t).unwrap();
        assert_eq!(echoed["buy_price"], json!(0.52));
        assert_eq!(echoed["result"], json!("OPEN"));
        assert!(echoed.get("price").is_none());
        assert!(echoed.get("direction").is_none());
        assert!(echoed.get("profit").is_none());
    }

    #[test]
    fn test_trade_book_skips_null_rows() {
        let book: TradeBook = serde_json::from_value(json!({
            "balance": 101.5,
            "trades": [null, { "timestamp": "2026-02-09T13:05:00Z", "result": "WIN" }, 3]
        }))
        .unwrap();
        assert_eq!(book.trades.map(|t| t.len()), Some(1));

        let book: TradeBook = serde_json::from_value(json!({ "balance": 101.5 })).unwrap();
        assert!(book.trades.is_none());
    }

    #[test]
    fn test_gate_is_open_tolerates_null_and_strings() {
        let g: GateStatus = serde_json::from_value(json!({ "is_open": null })).unwrap();
        assert!(g.is_open);
        let g: GateStatus = serde_json::from_value(json!({ "is_open": "false" })).unwrap();
        assert!(!g.is_open);
        let g: GateStatus = serde_json::from_value(json!({ "is_open": 0 })).unwrap();
        assert!(!g.is_open);
    }

    #[test]
    fn test_result_parsing() {
        assert_eq!(TradeResult::parse("won"), TradeResult::Win);
        assert_eq!(TradeResult::parse("Lost"), TradeResult::Loss);
        assert_eq!(TradeResult::parse("open"), TradeResult::Pending);
        assert_eq!(TradeResult::parse(""), TradeResult::Pending);
        assert!(!TradeResult::Pending.is_completed());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp("2026-02-09T13:00:00Z").unwrap();
        let b = parse_timestamp("2026-02-09T14:00:00+01:00").unwrap();
        let c = parse_timestamp("2026-02-09 13:00:00").unwrap();
        let d = parse_timestamp("1770642000").unwrap();
        let e = parse_timestamp("1770642000000").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert_eq!(a, e);
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_effective_edge() {
        let mut t = Trade {
            confidence: Some(0.62),
            price: Some(0.50),
            ..Default::default()
        };
        assert!((t.effective_edge() - 0.12).abs() < 1e-12);

        t.edge = Some(0.03);
        assert_eq!(t.effective_edge(), 0.03);

        // Percent confidence is not a probability, so no edge can be derived.
        let t = Trade {
            confidence: Some(62.0),
            price: Some(0.50),
            ..Default::default()
        };
        assert_eq!(t.effective_edge(), 0.0);
    }

    #[test]
    fn test_gate_defaults() {
        let g: GateStatus = serde_json::from_value(json!({})).unwrap();
        assert_eq!(g, GateStatus::default());
        assert!(g.is_open);
        assert_eq!(g.threshold, 0.15);
    }

    #[test]
    fn test_lenient_vec_drops_bad_rows() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "lenient::vec")]
            rows: Vec<StatRow>,
        }
        let w: Wrapper =
            serde_json::from_value(json!({ "rows": [{ "strategy_name": "a" }, 7, "x"] })).unwrap();
        assert_eq!(w.rows.len(), 1);
        assert_eq!(w.rows[0].strategy_name, "a");
    }

    #[test]
    fn test_num_rejects_non_finite() {
        assert_eq!(num(&json!("NaN")), None);
        assert_eq!(num(&json!("12.5")), Some(12.5));
        assert_eq!(num(&Value::Null), None);
    }
}
