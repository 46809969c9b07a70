use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::files::{LocalFiles, SNAPSHOT_FILE};
use super::{get_json, Source, SourceError};
use crate::aggregator::DashboardData;
use crate::config::DashboardConfig;
use crate::metrics::{
    ConfidenceBuckets, DailyPnl, DataQuality, Drawdown, EdgeAnalysis, HourStats, Performance, Range,
    RollingSortino, WinTotal,
};
use crate::types::{
    lenient, CurrentRegime, FundingRate, GateStats, GateStatus, LiveSignal, LiveTrading, NearMiss,
    StrategyRanking, Trade,
};

/// Per-range slice of a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeData {
    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub strategy_rankings: Option<Vec<StrategyRanking>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub hourly_stats: Option<BTreeMap<String, HourStats>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub regime_breakdown: Option<BTreeMap<String, BTreeMap<String, WinTotal>>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub drawdown: Option<Drawdown>,
}

/// Pre-computed dashboard state the bot exports periodically (and `scalperdash snapshot`
/// writes). Only `ranges` is keyed by time window; everything else covers all trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub live_signal: Option<LiveSignal>,
    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub strategy_rankings: Option<Vec<StrategyRanking>>,
    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub recent_trades: Option<Vec<Trade>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub edge_analysis: Option<EdgeAnalysis>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub minute_stats: Option<BTreeMap<u32, WinTotal>>,
    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub daily_pnl: Option<Vec<DailyPnl>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub gate_status: Option<GateStatus>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub gate_stats: Option<GateStats>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<FundingRate>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub orderbook_imbalance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub strategies_config: Option<BTreeMap<String, f64>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub current_regime: Option<CurrentRegime>,
    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub near_misses: Option<Vec<NearMiss>>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<DataQuality>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub sortino: Option<RollingSortino>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub confidence_buckets: Option<ConfidenceBuckets>,
    #[serde(default, deserialize_with = "lenient::opt", skip_serializing_if = "Option::is_none")]
    pub live_trading: Option<LiveTrading>,
    #[serde(default, deserialize_with = "lenient_ranges", skip_serializing_if = "BTreeMap::is_empty")]
    pub ranges: BTreeMap<String, RangeData>,
}

/// Ranges that do not decode are dropped; the rest of the snapshot stays usable.
fn lenient_ranges<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, RangeData>, D::Error> {
    let Value::Object(map) = Value::deserialize(d)? else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, raw)| serde_json::from_value(raw).ok().map(|range| (key, range)))
        .collect())
}

impl Snapshot {
    /// Build an exportable snapshot from dashboard views, one per range. Range-independent
    /// fields come from the `all` view when present, else the first one.
    pub fn from_views(views: Vec<(Range, DashboardData)>) -> Option<Self> {
        let base_idx = views
            .iter()
            .position(|(range, _)| *range == Range::All)
            .unwrap_or(0);
        let base = views.get(base_idx)?.1.clone();

        let ranges = views
            .into_iter()
            .map(|(range, view)| {
                (
                    range.as_str().to_string(),
                    RangeData {
                        strategy_rankings: Some(view.strategy_rankings),
                        hourly_stats: Some(view.hourly_stats),
                        regime_breakdown: Some(view.regime_breakdown),
                        drawdown: Some(view.drawdown),
                    },
                )
            })
            .collect();

        Some(Snapshot {
            generated_at: Some(Utc::now().to_rfc3339()),
            mode: Some(base.mode),
            performance: Some(base.performance),
            live_signal: base.live_signal,
            strategy_rankings: Some(base.strategy_rankings),
            recent_trades: Some(base.recent_trades),
            edge_analysis: Some(base.edge_analysis),
            minute_stats: Some(base.minute_stats),
            daily_pnl: Some(base.daily_pnl),
            gate_status: Some(base.gate_status),
            gate_stats: Some(base.gate_stats),
            funding_rate: base.funding_rate,
            orderbook_imbalance: Some(base.orderbook_imbalance),
            strategies_config: Some(base.strategies_config),
            current_regime: Some(base.current_regime),
            near_misses: Some(base.near_misses),
            data_quality: Some(base.data_quality),
            sortino: Some(base.sortino),
            confidence_buckets: Some(base.confidence_buckets),
            live_trading: base.live_trading,
            ranges,
        })
    }
}

/// Map a snapshot onto the dashboard shape. Range-scoped fields come from `ranges[range]`,
/// else `ranges["all"]`, else the snapshot's top level.
pub fn map_snapshot(snap: Snapshot, range: Range) -> DashboardData {
    let range_data = snap
        .ranges
        .get(range.as_str())
        .or_else(|| snap.ranges.get(Range::All.as_str()))
        .cloned()
        .unwrap_or_default();

    let performance = snap.performance.unwrap_or_default();
    let last_updated = snap
        .generated_at
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339());
    let data_quality = snap.data_quality.unwrap_or_else(|| DataQuality {
        total_trades: performance.total_trades,
        last_export: snap.generated_at.clone().unwrap_or_default(),
        ..Default::default()
    });

    let mut data = DashboardData::empty(Source::Snapshot, performance.initial_balance);
    data.mode = snap.mode.unwrap_or_else(|| "paper".to_string());
    data.btc_price = snap
        .live_signal
        .as_ref()
        .and_then(|s| s.btc_price)
        .unwrap_or(0.0);
    data.last_updated = last_updated;
    data.performance = performance;
    data.live_signal = snap.live_signal;
    data.strategy_rankings = range_data
        .strategy_rankings
        .or(snap.strategy_rankings)
        .unwrap_or_default();
    data.recent_trades = snap.recent_trades.unwrap_or_default();
    data.edge_analysis = snap.edge_analysis.unwrap_or_default();
    data.minute_stats = snap.minute_stats.unwrap_or_default();
    data.hourly_stats = range_data.hourly_stats.unwrap_or_default();
    data.daily_pnl = snap.daily_pnl.unwrap_or_default();
    data.gate_status = snap.gate_status.unwrap_or_default();
    data.gate_stats = snap.gate_stats.unwrap_or_default();
    data.funding_rate = snap.funding_rate;
    data.orderbook_imbalance = snap.orderbook_imbalance.unwrap_or(0.0);
    data.strategies_config = snap.strategies_config.unwrap_or_default();
    data.regime_breakdown = range_data.regime_breakdown.unwrap_or_default();
    data.current_regime = snap.current_regime.unwrap_or_default();
    data.near_misses = snap.near_misses.unwrap_or_default();
    data.data_quality = data_quality;
    data.drawdown = range_data.drawdown.unwrap_or_default();
    data.sortino = snap.sortino.unwrap_or_default();
    data.confidence_buckets = snap.confidence_buckets.unwrap_or_default();
    data.live_trading = snap.live_trading;
    data
}

/// Loads the last exported snapshot: `data/snapshot.json` first, then `SNAPSHOT_URL`.
#[derive(Clone)]
pub struct SnapshotSource {
    files: LocalFiles,
    http: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
}

impl SnapshotSource {
    pub fn new(http: reqwest::Client, config: &DashboardConfig) -> Self {
        Self {
            files: LocalFiles::new(&config.data_dir),
            http,
            url: config.snapshot_url.clone(),
            timeout: config.snapshot_timeout(),
        }
    }

    pub async fn local(&self) -> Result<Snapshot, SourceError> {
        self.files.read_json(SNAPSHOT_FILE).await
    }

    pub async fn remote(&self) -> Result<Snapshot, SourceError> {
        let url = self.url.as_deref().ok_or(SourceError::Missing("SNAPSHOT_URL"))?;
        let req = self
            .http
            .get(url)
            .header("Cache-Control", "no-cache")
            .timeout(self.timeout);
        get_json("snapshot", req).await
    }

    pub async fn load(&self) -> Option<Snapshot> {
        match self.local().await {
            Ok(snap) => return Some(snap),
            Err(e) => debug!("local snapshot unavailable: {}", e),
        }
        match self.remote().await {
            Ok(snap) => Some(snap),
            Err(SourceError::Missing(_)) => None,
            Err(e) => {
                warn!("remote snapshot unavailable: {}", e);
                None
            }
        }
    }
}
