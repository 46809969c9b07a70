use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::{
    self, ConfidenceBuckets, DailyPnl, DataQuality, Drawdown, EdgeAnalysis, HourStats, Performance,
    Range, RollingSortino, WinTotal,
};
use crate::sources::bot::BotLive;
use crate::sources::market::WindowMarket;
use crate::sources::snapshot::map_snapshot;
use crate::sources::{Source, SourceError};
use crate::types::{
    CurrentRegime, FundingRate, GateStats, GateStatus, LiveSignal, LiveTrading, MarketPrices,
    NearMiss, StatRow, StrategyRanking, Trade, TradeBook,
};
use crate::AppState;

pub const RECENT_TRADES: usize = 20;
pub const DAILY_PNL_DAYS: usize = 7;
pub const DEFAULT_NEAR_MISSES: usize = 50;
/// Upper bound on trades pulled from SQLite per request.
pub const SQLITE_TRADE_LIMIT: usize = 5000;

/// The single view model the dashboard UI renders.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub mode: String,
    pub btc_price: f64,
    pub last_updated: String,
    #[serde(rename = "_source")]
    pub source: Source,
    pub performance: Performance,
    pub live_signal: Option<LiveSignal>,
    pub strategy_rankings: Vec<StrategyRanking>,
    pub recent_trades: Vec<Trade>,
    pub edge_analysis: EdgeAnalysis,
    pub minute_stats: BTreeMap<u32, WinTotal>,
    pub hourly_stats: BTreeMap<String, HourStats>,
    pub daily_pnl: Vec<DailyPnl>,
    pub gate_status: GateStatus,
    pub gate_stats: GateStats,
    pub funding_rate: Option<FundingRate>,
    pub orderbook_imbalance: f64,
    pub strategies_config: BTreeMap<String, f64>,
    pub regime_breakdown: BTreeMap<String, BTreeMap<String, WinTotal>>,
    pub current_regime: CurrentRegime,
    pub near_misses: Vec<NearMiss>,
    pub data_quality: DataQuality,
    pub drawdown: Drawdown,
    pub sortino: RollingSortino,
    pub confidence_buckets: ConfidenceBuckets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_trading: Option<LiveTrading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DashboardData {
    /// A view with every derived field at its zero value.
    pub(crate) fn empty(source: Source, initial_balance: f64) -> Self {
        Self {
            mode: "paper".to_string(),
            btc_price: 0.0,
            last_updated: Utc::now().to_rfc3339(),
            source,
            performance: Performance::zeroed(initial_balance),
            live_signal: None,
            strategy_rankings: Vec::new(),
            recent_trades: Vec::new(),
            edge_analysis: EdgeAnalysis::default(),
            minute_stats: BTreeMap::new(),
            hourly_stats: BTreeMap::new(),
            daily_pnl: Vec::new(),
            gate_status: GateStatus::default(),
            gate_stats: GateStats::default(),
            funding_rate: None,
            orderbook_imbalance: 0.0,
            strategies_config: BTreeMap::new(),
            regime_breakdown: BTreeMap::new(),
            current_regime: CurrentRegime::default(),
            near_misses: Vec::new(),
            data_quality: DataQuality::default(),
            drawdown: Drawdown::default(),
            sortino: RollingSortino::default(),
            confidence_buckets: ConfidenceBuckets::default(),
            live_trading: None,
            error: None,
        }
    }

    /// Zeroed payload returned when no source has any data.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::empty(Source::None, 100.0)
        }
    }
}

/// Trades plus whatever else the winning source carried, in the bot's live shape.
struct Primary {
    source: Source,
    payload: BotLive,
}

/// Build the dashboard view for `range`, degrading through bot API, SQLite, local files
/// and snapshot in that order.
pub async fn build_dashboard(state: &AppState, range: Range) -> DashboardData {
    let now = Utc::now();
    let (live, btc, window, misses) = tokio::join!(
        state.bot.live(),
        state.market.btc_price(),
        state.market.window_market(now),
        state.bot.near_misses(DEFAULT_NEAR_MISSES),
    );

    let primary = match live {
        Ok(payload) => Some(Primary {
            source: Source::Live,
            payload,
        }),
        Err(e) => {
            warn!("bot API unavailable, falling back: {}", e);
            fallback_payload(state).await
        }
    };

    let mut data = match primary {
        Some(primary) => from_payload(primary, range, now, state.config.initial_balance),
        None => match state.snapshot.load().await {
            Some(snap) => map_snapshot(snap, range),
            None => {
                warn!("no data source available for /api/data");
                return DashboardData::unavailable(
                    "No data available: bot API, SQLite, data files and snapshot all failed",
                );
            }
        },
    };

    match misses {
        Ok(misses) => data.near_misses = misses,
        Err(e) => debug!("bot near-misses unavailable: {}", e),
    }
    data.data_quality.near_miss_count = data.near_misses.len() as u32;

    let window = window.unwrap_or_else(|e| {
        debug!("window market unavailable: {}", e);
        None
    });
    apply_market(&mut data, btc, window);

    debug!(
        "dashboard built: source={} range={} trades={}",
        data.source,
        range.as_str(),
        data.performance.total_trades
    );
    data
}

/// SQLite first, then the JSON files in the data directory. `None` when neither has trades.
async fn fallback_payload(state: &AppState) -> Option<Primary> {
    if let Some(db) = &state.sqlite {
        match db.trades(SQLITE_TRADE_LIMIT).await {
            Ok(trades) if !trades.is_empty() => {
                let near_misses = db
                    .near_misses(DEFAULT_NEAR_MISSES)
                    .await
                    .unwrap_or_else(|e| {
                        debug!("sqlite near-misses unavailable: {}", e);
                        Vec::new()
                    });
                return Some(Primary {
                    source: Source::Sqlite,
                    payload: BotLive {
                        trades: TradeBook {
                            trades: Some(trades),
                            ..Default::default()
                        },
                        near_misses,
                        ..Default::default()
                    },
                });
            }
            Ok(_) => debug!("sqlite has no trades"),
            Err(e) => warn!("sqlite fallback failed: {}", e),
        }
    }

    let book = state.files.trades().await?;
    let (signal, rankings) = tokio::join!(state.files.live_signal(), state.files.rankings());
    Some(Primary {
        source: Source::Files,
        payload: BotLive {
            trades: book,
            signal,
            rankings,
            ..Default::default()
        },
    })
}

/// All trades from the best available source, without the extras a full view needs.
pub async fn trade_book(state: &AppState) -> Option<(Source, TradeBook)> {
    match state.bot.live().await {
        Ok(live) if live.trades.trades.is_some() => return Some((Source::Live, live.trades)),
        Ok(_) => debug!("bot live payload has no trades"),
        Err(e) => warn!("bot API unavailable, falling back: {}", e),
    }
    fallback_payload(state)
        .await
        .map(|p| (p.source, p.payload.trades))
}

/// Per-strategy stats: the bot's own table, else computed from fallback trades.
pub async fn stats(state: &AppState, mode: &str) -> (Source, Vec<StatRow>) {
    match state.bot.stats(mode).await {
        Ok(rows) => return (Source::Live, rows),
        Err(e) => warn!("bot stats unavailable, computing from trades: {}", e),
    }
    match fallback_payload(state).await {
        Some(p) => {
            let trades = p.payload.trades.trades.unwrap_or_default();
            (p.source, metrics::stat_rows(&trades))
        }
        None => (Source::None, Vec::new()),
    }
}

/// Recent near misses: bot, else SQLite, else the snapshot.
pub async fn near_misses(state: &AppState, limit: usize) -> (Source, Vec<NearMiss>) {
    match state.bot.near_misses(limit).await {
        Ok(misses) => return (Source::Live, misses),
        Err(e) => warn!("bot near-misses unavailable: {}", e),
    }
    if let Some(db) = &state.sqlite {
        match db.near_misses(limit).await {
            Ok(misses) => return (Source::Sqlite, misses),
            Err(e) => warn!("sqlite near-misses unavailable: {}", e),
        }
    }
    if let Some(mut misses) = state.snapshot.load().await.and_then(|s| s.near_misses) {
        misses.truncate(limit);
        return (Source::Snapshot, misses);
    }
    (Source::None, Vec::new())
}

fn from_payload(primary: Primary, range: Range, now: DateTime<Utc>, default_initial: f64) -> DashboardData {
    let Primary { source, payload } = primary;
    let BotLive {
        trades: book,
        signal,
        rankings,
        gate_status,
        gate_stats,
        funding_rate,
        orderbook_imbalance,
        strategies_config,
        current_regime,
        live_trading,
        mode,
        near_misses,
    } = payload;

    let trades = book.trades.unwrap_or_default();
    let initial = book.initial_balance.unwrap_or(default_initial);
    let balance = book.balance.unwrap_or_else(|| {
        initial + metrics::completed(&trades).iter().map(|t| t.profit()).sum::<f64>()
    });
    let scoped = metrics::filter_range(&trades, range, now);

    let strategy_rankings = if rankings.is_empty() {
        metrics::rankings_from_trades(&scoped)
    } else {
        metrics::enrich_rankings(rankings, &scoped)
    };
    let last_export = trades
        .iter()
        .filter_map(|t| t.time().map(|ts| (ts, &t.timestamp)))
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, raw)| raw.clone())
        .unwrap_or_default();
    let orderbook_imbalance = orderbook_imbalance
        .or_else(|| signal.as_ref().and_then(|s| s.orderbook_imbalance))
        .unwrap_or(0.0);

    let mut data = DashboardData::empty(source, initial);
    data.mode = mode.unwrap_or_else(|| "paper".to_string());
    data.btc_price = signal.as_ref().and_then(|s| s.btc_price).unwrap_or(0.0);
    data.last_updated = now.to_rfc3339();
    data.performance = metrics::performance(&trades, balance, initial, now);
    data.live_signal = signal;
    data.strategy_rankings = strategy_rankings;
    data.recent_trades = metrics::recent_trades(&trades, RECENT_TRADES);
    data.edge_analysis = metrics::edge_analysis(&trades);
    data.minute_stats = metrics::minute_stats(&trades);
    data.hourly_stats = metrics::hourly_stats(&scoped);
    data.daily_pnl = metrics::daily_pnl(&trades, DAILY_PNL_DAYS);
    data.gate_status = gate_status.unwrap_or_default();
    data.gate_stats = gate_stats.unwrap_or_default();
    data.funding_rate = funding_rate;
    data.orderbook_imbalance = orderbook_imbalance;
    data.strategies_config = strategies_config;
    data.regime_breakdown = metrics::regime_breakdown(&scoped);
    data.current_regime = current_regime.unwrap_or_default();
    data.data_quality = metrics::data_quality(&trades, near_misses.len(), &last_export);
    data.near_misses = near_misses;
    data.drawdown = metrics::drawdown(&scoped);
    data.sortino = metrics::rolling_sortino(&trades);
    data.confidence_buckets = metrics::confidence_buckets(&trades);
    data.live_trading = live_trading;
    data
}

/// Fold public market data into the view: CoinGecko price wins over the signal's, and the
/// current window's Polymarket prices are attached to the signal.
fn apply_market(data: &mut DashboardData, btc: Result<f64, SourceError>, window: Option<WindowMarket>) {
    match btc {
        Ok(price) => data.btc_price = price,
        Err(e) => debug!("BTC price unavailable, using signal price: {}", e),
    }

    let Some(window) = window else { return };
    debug!("window {}: yes={} no={}", window.slug, window.yes_price, window.no_price);
    let prices = MarketPrices {
        yes_price: window.yes_price,
        no_price: window.no_price,
    };
    match data.live_signal.as_mut() {
        Some(signal) => signal.market = Some(prices),
        None => {
            data.live_signal = Some(LiveSignal {
                market: Some(prices),
                action: Some("WAITING".to_string()),
                ..Default::default()
            })
        }
    }
}
