//! Derived display metrics.
//!
//! Every function here is a pure reduction over already-fetched trades. "Completed" means
//! the trade resolved as a win or a loss; pending trades only show up in `recent_trades`
//! and the data-quality counts.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Direction, StatRow, StrategyRanking, Trade};

/// Sortino reported when a sample has gains but no downside at all.
const SORTINO_CAP: f64 = 10.0;
const ROLLING_SORTINO_MIN_TRADES: usize = 5;
const ROLLING_SORTINO_WINDOW: usize = 20;
const SPARK_POINTS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Performance {
    pub balance: f64,
    pub initial_balance: f64,
    pub total_pnl: f64,
    pub today_pnl: f64,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub current_streak: i64,
    pub best_streak: i64,
    pub worst_streak: i64,
}

impl Performance {
    pub fn zeroed(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            total_pnl: 0.0,
            today_pnl: 0.0,
            total_trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            current_streak: 0,
            best_streak: 0,
            worst_streak: 0,
        }
    }
}

impl Default for Performance {
    fn default() -> Self {
        Self::zeroed(100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    /// Signed run length after the last trade: +n wins or -n losses in a row.
    pub current: i64,
    pub best: i64,
    pub worst: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WinTotal {
    pub wins: u32,
    pub total: u32,
}

impl WinTotal {
    fn record(&mut self, win: bool) {
        self.total += 1;
        if win {
            self.wins += 1;
        }
    }
}

/// Completed trades binned by entry edge, in cents of probability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeAnalysis {
    #[serde(rename = "0-5¢")]
    pub under_5: WinTotal,
    #[serde(rename = "5-10¢")]
    pub from_5_to_10: WinTotal,
    #[serde(rename = "10-15¢")]
    pub from_10_to_15: WinTotal,
    #[serde(rename = "15¢+")]
    pub over_15: WinTotal,
}

impl EdgeAnalysis {
    fn bucket_mut(&mut self, edge: f64) -> &mut WinTotal {
        if edge < 0.05 {
            &mut self.under_5
        } else if edge < 0.10 {
            &mut self.from_5_to_10
        } else if edge < 0.15 {
            &mut self.from_10_to_15
        } else {
            &mut self.over_15
        }
    }

    pub fn total(&self) -> u32 {
        self.under_5.total + self.from_5_to_10.total + self.from_10_to_15.total + self.over_15.total
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HourStats {
    pub wins: u32,
    pub losses: u32,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: String,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativePoint {
    pub timestamp: String,
    pub pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drawdown {
    pub cumulative_pnl: Vec<CumulativePoint>,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingSortino {
    pub current: f64,
    pub spark: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LivePerf {
    pub wins: u32,
    pub losses: u32,
    pub pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataQuality {
    pub total_trades: u32,
    pub trades_with_volatility_regime: u32,
    pub trades_with_market_regime: u32,
    pub trades_with_orderbook_data: u32,
    pub near_miss_count: u32,
    pub last_export: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceBucket {
    pub count: u32,
    pub wins: u32,
}

/// Completed trades binned by model confidence (percent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceBuckets {
    #[serde(rename = "50-60%")]
    pub b50: ConfidenceBucket,
    #[serde(rename = "60-70%")]
    pub b60: ConfidenceBucket,
    #[serde(rename = "70-80%")]
    pub b70: ConfidenceBucket,
    #[serde(rename = "80-90%")]
    pub b80: ConfidenceBucket,
    #[serde(rename = "90-100%")]
    pub b90: ConfidenceBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub t: String,
    pub b: f64,
}

/// Time window a dashboard view is restricted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Range {
    #[default]
    All,
    Day,
    Week,
    Month,
}

impl Range {
    pub fn as_str(self) -> &'static str {
        match self {
            Range::All => "all",
            Range::Day => "24h",
            Range::Week => "7d",
            Range::Month => "30d",
        }
    }

    fn lookback(self) -> Option<Duration> {
        match self {
            Range::All => None,
            Range::Day => Some(Duration::hours(24)),
            Range::Week => Some(Duration::days(7)),
            Range::Month => Some(Duration::days(30)),
        }
    }
}

impl FromStr for Range {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Range::All),
            "24h" => Ok(Range::Day),
            "7d" => Ok(Range::Week),
            "30d" => Ok(Range::Month),
            other => Err(format!("Invalid range: {other}. Use all, 24h, 7d or 30d")),
        }
    }
}

/// Completed trades in ascending time order. Unparsable timestamps sort first, keeping
/// their input order.
pub fn completed(trades: &[Trade]) -> Vec<&Trade> {
    let mut done: Vec<&Trade> = trades.iter().filter(|t| t.is_completed()).collect();
    done.sort_by_key(|t| t.time());
    done
}

pub fn filter_range(trades: &[Trade], range: Range, now: DateTime<Utc>) -> Vec<Trade> {
    let Some(lookback) = range.lookback() else {
        return trades.to_vec();
    };
    let cutoff = now - lookback;
    trades
        .iter()
        .filter(|t| t.time().is_some_and(|ts| ts >= cutoff))
        .cloned()
        .collect()
}

pub fn performance(
    trades: &[Trade],
    balance: f64,
    initial_balance: f64,
    now: DateTime<Utc>,
) -> Performance {
    let done = completed(trades);
    let wins = done.iter().filter(|t| t.is_win()).count() as u32;
    let losses = done.len() as u32 - wins;
    let total_pnl: f64 = done.iter().map(|t| t.profit()).sum();
    let today = now.date_naive();
    let today_pnl: f64 = done
        .iter()
        .filter(|t| t.time().is_some_and(|ts| ts.date_naive() == today))
        .map(|t| t.profit())
        .sum();
    let streaks = streaks(trades);

    Performance {
        balance,
        initial_balance,
        total_pnl,
        today_pnl,
        total_trades: done.len() as u32,
        wins,
        losses,
        win_rate: win_rate(wins, done.len() as u32),
        current_streak: streaks.current,
        best_streak: streaks.best,
        worst_streak: streaks.worst,
    }
}

/// Percentage in [0, 100]; 0 when nothing completed.
pub fn win_rate(wins: u32, completed: u32) -> f64 {
    if completed == 0 {
        0.0
    } else {
        wins as f64 / completed as f64 * 100.0
    }
}

pub fn streaks(trades: &[Trade]) -> Streaks {
    streaks_in_order(&completed(trades))
}

fn streaks_in_order(done: &[&Trade]) -> Streaks {
    let mut s = Streaks::default();
    for t in done {
        s.current = if t.is_win() {
            if s.current >= 0 { s.current + 1 } else { 1 }
        } else if s.current <= 0 {
            s.current - 1
        } else {
            -1
        };
        s.best = s.best.max(s.current);
        s.worst = s.worst.min(s.current);
    }
    s
}

/// Summed profit per UTC day, ascending, limited to the last `days` days that had trades.
pub fn daily_pnl(trades: &[Trade], days: usize) -> Vec<DailyPnl> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.is_completed()) {
        if let Some(ts) = t.time() {
            *by_day.entry(ts.date_naive()).or_insert(0.0) += t.profit();
        }
    }
    let skip = by_day.len().saturating_sub(days);
    by_day
        .into_iter()
        .skip(skip)
        .map(|(date, pnl)| DailyPnl {
            date: date.format("%Y-%m-%d").to_string(),
            pnl,
        })
        .collect()
}

pub fn edge_analysis(trades: &[Trade]) -> EdgeAnalysis {
    let mut buckets = EdgeAnalysis::default();
    for t in trades.iter().filter(|t| t.is_completed()) {
        buckets.bucket_mut(t.effective_edge()).record(t.is_win());
    }
    buckets
}

pub fn minute_stats(trades: &[Trade]) -> BTreeMap<u32, WinTotal> {
    let mut stats: BTreeMap<u32, WinTotal> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.is_completed()) {
        if let Some(minute) = t.entry_minute {
            stats.entry(minute).or_default().record(t.is_win());
        }
    }
    stats
}

/// Keyed by zero-padded UTC hour ("00".."23"); hours without trades are omitted.
pub fn hourly_stats(trades: &[Trade]) -> BTreeMap<String, HourStats> {
    let mut stats: BTreeMap<String, HourStats> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.is_completed()) {
        let Some(ts) = t.time() else { continue };
        let hour = stats.entry(format!("{:02}", ts.hour())).or_default();
        if t.is_win() {
            hour.wins += 1;
        } else {
            hour.losses += 1;
        }
        hour.pnl += t.profit();
    }
    stats
}

/// Largest peak-to-trough decline of the running sum of `profits`, starting from 0.
pub fn max_drawdown<I: IntoIterator<Item = f64>>(profits: I) -> f64 {
    let mut cum = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for p in profits {
        cum += p;
        peak = peak.max(cum);
        worst = worst.max(peak - cum);
    }
    worst
}

pub fn drawdown(trades: &[Trade]) -> Drawdown {
    let done = completed(trades);
    let mut cum = 0.0;
    let cumulative_pnl = done
        .iter()
        .map(|t| {
            cum += t.profit();
            CumulativePoint {
                timestamp: t.timestamp.clone(),
                pnl: cum,
            }
        })
        .collect();

    Drawdown {
        cumulative_pnl,
        max_drawdown: max_drawdown(done.iter().map(|t| t.profit())),
    }
}

pub fn sortino(profits: &[f64]) -> f64 {
    if profits.len() < 2 {
        return 0.0;
    }
    let n = profits.len() as f64;
    let mean = profits.iter().sum::<f64>() / n;
    let downside_dev = (profits.iter().map(|p| p.min(0.0).powi(2)).sum::<f64>() / n).sqrt();
    if downside_dev == 0.0 {
        return if mean > 0.0 { SORTINO_CAP } else { 0.0 };
    }
    mean / downside_dev
}

/// Sortino over a sliding window of recent trades, plus a downsampled history for a sparkline.
pub fn rolling_sortino(trades: &[Trade]) -> RollingSortino {
    let profits: Vec<f64> = completed(trades).iter().map(|t| t.profit()).collect();
    if profits.len() < ROLLING_SORTINO_MIN_TRADES {
        return RollingSortino::default();
    }

    let window = ROLLING_SORTINO_WINDOW.min(profits.len() / 2);
    let points: Vec<f64> = profits.windows(window).map(sortino).collect();

    RollingSortino {
        current: points.last().copied().unwrap_or(0.0),
        spark: downsample(&points, SPARK_POINTS),
    }
}

/// Pick at most `max` evenly spaced items, always keeping the first and the last.
pub fn downsample<T: Clone>(points: &[T], max: usize) -> Vec<T> {
    if points.len() <= max {
        return points.to_vec();
    }
    if max < 2 {
        return points.last().cloned().into_iter().collect();
    }
    let step = (points.len() - 1) as f64 / (max - 1) as f64;
    (0..max)
        .map(|i| points[((i as f64 * step).round() as usize).min(points.len() - 1)].clone())
        .collect()
}

/// Live record of each indicator, counting only trades where it voted with the trade.
pub fn strategy_live_perf(trades: &[Trade]) -> BTreeMap<String, LivePerf> {
    let mut perf: BTreeMap<String, LivePerf> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.is_completed()) {
        for (name, vote) in &t.indicators {
            let entry = perf.entry(name.clone()).or_default();
            if t.direction() != Direction::Unknown && *vote == t.direction() {
                if t.is_win() {
                    entry.wins += 1;
                } else {
                    entry.losses += 1;
                }
                entry.pnl += t.profit();
            }
        }
    }
    perf
}

pub fn enrich_rankings(rankings: Vec<StrategyRanking>, trades: &[Trade]) -> Vec<StrategyRanking> {
    let perf = strategy_live_perf(trades);
    rankings
        .into_iter()
        .map(|mut r| {
            let p = perf.get(&r.name).copied().unwrap_or_default();
            let live = p.wins + p.losses;
            r.live_trades = live;
            r.live_win_rate = win_rate(p.wins, live);
            r.live_pnl = p.pnl;
            r.live_wins = p.wins;
            r.live_losses = p.losses;
            r
        })
        .collect()
}

/// Completed trades grouped by their `strategy` field, each group in time order.
fn strategy_groups(trades: &[Trade]) -> BTreeMap<String, Vec<&Trade>> {
    let mut groups: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
    for t in completed(trades) {
        if let Some(name) = t.strategy.as_deref().filter(|s| !s.is_empty()) {
            groups.entry(name.to_string()).or_default().push(t);
        }
    }
    groups
}

/// Rankings built from the trades themselves, for sources that carry no bot rankings.
pub fn rankings_from_trades(trades: &[Trade]) -> Vec<StrategyRanking> {
    let mut rankings: Vec<StrategyRanking> = strategy_groups(trades)
        .into_iter()
        .map(|(name, group)| {
            let profits: Vec<f64> = group.iter().map(|t| t.profit()).collect();
            let wins = group.iter().filter(|t| t.is_win()).count() as u32;
            let losses = group.len() as u32 - wins;
            let pnl: f64 = profits.iter().sum();
            let max_dd = max_drawdown(profits.iter().copied());
            let confidences: Vec<f64> = group.iter().filter_map(|t| t.confidence).collect();

            StrategyRanking {
                name,
                direction: group.last().map(|t| t.direction().to_string()),
                live_trades: wins + losses,
                live_win_rate: win_rate(wins, wins + losses),
                live_pnl: pnl,
                live_wins: wins,
                live_losses: losses,
                ev: Some(pnl / profits.len() as f64),
                sortino: Some(sortino(&profits)),
                max_dd: Some(max_dd),
                p_dd: Some(if max_dd > 0.0 { pnl / max_dd } else { 0.0 }),
                avg_confidence: (!confidences.is_empty())
                    .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64),
                streak: Some(streaks_in_order(&group).current),
                ..Default::default()
            }
        })
        .collect();

    rankings.sort_by(|a, b| b.live_pnl.total_cmp(&a.live_pnl));
    rankings
}

pub fn stat_rows(trades: &[Trade]) -> Vec<StatRow> {
    let mut rows: Vec<StatRow> = strategy_groups(trades)
        .into_iter()
        .map(|(name, group)| {
            let wins = group.iter().filter(|t| t.is_win()).count() as u32;
            let total = group.len() as u32;
            StatRow {
                strategy_name: name,
                total_trades: total,
                wins,
                losses: total - wins,
                total_pnl: group.iter().map(|t| t.profit()).sum(),
                max_drawdown: max_drawdown(group.iter().map(|t| t.profit())),
                win_rate: win_rate(wins, total) / 100.0,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total_pnl.total_cmp(&a.total_pnl));
    rows
}

/// Win counts per volatility regime and per market regime.
pub fn regime_breakdown(trades: &[Trade]) -> BTreeMap<String, BTreeMap<String, WinTotal>> {
    let mut out: BTreeMap<String, BTreeMap<String, WinTotal>> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.is_completed()) {
        for (kind, regime) in [("volatility", &t.volatility_regime), ("market", &t.market_regime)] {
            if let Some(regime) = regime {
                out.entry(kind.to_string())
                    .or_default()
                    .entry(regime.clone())
                    .or_default()
                    .record(t.is_win());
            }
        }
    }
    out
}

pub fn data_quality(trades: &[Trade], near_miss_count: usize, last_export: &str) -> DataQuality {
    let count = |f: fn(&Trade) -> bool| trades.iter().filter(|t| f(t)).count() as u32;
    DataQuality {
        total_trades: trades.len() as u32,
        trades_with_volatility_regime: count(|t| t.volatility_regime.is_some()),
        trades_with_market_regime: count(|t| t.market_regime.is_some()),
        trades_with_orderbook_data: count(|t| t.orderbook_imbalance.is_some()),
        near_miss_count: near_miss_count as u32,
        last_export: last_export.to_string(),
    }
}

pub fn confidence_buckets(trades: &[Trade]) -> ConfidenceBuckets {
    let mut b = ConfidenceBuckets::default();
    for t in trades.iter().filter(|t| t.is_completed()) {
        let Some(conf) = t.confidence else { continue };
        let pct = if conf <= 1.0 { conf * 100.0 } else { conf };
        let bucket = if pct < 60.0 {
            &mut b.b50
        } else if pct < 70.0 {
            &mut b.b60
        } else if pct < 80.0 {
            &mut b.b70
        } else if pct < 90.0 {
            &mut b.b80
        } else {
            &mut b.b90
        };
        bucket.count += 1;
        if t.is_win() {
            bucket.wins += 1;
        }
    }
    b
}

/// Balance after each completed trade, downsampled to at most `points`.
pub fn equity_curve(trades: &[Trade], initial_balance: f64, points: usize) -> Vec<EquityPoint> {
    let mut balance = initial_balance;
    let curve: Vec<EquityPoint> = completed(trades)
        .iter()
        .map(|t| {
            balance += t.profit();
            EquityPoint {
                t: t.timestamp.clone(),
                b: balance,
            }
        })
        .collect();
    downsample(&curve, points)
}

/// The `n` newest trades of any result, newest first.
pub fn recent_trades(trades: &[Trade], n: usize) -> Vec<Trade> {
    let mut sorted = trades.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.time()));
    sorted.truncate(n);
    sorted
}
