use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{decode_list, SourceError};
use crate::types::{LiveSignal, StrategyRanking, TradeBook};

pub const TRADES_FILE: &str = "trades.json";
pub const LIVE_SIGNAL_FILE: &str = "live_signal.json";
pub const RANKINGS_FILE: &str = "strategy_rankings.json";
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// JSON exports the bot pushes into the data directory (via git) for offline use.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    dir: PathBuf,
}

impl LocalFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, SourceError> {
        let path = self.dir.join(name);
        let raw = tokio::fs::read(&path).await.map_err(|err| SourceError::Io {
            path: path.display().to_string(),
            err,
        })?;
        serde_json::from_slice(&raw).map_err(|e| SourceError::Decode("data file", format!("{name}: {e}")))
    }

    /// `trades.json`, only when it actually carries a `trades` list.
    pub async fn trades(&self) -> Option<TradeBook> {
        match self.read_json::<TradeBook>(TRADES_FILE).await {
            Ok(book) if book.trades.is_some() => Some(book),
            Ok(_) => {
                debug!("{} has no trades list", TRADES_FILE);
                None
            }
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    pub async fn live_signal(&self) -> Option<LiveSignal> {
        self.read_json::<Option<LiveSignal>>(LIVE_SIGNAL_FILE)
            .await
            .map_err(|e| debug!("{}", e))
            .ok()
            .flatten()
    }

    /// `strategy_rankings.json`: a bare list or `{ "rankings": [...] }`.
    pub async fn rankings(&self) -> Vec<StrategyRanking> {
        let decoded = match self.read_json::<Value>(RANKINGS_FILE).await {
            Ok(body) => decode_list("data file", body, "rankings"),
            Err(e) => Err(e),
        };
        decoded.unwrap_or_else(|e| {
            debug!("{}", e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_reads_trades_signal_and_rankings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(TRADES_FILE),
            r#"{"balance": 98.5, "initial_balance": 100, "trades": [
                {"timestamp": "2026-02-09T13:00:00Z", "result": "LOSS", "profit": -1.5}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.path().join(LIVE_SIGNAL_FILE), r#"{"action": "WAITING"}"#).unwrap();
        fs::write(dir.path().join(RANKINGS_FILE), r#"{"rankings": [{"name": "rsi"}]}"#).unwrap();

        let files = LocalFiles::new(dir.path());
        let book = files.trades().await.unwrap();
        assert_eq!(book.balance, Some(98.5));
        assert_eq!(book.trades.unwrap().len(), 1);
        assert_eq!(files.live_signal().await.unwrap().action.as_deref(), Some("WAITING"));
        assert_eq!(files.rankings().await[0].name, "rsi");
    }

    #[tokio::test]
    async fn test_missing_or_unusable_files_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let files = LocalFiles::new(dir.path());
        assert!(files.trades().await.is_none());
        assert!(files.live_signal().await.is_none());
        assert!(files.rankings().await.is_empty());

        fs::write(dir.path().join(TRADES_FILE), r#"{"balance": 100}"#).unwrap();
        fs::write(dir.path().join(LIVE_SIGNAL_FILE), "null").unwrap();
        fs::write(dir.path().join(RANKINGS_FILE), "{oops").unwrap();
        assert!(files.trades().await.is_none());
        assert!(files.live_signal().await.is_none());
        assert!(files.rankings().await.is_empty());
    }

    #[tokio::test]
    async fn test_bare_ranking_list() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RANKINGS_FILE), r#"[{"name": "a"}, {"name": "b"}]"#).unwrap();
        let files = LocalFiles::new(dir.path());
        assert_eq!(files.rankings().await.len(), 2);
    }
}
