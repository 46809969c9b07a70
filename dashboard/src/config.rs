use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub bot_api_url: String,
    pub bot_api_key: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: Option<PathBuf>,
    pub snapshot_url: Option<String>,
    pub coingecko_url: String,
    pub gamma_api_url: String,
    pub bot_timeout_secs: u64,
    pub market_timeout_secs: u64,
    pub snapshot_timeout_secs: u64,
    pub initial_balance: f64,
}

impl DashboardConfig {
    /// Load from an explicit .env file (or the default `.env` when `None`), then the process env.
    pub fn from_env_file(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                dotenvy::from_filename(p).with_context(|| format!("Load config file {p}"))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::build_from_env()
    }

    fn build_from_env() -> Result<Self> {
        Ok(Self {
            bot_api_url: env("BOT_API_URL", "http://127.0.0.1:8080")
                .trim_end_matches('/')
                .to_string(),
            bot_api_key: env("BOT_API_KEY", ""),
            port: env("PORT", "3000")
                .parse()
                .context("PORT must be a valid u16")?,
            data_dir: PathBuf::from(env("DATA_DIR", "data")),
            db_path: optional("DB_PATH").map(PathBuf::from),
            snapshot_url: optional("SNAPSHOT_URL"),
            coingecko_url: env("COINGECKO_URL", "https://api.coingecko.com/api/v3")
                .trim_end_matches('/')
                .to_string(),
            gamma_api_url: env("GAMMA_API_URL", "https://gamma-api.polymarket.com")
                .trim_end_matches('/')
                .to_string(),
            bot_timeout_secs: env("BOT_TIMEOUT_SECS", "5")
                .parse()
                .context("BOT_TIMEOUT_SECS must be a valid u64")?,
            market_timeout_secs: env("MARKET_TIMEOUT_SECS", "3")
                .parse()
                .context("MARKET_TIMEOUT_SECS must be a valid u64")?,
            snapshot_timeout_secs: env("SNAPSHOT_TIMEOUT_SECS", "8")
                .parse()
                .context("SNAPSHOT_TIMEOUT_SECS must be a valid u64")?,
            initial_balance: env("INITIAL_BALANCE", "100")
                .parse()
                .context("INITIAL_BALANCE must be a number")?,
        })
    }

    pub fn bot_timeout(&self) -> Duration {
        Duration::from_secs(self.bot_timeout_secs)
    }

    pub fn market_timeout(&self) -> Duration {
        Duration::from_secs(self.market_timeout_secs)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_secs)
    }
}

#[cfg(test)]
impl DashboardConfig {
    /// Config pointing every upstream at `bot_url` with short timeouts and no fallbacks.
    pub fn for_tests(bot_url: &str, data_dir: &std::path::Path) -> Self {
        Self {
            bot_api_url: bot_url.trim_end_matches('/').to_string(),
            bot_api_key: "test-key".to_string(),
            port: 0,
            data_dir: data_dir.to_path_buf(),
            db_path: None,
            snapshot_url: None,
            coingecko_url: bot_url.trim_end_matches('/').to_string(),
            gamma_api_url: bot_url.trim_end_matches('/').to_string(),
            bot_timeout_secs: 2,
            market_timeout_secs: 1,
            snapshot_timeout_secs: 2,
            initial_balance: 100.0,
        }
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset and empty both mean "not configured".
fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
