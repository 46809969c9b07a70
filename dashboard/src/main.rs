mod aggregator;
mod config;
mod metrics;
mod routes;
mod sources;
#[cfg(test)]
mod testing;
mod types;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::DashboardConfig;
use crate::metrics::Range;
use crate::sources::bot::BotClient;
use crate::sources::files::LocalFiles;
use crate::sources::market::MarketClient;
use crate::sources::snapshot::{Snapshot, SnapshotSource};
use crate::sources::sqlite::SqliteSource;

#[derive(Parser)]
#[command(name = "scalperdash", version, about = "Dashboard API for the BTC 15-minute scalper bot")]
struct Cli {
    /// Load environment variables from this file instead of `.env`
    #[arg(long, global = true)]
    config_file: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the dashboard API (default)
    Serve {
        /// Override PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Build the dashboard view now and write it as a snapshot file
    Snapshot {
        #[arg(long, default_value = "data/snapshot.json")]
        out: PathBuf,
        /// Ranges to include (repeatable); defaults to all, 24h, 7d and 30d
        #[arg(long = "range")]
        ranges: Vec<Range>,
    },
    /// Print the schema and newest row of each table in the bot's SQLite database
    InspectDb {
        /// Override DB_PATH
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Shared application state passed to all route handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DashboardConfig>,
    pub bot: BotClient,
    pub market: MarketClient,
    pub files: LocalFiles,
    pub sqlite: Option<SqliteSource>,
    pub snapshot: SnapshotSource,
}

impl AppState {
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scalperdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            bot: BotClient::new(http.clone(), &config),
            market: MarketClient::new(http.clone(), &config),
            files: LocalFiles::new(&config.data_dir),
            sqlite: config.db_path.as_ref().map(SqliteSource::new),
            snapshot: SnapshotSource::new(http, &config),
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env (or --config-file) first so RUST_LOG set there applies
    let mut config = DashboardConfig::from_env_file(cli.config_file.as_deref())?;

    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Command::Snapshot { out, ranges } => export_snapshot(config, out, ranges).await,
        Command::InspectDb { db } => {
            let Some(path) = db.or(config.db_path) else {
                bail!("No database given: set DB_PATH or pass --db");
            };
            inspect_db(SqliteSource::new(path)).await
        }
    }
}

async fn serve(config: DashboardConfig) -> Result<()> {
    info!(
        "Configuration loaded (port={}, bot={}, sqlite={}, snapshot_url={})",
        config.port,
        config.bot_api_url,
        config.db_path.is_some(),
        config.snapshot_url.is_some()
    );
    if config.bot_api_key.is_empty() {
        warn!("BOT_API_KEY is empty; bot requests are sent unauthenticated");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::from_config(config)?;
    let app = routes::router(state);

    info!("Scalper dashboard v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    info!("Routes:");
    for route in routes::ROUTES {
        info!("  {}", route);
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn export_snapshot(config: DashboardConfig, out: PathBuf, ranges: Vec<Range>) -> Result<()> {
    let ranges = if ranges.is_empty() {
        vec![Range::All, Range::Day, Range::Week, Range::Month]
    } else {
        ranges
    };

    let state = AppState::from_config(config)?;
    let mut views = Vec::with_capacity(ranges.len());
    for range in ranges {
        let view = aggregator::build_dashboard(&state, range).await;
        if let Some(err) = &view.error {
            bail!("Nothing to export for range {}: {}", range.as_str(), err);
        }
        views.push((range, view));
    }

    let snapshot = Snapshot::from_views(views).context("No ranges to export")?;
    let body = serde_json::to_vec_pretty(&snapshot).context("Failed to serialize snapshot")?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&out, body)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    info!(
        "Snapshot written to {} ({} ranges)",
        out.display(),
        snapshot.ranges.len()
    );
    Ok(())
}

async fn inspect_db(db: SqliteSource) -> Result<()> {
    let tables = db
        .describe()
        .await
        .with_context(|| format!("Failed to inspect {}", db.path().display()))?;

    println!("Database: {}", db.path().display());
    for table in tables {
        println!();
        if !table.exists {
            println!("== {} (missing)", table.name);
            continue;
        }
        println!("== {} ({} rows)", table.name, table.row_count);
        for col in &table.columns {
            println!("  {:<28} {}", col.name, col.decl_type);
        }
        match &table.newest {
            Some(row) => println!("newest: {}", serde_json::to_string_pretty(row)?),
            None => println!("newest: (empty)"),
        }
    }
    Ok(())
}
