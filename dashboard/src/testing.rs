//! Test helpers: a throwaway HTTP server standing in for the bot and market APIs, and a
//! fixture bot database.

use std::path::{Path, PathBuf};

use axum::Router;

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder().build().unwrap()
}

/// A base URL nothing is listening on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// A bot database with three trades (win, loss, open) and two near misses. The oldest
/// trade carries both `profit` and `pnl`, as rows migrated from older schemas do.
pub fn fixture_db(dir: &Path) -> PathBuf {
    let path = dir.join("bot.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE trades (
            id INTEGER PRIMARY KEY,
            timestamp TEXT,
            direction TEXT,
            strategy TEXT,
            buy_price REAL,
            result TEXT,
            pnl REAL,
            indicators TEXT,
            profit REAL
        );
        INSERT INTO trades (timestamp, direction, strategy, buy_price, result, pnl, indicators, profit) VALUES
            ('2026-02-09 13:00:00', 'UP', 'momentum', 0.52, 'WIN', 0.9, '{"momentum":"UP"}', 0.9),
            ('2026-02-09 13:15:00', 'DOWN', 'rsi', 0.48, 'LOSS', -1.0, NULL, NULL),
            ('2026-02-09 13:30:00', 'UP', 'momentum', 0.55, NULL, NULL, 'not json', NULL);
        CREATE TABLE near_misses (
            id INTEGER PRIMARY KEY,
            timestamp TEXT,
            strategy TEXT,
            signal_strength REAL,
            would_have_won INTEGER
        );
        INSERT INTO near_misses (timestamp, strategy, signal_strength, would_have_won) VALUES
            ('2026-02-09 13:02:00', 'rsi', 0.61, 1),
            ('2026-02-09 13:17:00', 'momentum', 0.58, NULL);
        "#,
    )
    .unwrap();
    path
}
