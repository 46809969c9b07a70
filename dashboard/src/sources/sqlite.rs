use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::SourceError;
use crate::types::{NearMiss, Trade};

/// Tables `inspect-db` reports on, in display order.
pub const TABLES: [&str; 2] = ["trades", "near_misses"];

/// Read-only view of the bot's SQLite database.
///
/// Columns are matched by name, so older schemas missing `edge`, `indicators` or the
/// regime columns still decode with those fields left empty.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
}

/// Schema and newest row of one table, for `inspect-db`.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub exists: bool,
    pub columns: Vec<ColumnInfo>,
    pub row_count: i64,
    pub newest: Option<Map<String, Value>>,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent trades first.
    pub async fn trades(&self, limit: usize) -> Result<Vec<Trade>, SourceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Trade>, SourceError> {
            let conn = open_read_only(&path)?;
            let rows = select_rows(&conn, "SELECT * FROM trades ORDER BY rowid DESC LIMIT ?1", limit)?;
            Ok(decode_rows(rows))
        })
        .await?
    }

    pub async fn near_misses(&self, limit: usize) -> Result<Vec<NearMiss>, SourceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<NearMiss>, SourceError> {
            let conn = open_read_only(&path)?;
            let rows = select_rows(
                &conn,
                "SELECT * FROM near_misses ORDER BY rowid DESC LIMIT ?1",
                limit,
            )?;
            Ok(decode_rows(rows))
        })
        .await?
    }

    pub async fn describe(&self) -> Result<Vec<TableInfo>, SourceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<TableInfo>, SourceError> {
            let conn = open_read_only(&path)?;
            TABLES.iter().map(|table| describe_table(&conn, table)).collect()
        })
        .await?
    }
}

fn open_read_only(path: &Path) -> Result<Connection, SourceError> {
    if !path.exists() {
        return Err(SourceError::Io {
            path: path.display().to_string(),
            err: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn select_rows(conn: &Connection, sql: &str, limit: usize) -> Result<Vec<Map<String, Value>>, SourceError> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt.query_map([limit as i64], |row| Ok(row_to_json(row, &names)))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Map<String, Value>>) -> Vec<T> {
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(Value::Object(row)).ok())
        .collect();
    if decoded.len() < total {
        debug!("sqlite: dropped {} undecodable rows", total - decoded.len());
    }
    decoded
}

/// One row as a JSON object. Text columns holding JSON objects or arrays (the bot stores
/// `indicators` that way) are decoded in place.
fn row_to_json(row: &Row<'_>, names: &[String]) -> Map<String, Value> {
    let mut out = Map::new();
    for (i, name) in names.iter().enumerate() {
        let value = match row.get_ref(i) {
            Ok(ValueRef::Null) | Err(_) => Value::Null,
            Ok(ValueRef::Integer(n)) => Value::from(n),
            Ok(ValueRef::Real(f)) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
            Ok(ValueRef::Text(bytes)) => text_value(&String::from_utf8_lossy(bytes)),
            Ok(ValueRef::Blob(_)) => Value::Null,
        };
        out.insert(name.clone(), value);
    }
    out
}

fn text_value(s: &str) -> Value {
    let trimmed = s.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Value>(s) {
            return v;
        }
    }
    Value::String(s.to_string())
}

fn describe_table(conn: &Connection, table: &str) -> Result<TableInfo, SourceError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns: Vec<ColumnInfo> = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<_, _>>()?;

    if columns.is_empty() {
        return Ok(TableInfo {
            name: table.to_string(),
            exists: false,
            columns,
            row_count: 0,
            newest: None,
        });
    }

    let row_count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    let newest = select_rows(conn, &format!("SELECT * FROM {table} ORDER BY rowid DESC LIMIT ?1"), 1)?
        .into_iter()
        .next();

    Ok(TableInfo {
        name: table.to_string(),
        exists: true,
        columns,
        row_count,
        newest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_db;
    use crate::types::{Direction, TradeResult};

    #[tokio::test]
    async fn test_trades_newest_first_with_partial_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteSource::new(fixture_db(dir.path()));

        let trades = db.trades(10).await.unwrap();
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].result(), TradeResult::Pending);
        assert_eq!(trades[0].profit(), 0.0);
        assert!(trades[0].indicators.is_empty());
        assert_eq!(trades[1].profit(), -1.0);
        assert_eq!(trades[2].entry_price(), Some(0.52));
        assert_eq!(trades[2].profit(), 0.9);
        assert_eq!(trades[2].indicators["momentum"], Direction::Up);
        assert_eq!(trades[2].id.as_deref(), Some("1"));

        assert_eq!(db.trades(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_near_misses_keep_null_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteSource::new(fixture_db(dir.path()));

        let misses = db.near_misses(50).await.unwrap();
        assert_eq!(misses.len(), 2);
        assert_eq!(misses[0].strategy, "momentum");
        assert_eq!(misses[0].would_have_won, None);
        assert_eq!(misses[1].would_have_won, Some(1));
        assert_eq!(misses[1].reason_skipped, "");
    }

    #[tokio::test]
    async fn test_missing_table_and_file_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path).unwrap().execute_batch("CREATE TABLE other (x INTEGER);").unwrap();

        let err = SqliteSource::new(&path).trades(5).await.unwrap_err();
        assert!(matches!(err, SourceError::Sqlite(_)), "got {err:?}");

        let err = SqliteSource::new(dir.path().join("nope.db")).trades(5).await.unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_describe_reports_schema_and_newest_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_db(dir.path());
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("DROP TABLE near_misses;").unwrap();
        drop(conn);

        let tables = SqliteSource::new(&path).describe().await.unwrap();
        assert_eq!(tables.len(), 2);

        let trades = &tables[0];
        assert!(trades.exists);
        assert_eq!(trades.row_count, 3);
        assert_eq!(trades.columns[1].name, "timestamp");
        assert_eq!(trades.columns[4].decl_type, "REAL");
        let newest = trades.newest.as_ref().unwrap();
        assert_eq!(newest["timestamp"], Value::from("2026-02-09 13:30:00"));

        assert!(!tables[1].exists);
        assert!(tables[1].newest.is_none());
    }

    #[test]
    fn test_text_value_decodes_embedded_json() {
        assert_eq!(text_value(r#"{"a":"UP"}"#)["a"], Value::from("UP"));
        assert_eq!(text_value("[1, 2]"), serde_json::json!([1, 2]));
        assert_eq!(text_value("{broken"), Value::from("{broken"));
        assert_eq!(text_value("plain"), Value::from("plain"));
    }
}
