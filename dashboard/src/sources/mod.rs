//! Upstream data sources, from the live bot API down to static fallbacks.

pub mod bot;
pub mod files;
pub mod market;
pub mod snapshot;
pub mod sqlite;

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("{source_name} returned HTTP {status}")]
    Status {
        source_name: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{0} request failed: {1}")]
    Request(&'static str, #[source] reqwest::Error),
    #[error("{0} returned malformed JSON: {1}")]
    Decode(&'static str, String),
    #[error("read {path}: {err}")]
    Io {
        path: String,
        #[source]
        err: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blocking read failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("{0} is not configured")]
    Missing(&'static str),
}

impl SourceError {
    /// Classify a reqwest failure for the named upstream.
    pub fn from_reqwest(name: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(name)
        } else if err.is_decode() {
            SourceError::Decode(name, err.to_string())
        } else {
            SourceError::Request(name, err)
        }
    }
}

/// Where a dashboard payload came from. Serialized into `_source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Live,
    Sqlite,
    Files,
    Snapshot,
    None,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Live => "live",
            Source::Sqlite => "sqlite",
            Source::Files => "files",
            Source::Snapshot => "snapshot",
            Source::None => "none",
        };
        f.write_str(s)
    }
}

/// Send `req` and decode the JSON body, mapping failures onto [`SourceError`].
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    name: &'static str,
    req: reqwest::RequestBuilder,
) -> Result<T, SourceError> {
    let resp = req
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(name, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            source_name: name,
            status,
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| SourceError::from_reqwest(name, e))?;
    serde_json::from_slice(&body).map_err(|e| SourceError::Decode(name, e.to_string()))
}

/// List endpoints and files come either as a bare array or wrapped as `{ key: [...] }`.
/// Malformed rows are dropped.
pub(crate) fn decode_list<T: serde::de::DeserializeOwned>(
    name: &'static str,
    body: Value,
    key: &str,
) -> Result<Vec<T>, SourceError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => return Err(SourceError::Decode(name, format!("missing `{key}` array"))),
        },
        _ => return Err(SourceError::Decode(name, "expected array or object".into())),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}
