use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::types::parse_timestamp;
use crate::AppState;

/// Bot components that report a heartbeat in the bot's `/api/health`.
const COMPONENTS: [&str; 3] = ["signal_engine", "paper_trader", "live_trader"];
/// A heartbeat older than this means the component is down.
const HEARTBEAT_MAX_AGE_SECS: i64 = 120;

/// GET /api/health
///
/// Returns the dashboard's own status plus reachability and heartbeats of the bot.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let bot_api = match state.bot.health().await {
        Ok(body) => {
            let mut bot = json!({
                "reachable": true,
                "heartbeats": heartbeats(&body, Utc::now()),
            });
            if let Some(wallet) = body.get("wallet_balance").filter(|v| !v.is_null()) {
                bot["wallet_balance"] = wallet.clone();
            }
            bot
        }
        Err(e) => {
            warn!("bot health check failed: {}", e);
            json!({ "reachable": false, "heartbeats": {} })
        }
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bot_api": bot_api,
    }))
}

/// `{component: {ts, alive, age_secs}}` for each component that reported a heartbeat.
fn heartbeats(body: &Value, now: DateTime<Utc>) -> Value {
    let mut out = Map::new();
    for name in COMPONENTS {
        let Some(ts) = body.get(name).and_then(|hb| hb.get("ts")).and_then(Value::as_str) else {
            continue;
        };
        let age = parse_timestamp(ts).map(|t| (now - t).num_seconds());
        out.insert(
            name.to_string(),
            json!({
                "ts": ts,
                "alive": age.is_some_and(|a| a < HEARTBEAT_MAX_AGE_SECS),
                "age_secs": age,
            }),
        );
    }
    Value::Object(out)
}
