use crate::db::{self, STATS_OPTIONS_KEY};
use crate::ipc::helpers::{get_required_text, query_failed, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats::StatsOptions;
use rusqlite::Connection;
use serde_json::json;

fn settings_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_required_text(params, "key")?;
    let value = if key == STATS_OPTIONS_KEY {
        json!(db::stats_options(conn).map_err(query_failed)?)
    } else {
        db::settings_get_json(conn, &key)
            .map_err(query_failed)?
            .unwrap_or(serde_json::Value::Null)
    };
    Ok(json!({ "key": key, "value": value }))
}

fn settings_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_required_text(params, "key")?;
    let Some(value) = params.get("value") else {
        return Err(HandlerErr::bad_params("missing value"));
    };
    let value = if key == STATS_OPTIONS_KEY {
        let options: StatsOptions = serde_json::from_value(value.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", STATS_OPTIONS_KEY, e)))?;
        json!(options)
    } else {
        value.clone()
    };
    db::settings_set_json(conn, &key, &value).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string()).with_details(json!({ "table": "settings" }))
    })?;
    tracing::info!(%key, "setting updated");
    Ok(json!({ "key": key, "value": value }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "settings.get" => with_db(state, req, settings_get),
        "settings.set" => with_db(state, req, settings_set),
        _ => return None,
    };
    Some(resp)
}
