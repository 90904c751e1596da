use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

use crate::error::EngineError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_iso_date, DateRange};
use crate::store::{RecordStore, SqliteStore};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        if let EngineError::DataUnavailable(_) = e {
            tracing::error!(error = %e, "record store query failed");
        }
        HandlerErr::new(e.code(), e.to_string())
    }
}

pub fn query_failed(e: impl std::fmt::Display) -> HandlerErr {
    tracing::error!(error = %e, "record store query failed");
    HandlerErr::new("data_unavailable", e.to_string())
}

pub fn update_failed(table: &'static str) -> impl Fn(rusqlite::Error) -> HandlerErr {
    move |e| {
        tracing::error!(table, error = %e, "record store update failed");
        HandlerErr::new("db_update_failed", e.to_string()).with_details(json!({ "table": table }))
    }
}

pub fn tx_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_tx_failed", e.to_string())
}

/// Runs a handler body against the open workspace and wraps the outcome in a response envelope.
pub fn with_db<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed, non-empty text.
pub fn get_required_text(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, key)?;
    let t = raw.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(t.to_string())
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn get_str_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    Ok(items
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect())
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, key)?;
    let date = parse_iso_date(&raw).map_err(HandlerErr::from)?;
    Ok(date.format(crate::model::ISO_DATE).to_string())
}

fn malformed_bound(warnings: &mut Vec<String>, key: &str, detail: impl std::fmt::Display) {
    tracing::warn!(key, %detail, "statistics request with malformed date");
    warnings.push(format!("{}: {}", key, detail));
}

/// A date bound the caller must send. Anything other than an ISO date string is recorded in
/// `warnings` and yields `None`.
pub fn get_date_bound<'p>(
    params: &'p serde_json::Value,
    key: &str,
    warnings: &mut Vec<String>,
) -> Result<Option<&'p str>, HandlerErr> {
    let Some(raw) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    let Some(text) = raw.as_str() else {
        malformed_bound(warnings, key, format!("expected a date string, got {}", raw));
        return Ok(None);
    };
    match parse_iso_date(text) {
        Ok(_) => Ok(Some(text)),
        Err(e) => {
            malformed_bound(warnings, key, e);
            Ok(None)
        }
    }
}

/// Optional `start`/`end` of a statistics request.
///
/// Malformed dates are not fatal: the period becomes empty and the problem is reported in
/// `warnings`. A missing, null or blank bound is taken from the record store's date span.
pub struct PeriodParams {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    malformed: bool,
    pub warnings: Vec<String>,
}

impl PeriodParams {
    pub fn from_params(params: &serde_json::Value) -> Self {
        let mut warnings = Vec::new();
        let mut malformed = false;
        let mut read = |key: &str| -> Option<NaiveDate> {
            match params.get(key) {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
                Some(serde_json::Value::String(s)) => match parse_iso_date(s) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        malformed_bound(&mut warnings, key, e);
                        malformed = true;
                        None
                    }
                },
                Some(other) => {
                    malformed_bound(
                        &mut warnings,
                        key,
                        format!("expected a date string, got {}", other),
                    );
                    malformed = true;
                    None
                }
            }
        };
        let start = read("start");
        let end = read("end");
        Self {
            start,
            end,
            malformed,
            warnings,
        }
    }

    /// `None` means no period could be determined (no bounds given and no records).
    pub fn resolve<S: RecordStore + ?Sized>(&self, store: &S) -> Result<Option<DateRange>, EngineError> {
        if self.malformed {
            return Ok(Some(DateRange::empty()));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            return Ok(Some(DateRange::new(start, end)));
        }
        let Some(bounds) = store.min_max_date()? else {
            return Ok(None);
        };
        Ok(Some(DateRange::new(
            self.start.unwrap_or(bounds.start),
            self.end.unwrap_or(bounds.end),
        )))
    }
}

pub fn range_json(range: Option<&DateRange>) -> serde_json::Value {
    match range {
        Some(r) if !r.is_empty() => json!({ "start": r.start_key(), "end": r.end_key() }),
        _ => serde_json::Value::Null,
    }
}

pub fn store(conn: &Connection) -> SqliteStore<'_> {
    SqliteStore::new(conn)
}
