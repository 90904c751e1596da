use crate::calendar::{count_expected_sessions, ClassSlot};
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_date_bound, get_required_str, query_failed, range_json, store, with_db, HandlerErr,
    PeriodParams,
};
use crate::ipc::types::{AppState, Request};
use crate::model::DateRange;
use crate::stats::{self, NameJoin, StatsOptions};
use crate::store::{ProfileFilter, RecordStore};
use rusqlite::Connection;
use serde_json::json;

fn load_options(conn: &Connection) -> Result<StatsOptions, HandlerErr> {
    db::stats_options(conn).map_err(query_failed)
}

/// Malformed bounds count as an empty period: `count` is 0 and each bad bound is a warning.
fn stats_expected_sessions(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let mut warnings = Vec::new();
    let start = get_date_bound(params, "start", &mut warnings)?;
    let end = get_date_bound(params, "end", &mut warnings)?;
    let count = match (start, end) {
        (Some(start), Some(end)) => count_expected_sessions(&class_id, start, end),
        _ => 0,
    };
    Ok(json!({
        "classId": class_id,
        "count": count,
        "warnings": warnings
    }))
}

fn stats_class_summaries(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let options = load_options(conn)?;
    let store = store(conn);
    let period = PeriodParams::from_params(params);
    let range = period.resolve(&store)?;
    let summaries =
        stats::compute_class_summaries(&store, Some(range.unwrap_or_else(DateRange::empty)), options)?;
    let rows: Vec<serde_json::Value> = summaries
        .iter()
        .map(|s| {
            let mut row = json!(s);
            row["percentLabel"] = json!(s.percent_label());
            row
        })
        .collect();
    Ok(json!({
        "range": range_json(range.as_ref()),
        "options": options,
        "summaries": rows,
        "warnings": period.warnings
    }))
}

fn stats_student_period(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let options = load_options(conn)?;
    let store = store(conn);
    let period = PeriodParams::from_params(params);
    let range = period.resolve(&store)?;
    let students = match range {
        Some(r) => stats::compute_student_period_stats(&store, Some(r), options)?,
        None => Vec::new(),
    };
    Ok(json!({
        "range": range_json(range.as_ref()),
        "options": options,
        "students": students,
        "warnings": period.warnings
    }))
}

/// One profile over every recorded date.
fn stats_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let options = load_options(conn)?;
    let store = store(conn);
    let profile = store
        .query_profiles(&ProfileFilter::default())?
        .into_iter()
        .find(|p| p.student_id == student_id)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let range = store.min_max_date()?;
    let row = stats::student_period_stats(
        &store,
        &NameJoin,
        &profile,
        &range.unwrap_or_else(DateRange::empty),
        options,
    )?;
    Ok(json!({
        "range": range_json(range.as_ref()),
        "student": row
    }))
}

fn stats_details(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let store = store(conn);
    let period = PeriodParams::from_params(params);
    let range = period.resolve(&store)?;
    let details =
        stats::compute_student_details(&store, Some(range.unwrap_or_else(DateRange::empty)))?;
    Ok(json!({
        "range": range_json(range.as_ref()),
        "details": details,
        "warnings": period.warnings
    }))
}

fn calendar_classes() -> serde_json::Value {
    let classes: Vec<serde_json::Value> = ClassSlot::ALL
        .into_iter()
        .map(|slot| {
            let weekdays: Vec<String> = slot.weekdays().iter().map(|d| format!("{:?}", d)).collect();
            json!({
                "classId": slot,
                "label": slot.label(),
                "legacyLabel": slot.legacy_label(),
                "weekdays": weekdays
            })
        })
        .collect();
    json!({ "classes": classes })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "stats.expectedSessions" => match stats_expected_sessions(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(error) => error.response(&req.id),
        },
        "stats.classSummaries" => with_db(state, req, stats_class_summaries),
        "stats.studentPeriod" => with_db(state, req, stats_student_period),
        "stats.student" => with_db(state, req, stats_student),
        "stats.details" => with_db(state, req, stats_details),
        "calendar.classes" => ok(&req.id, calendar_classes()),
        _ => return None,
    };
    Some(resp)
}
