use crate::calendar::{canonical_class_id, class_order};
use crate::ipc::helpers::{
    get_optional_str, get_required_date, get_required_str, get_required_text, get_str_list,
    query_failed, tx_failed, update_failed, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Flag, Status, NOTE_PLACEHOLDER};
use crate::store::{record_from_row, RECORD_COLUMNS};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Validated fields of a record create/update.
struct RecordInput {
    date: String,
    name: String,
    class_id: String,
    status: Status,
    note: String,
    flag: Flag,
}

fn parse_record_input(params: &serde_json::Value) -> Result<RecordInput, HandlerErr> {
    let date = get_required_date(params, "date")?;
    let name = get_required_text(params, "name")?;
    let class_id = canonical_class_id(&get_required_text(params, "classId")?);
    let status_raw = get_required_str(params, "status")?;
    let status = Status::parse(&status_raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be present or absent"))?;
    let note = params
        .get("note")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let flag = match params.get("flag") {
        None | Some(serde_json::Value::Null) => Flag::Normal,
        Some(v) => match v.as_i64() {
            Some(code @ 0..=3) => Flag::from_code(code),
            _ => return Err(HandlerErr::bad_params("flag must be an integer 0..3")),
        },
    };
    Ok(RecordInput {
        date,
        name,
        class_id,
        status,
        note,
        flag,
    })
}

fn records_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_optional_str(params, "name").unwrap_or_default();
    let mut sql = format!("SELECT {} FROM progress WHERE name LIKE ?", RECORD_COLUMNS);
    let mut bind_values: Vec<Value> = vec![Value::Text(format!("%{}%", name))];
    if let Some(class_id) = get_optional_str(params, "classId").filter(|c| c != "all") {
        sql.push_str(" AND class_id = ?");
        bind_values.push(Value::Text(canonical_class_id(&class_id)));
    }
    if params.get("date").map_or(false, |v| !v.is_null()) {
        sql.push_str(" AND date = ?");
        bind_values.push(Value::Text(get_required_date(params, "date")?));
    }
    sql.push_str(" ORDER BY date DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), record_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;
    Ok(json!({ "records": rows }))
}

fn records_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let record = conn
        .query_row(
            &format!("SELECT {} FROM progress WHERE id = ?", RECORD_COLUMNS),
            [&id],
            record_from_row,
        )
        .optional()
        .map_err(query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "record not found"))?;
    Ok(json!({ "record": record }))
}

fn records_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let input = parse_record_input(params)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO progress(id, date, name, class_id, status, note, flag)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &input.date,
            &input.name,
            &input.class_id,
            input.status.as_str(),
            &input.note,
            input.flag.code(),
        ),
    )
    .map_err(update_failed("progress"))?;
    Ok(json!({ "id": id }))
}

fn records_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let input = parse_record_input(params)?;
    let changed = conn
        .execute(
            "UPDATE progress SET date = ?, name = ?, class_id = ?, status = ?, note = ?, flag = ?
             WHERE id = ?",
            (
                &input.date,
                &input.name,
                &input.class_id,
                input.status.as_str(),
                &input.note,
                input.flag.code(),
                &id,
            ),
        )
        .map_err(update_failed("progress"))?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "record not found"));
    }
    Ok(json!({ "ok": true }))
}

fn records_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ids = get_str_list(params, "ids")?;
    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut deleted = 0usize;
    for id in &ids {
        deleted += tx
            .execute("DELETE FROM progress WHERE id = ?", [id])
            .map_err(update_failed("progress"))?;
    }
    tx.commit().map_err(tx_failed)?;
    Ok(json!({ "deleted": deleted }))
}

/// Marks each listed student present on `date`, unless they already have a row on that date.
fn records_bulk_attendance(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_date(params, "date")?;
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    let mut parsed: Vec<(String, String)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = get_required_text(entry, "name")?;
        let class_id = canonical_class_id(&get_required_text(entry, "classId")?);
        parsed.push((name, class_id));
    }

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut inserted = 0usize;
    let mut skipped: Vec<String> = Vec::new();
    for (name, class_id) in parsed {
        let exists = tx
            .query_row(
                "SELECT 1 FROM progress WHERE name = ? AND date = ?",
                (&name, &date),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(query_failed)?
            .is_some();
        if exists {
            skipped.push(name);
            continue;
        }
        tx.execute(
            "INSERT INTO progress(id, date, name, class_id, status, note, flag)
             VALUES(?, ?, ?, ?, ?, ?, 0)",
            (
                Uuid::new_v4().to_string(),
                &date,
                &name,
                &class_id,
                Status::Present.as_str(),
                NOTE_PLACEHOLDER,
            ),
        )
        .map_err(update_failed("progress"))?;
        inserted += 1;
    }
    tx.commit().map_err(tx_failed)?;
    tracing::info!(%date, inserted, skipped = skipped.len(), "bulk attendance recorded");
    Ok(json!({ "inserted": inserted, "skipped": skipped }))
}

fn records_set_note(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let ids = get_str_list(params, "ids")?;
    let note = get_required_text(params, "note")?;
    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut updated = 0usize;
    for id in &ids {
        updated += tx
            .execute("UPDATE progress SET note = ? WHERE id = ?", (&note, id))
            .map_err(update_failed("progress"))?;
    }
    tx.commit().map_err(tx_failed)?;
    Ok(json!({ "updated": updated }))
}

fn records_names(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT name FROM progress ORDER BY name")
        .map_err(query_failed)?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;
    Ok(json!({ "names": names }))
}

fn records_last_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_text(params, "name")?;
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM progress WHERE name = ? ORDER BY date DESC, rowid DESC LIMIT 1",
            [&name],
            |r| r.get(0),
        )
        .optional()
        .map_err(query_failed)?;
    Ok(json!({ "name": name, "classId": class_id }))
}

/// Each known name with the class of its most recently entered row.
fn records_roster(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_filter = get_optional_str(params, "classId")
        .filter(|c| c != "all")
        .map(|c| canonical_class_id(&c));
    let mut stmt = conn
        .prepare(
            "SELECT name, class_id FROM progress
             WHERE rowid IN (SELECT MAX(rowid) FROM progress GROUP BY name)",
        )
        .map_err(query_failed)?;
    let mut rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;
    if let Some(c) = &class_filter {
        rows.retain(|(_, class_id)| class_id == c);
    }
    rows.sort_by(|a, b| class_order(&a.1, &b.1).then_with(|| a.0.cmp(&b.0)));
    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(name, class_id)| json!({ "name": name, "classId": class_id }))
        .collect();
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "records.list" => with_db(state, req, records_list),
        "records.get" => with_db(state, req, records_get),
        "records.create" => with_db(state, req, records_create),
        "records.update" => with_db(state, req, records_update),
        "records.delete" => with_db(state, req, records_delete),
        "records.bulkAttendance" => with_db(state, req, records_bulk_attendance),
        "records.setNote" => with_db(state, req, records_set_note),
        "records.names" => with_db(state, req, |conn, _| records_names(conn)),
        "records.lastClass" => with_db(state, req, records_last_class),
        "records.roster" => with_db(state, req, records_roster),
        _ => return None,
    };
    Some(resp)
}
