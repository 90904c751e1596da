use crate::calendar::canonical_class_id;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, get_required_text, query_failed, store, tx_failed,
    update_failed, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentProfile;
use crate::store::{profile_from_row, ProfileFilter, RecordStore, PROFILE_COLUMNS};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct UnprofiledStudent {
    name: String,
    latest_class_id: String,
    record_count: i64,
    sessions_per_week: i64,
}

fn parse_profile(params: &serde_json::Value) -> Result<StudentProfile, HandlerErr> {
    let text = |key: &str| get_optional_str(params, key).unwrap_or_default();
    Ok(StudentProfile {
        student_id: get_required_text(params, "studentId")?,
        name: get_required_text(params, "name")?,
        class_id: canonical_class_id(&text("classId")),
        phone: text("phone"),
        parent_name: text("parentName"),
        date_of_birth: text("dateOfBirth"),
        address: text("address"),
        notes: text("notes"),
        registration_date: text("registrationDate"),
    })
}

fn find_profile(conn: &Connection, student_id: &str) -> Result<Option<StudentProfile>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE student_id = ?", PROFILE_COLUMNS),
        [student_id],
        profile_from_row,
    )
    .optional()
    .map_err(query_failed)
}

fn insert_profile(conn: &Connection, p: &StudentProfile) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO students(student_id, name, class_id, phone, parent_name, date_of_birth,
                              address, notes, registration_date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &p.student_id,
            &p.name,
            &p.class_id,
            &p.phone,
            &p.parent_name,
            &p.date_of_birth,
            &p.address,
            &p.notes,
            &p.registration_date,
        ),
    )
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let filter = ProfileFilter {
        keyword: get_optional_str(params, "keyword"),
    };
    let students = store(conn).query_profiles(&filter)?;
    Ok(json!({ "students": students }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = find_profile(conn, &student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let profile = parse_profile(params)?;
    if find_profile(conn, &profile.student_id)?.is_some() {
        return Err(HandlerErr::new(
            "conflict",
            format!("student id {} already exists", profile.student_id),
        ));
    }
    insert_profile(conn, &profile).map_err(update_failed("students"))?;
    Ok(json!({ "studentId": profile.student_id }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p = parse_profile(params)?;
    let changed = conn
        .execute(
            "UPDATE students SET name = ?, class_id = ?, phone = ?, parent_name = ?,
                date_of_birth = ?, address = ?, notes = ?, registration_date = ?
             WHERE student_id = ?",
            (
                &p.name,
                &p.class_id,
                &p.phone,
                &p.parent_name,
                &p.date_of_birth,
                &p.address,
                &p.notes,
                &p.registration_date,
                &p.student_id,
            ),
        )
        .map_err(update_failed("students"))?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Removes the profile only; attendance history stays.
fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let deleted = conn
        .execute("DELETE FROM students WHERE student_id = ?", [&student_id])
        .map_err(update_failed("students"))?;
    Ok(json!({ "deleted": deleted }))
}

fn list_unprofiled(conn: &Connection) -> Result<Vec<UnprofiledStudent>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT p.name, COUNT(*), COUNT(DISTINCT p.class_id),
                (SELECT q.class_id FROM progress q WHERE q.name = p.name
                 ORDER BY q.date DESC, q.rowid DESC LIMIT 1)
             FROM progress p
             WHERE NOT EXISTS (SELECT 1 FROM students s WHERE s.name = p.name)
             GROUP BY p.name
             ORDER BY p.name",
        )
        .map_err(query_failed)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(UnprofiledStudent {
                name: r.get(0)?,
                record_count: r.get(1)?,
                sessions_per_week: r.get(2)?,
                latest_class_id: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;
    Ok(rows)
}

fn students_without_profile(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let rows: Vec<serde_json::Value> = list_unprofiled(conn)?
        .into_iter()
        .map(|s| {
            json!({
                "name": s.name,
                "classId": s.latest_class_id,
                "recordCount": s.record_count,
                "sessionsPerWeek": s.sessions_per_week
            })
        })
        .collect();
    Ok(json!({ "students": rows }))
}

/// Creates one profile per unprofiled name, numbering ids from `start` and skipping taken ones.
fn students_import_from_records(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let prefix = get_optional_str(params, "prefix").unwrap_or_else(|| "HS".to_string());
    let start = match params.get("start") {
        None | Some(serde_json::Value::Null) => 1,
        Some(v) => v
            .as_u64()
            .filter(|n| *n >= 1)
            .ok_or_else(|| HandlerErr::bad_params("start must be a positive integer"))?,
    };
    let selected: Option<HashSet<String>> = params
        .get("names")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        });
    let registration_date = chrono::Local::now()
        .date_naive()
        .format(crate::model::ISO_DATE)
        .to_string();

    let candidates: Vec<UnprofiledStudent> = list_unprofiled(conn)?
        .into_iter()
        .filter(|s| selected.as_ref().map_or(true, |names| names.contains(&s.name)))
        .collect();

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut counter = start;
    let mut created: Vec<StudentProfile> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let student_id = loop {
            let id = format!("{}{:03}", prefix, counter);
            counter += 1;
            if find_profile(&tx, &id)?.is_none() {
                break id;
            }
        };
        let profile = StudentProfile {
            student_id,
            name: candidate.name,
            class_id: candidate.latest_class_id,
            notes: format!(
                "Imported from attendance records ({} sessions/week)",
                candidate.sessions_per_week
            ),
            registration_date: registration_date.clone(),
            ..StudentProfile::default()
        };
        insert_profile(&tx, &profile).map_err(update_failed("students"))?;
        created.push(profile);
    }
    tx.commit().map_err(tx_failed)?;
    tracing::info!(created = created.len(), %prefix, "profiles imported from attendance records");
    Ok(json!({ "created": created }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "students.list" | "students.search" => with_db(state, req, students_list),
        "students.get" => with_db(state, req, students_get),
        "students.create" => with_db(state, req, students_create),
        "students.update" => with_db(state, req, students_update),
        "students.delete" => with_db(state, req, students_delete),
        "students.withoutProfile" => with_db(state, req, |conn, _| students_without_profile(conn)),
        "students.importFromRecords" => with_db(state, req, students_import_from_records),
        _ => return None,
    };
    Some(resp)
}
