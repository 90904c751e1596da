use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::calendar::ClassSlot;
use crate::model::Status;
use crate::stats::StatsOptions;

pub const DB_FILE_NAME: &str = "tutoring.sqlite3";
pub const STATS_OPTIONS_KEY: &str = "stats.options";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS progress(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            status TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    // Workspaces created before row highlighting have no flag column.
    ensure_progress_flag(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_name_date ON progress(name, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_class_date ON progress(class_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT,
            parent_name TEXT,
            date_of_birth TEXT,
            address TEXT,
            notes TEXT,
            class_id TEXT,
            registration_date TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    migrate_legacy_labels(conn)?;
    Ok(())
}

fn ensure_progress_flag(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "progress", "flag")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE progress ADD COLUMN flag INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn migrate_legacy_labels(conn: &Connection) -> anyhow::Result<()> {
    // Rows written by the first desktop app carry display labels instead of codes,
    // and hand-edited rows may differ in case or padding.
    for slot in ClassSlot::ALL {
        for table in ["progress", "students"] {
            conn.execute(
                &format!(
                    "UPDATE {table} SET class_id = ?1
                     WHERE class_id <> ?1
                       AND (TRIM(class_id) = ?1 COLLATE NOCASE
                            OR TRIM(class_id) = ?2 COLLATE NOCASE
                            OR TRIM(class_id) = ?3)"
                ),
                (slot.code(), slot.label(), slot.legacy_label()),
            )?;
        }
    }
    for (legacy, status) in [("Đi học", Status::Present), ("Nghỉ học", Status::Absent)] {
        conn.execute(
            "UPDATE progress SET status = ?1
             WHERE status <> ?1 AND (TRIM(status) = ?1 COLLATE NOCASE OR TRIM(status) = ?2)",
            (status.as_str(), legacy),
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Stored statistics options; a missing or unreadable entry yields the defaults.
pub fn stats_options(conn: &Connection) -> anyhow::Result<StatsOptions> {
    let Some(value) = settings_get_json(conn, STATS_OPTIONS_KEY)? else {
        return Ok(StatsOptions::default());
    };
    match serde_json::from_value(value) {
        Ok(options) => Ok(options),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable {}", STATS_OPTIONS_KEY);
            Ok(StatsOptions::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ExpectedBasis, HeadcountScope};
    use serde_json::json;

    #[test]
    fn legacy_rows_are_normalized_on_open() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE progress(
                id TEXT PRIMARY KEY, date TEXT NOT NULL, name TEXT NOT NULL,
                class_id TEXT NOT NULL, status TEXT NOT NULL, note TEXT NOT NULL DEFAULT ''
            )",
            [],
        )
        .expect("legacy table");
        conn.execute(
            "INSERT INTO progress(id, date, name, class_id, status, note)
             VALUES('1', '2024-01-06', 'An', 'Chiều T7', 'Đi học', '')",
            [],
        )
        .expect("insert");

        init_schema(&conn).expect("schema");
        assert!(table_has_column(&conn, "progress", "flag").expect("pragma"));
        let (class_id, status, flag): (String, String, i64) = conn
            .query_row("SELECT class_id, status, flag FROM progress", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .expect("row");
        assert_eq!(class_id, "SatPM");
        assert_eq!(status, "present");
        assert_eq!(flag, 0);
    }

    #[test]
    fn english_labels_and_capitalized_statuses_are_normalized() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        for (id, class_id, status) in [
            ("1", "Saturday morning", "Present"),
            ("2", " satpm ", "ABSENT"),
            ("3", "Evening", "late"),
        ] {
            conn.execute(
                "INSERT INTO progress(id, date, name, class_id, status, note, flag)
                 VALUES(?, '2024-01-06', 'An', ?, ?, '', 0)",
                (id, class_id, status),
            )
            .expect("insert");
        }
        init_schema(&conn).expect("reopen");

        let rows: Vec<(String, String)> = conn
            .prepare("SELECT class_id, status FROM progress ORDER BY id")
            .expect("prepare")
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(
            rows,
            vec![
                ("SatAM".to_string(), "present".to_string()),
                ("SatPM".to_string(), "absent".to_string()),
                ("Evening".to_string(), "late".to_string()),
            ]
        );
    }

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first");
        init_schema(&conn).expect("second");
    }

    #[test]
    fn stats_options_roundtrip_and_defaults() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        assert_eq!(stats_options(&conn).expect("options"), StatsOptions::default());

        settings_set_json(&conn, STATS_OPTIONS_KEY, &json!({ "headcountScope": "allTime" }))
            .expect("set");
        let options = stats_options(&conn).expect("options");
        assert_eq!(options.headcount_scope, HeadcountScope::AllTime);
        assert_eq!(options.expected_basis, ExpectedBasis::ClassesInPeriod);

        settings_set_json(&conn, STATS_OPTIONS_KEY, &json!({ "headcountScope": 7 })).expect("set");
        assert_eq!(stats_options(&conn).expect("options"), StatsOptions::default());
    }
}
