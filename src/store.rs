use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use crate::calendar::canonical_class_id;
use crate::error::EngineError;
use crate::model::{parse_iso_date, AttendanceRecord, DateRange, Flag, Status, StudentProfile};

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Exact, case-sensitive match.
    pub student_name: Option<String>,
    pub class_id: Option<String>,
    pub status: Option<Status>,
    pub range: Option<DateRange>,
}

impl RecordFilter {
    pub fn student(name: &str, range: &DateRange) -> Self {
        Self {
            student_name: Some(name.to_string()),
            range: Some(*range),
            ..Self::default()
        }
    }

    /// Class and status criteria against a row as read back from the store.
    pub fn matches_row(&self, record: &AttendanceRecord) -> bool {
        let class_ok = self
            .class_id
            .as_ref()
            .map_or(true, |c| canonical_class_id(&record.class_id) == canonical_class_id(c));
        class_ok && self.status.map_or(true, |s| record.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    /// Substring over id, name, phone and parent name.
    pub keyword: Option<String>,
}

/// Read side of the record store the engine depends on.
pub trait RecordStore {
    fn query_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, EngineError>;
    /// Ordered by student id.
    fn query_profiles(&self, filter: &ProfileFilter) -> Result<Vec<StudentProfile>, EngineError>;
    /// Earliest and latest well-formed record date, `None` when there are no records.
    fn min_max_date(&self) -> Result<Option<DateRange>, EngineError>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

pub const RECORD_COLUMNS: &str = "id, date, name, class_id, status, note, flag";
pub const PROFILE_COLUMNS: &str = "student_id, name, class_id, phone, parent_name, date_of_birth, address, notes, registration_date";

pub fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status: String = r.get(4)?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        date: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
        student_name: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
        class_id: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
        // Unrecognized status words never count as attendance.
        status: Status::parse(&status).unwrap_or(Status::Absent),
        note: r.get::<_, Option<String>>(5)?.unwrap_or_default(),
        flag: Flag::from_code(r.get::<_, Option<i64>>(6)?.unwrap_or(0)),
    })
}

pub fn profile_from_row(r: &Row<'_>) -> rusqlite::Result<StudentProfile> {
    let text = |i: usize| -> rusqlite::Result<String> {
        Ok(r.get::<_, Option<String>>(i)?.unwrap_or_default())
    };
    Ok(StudentProfile {
        student_id: r.get(0)?,
        name: text(1)?,
        class_id: text(2)?,
        phone: text(3)?,
        parent_name: text(4)?,
        date_of_birth: text(5)?,
        address: text(6)?,
        notes: text(7)?,
        registration_date: text(8)?,
    })
}

impl RecordStore for SqliteStore<'_> {
    fn query_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, EngineError> {
        let mut sql = format!("SELECT {} FROM progress WHERE 1 = 1", RECORD_COLUMNS);
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(name) = &filter.student_name {
            sql.push_str(" AND name = ?");
            bind_values.push(Value::Text(name.clone()));
        }
        if let Some(range) = &filter.range {
            if range.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(" AND date BETWEEN ? AND ?");
            bind_values.push(Value::Text(range.start_key()));
            bind_values.push(Value::Text(range.end_key()));
        }
        sql.push_str(" ORDER BY date, rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        // Class and status are matched on the parsed row so every accepted spelling counts.
        Ok(rows.into_iter().filter(|r| filter.matches_row(r)).collect())
    }

    fn query_profiles(&self, filter: &ProfileFilter) -> Result<Vec<StudentProfile>, EngineError> {
        let keyword = filter
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let mut sql = format!("SELECT {} FROM students", PROFILE_COLUMNS);
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(k) = keyword {
            sql.push_str(
                " WHERE student_id LIKE ?1 OR name LIKE ?1 OR phone LIKE ?1 OR parent_name LIKE ?1",
            );
            bind_values.push(Value::Text(format!("%{}%", k)));
        }
        sql.push_str(" ORDER BY student_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values), profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn min_max_date(&self) -> Result<Option<DateRange>, EngineError> {
        let (min, max): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM progress
             WHERE date GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let (Some(min), Some(max)) = (min, max) else {
            return Ok(None);
        };
        match (parse_iso_date(&min), parse_iso_date(&max)) {
            (Ok(start), Ok(end)) => Ok(Some(DateRange::new(start, end))),
            _ => {
                tracing::warn!(%min, %max, "record date bounds are not valid calendar dates");
                Ok(None)
            }
        }
    }
}

/// In-memory store used by the engine's unit tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub records: Vec<AttendanceRecord>,
    pub profiles: Vec<StudentProfile>,
    pub unavailable: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn record(&mut self, name: &str, class_id: &str, date: &str, status: Status) -> &mut Self {
        let id = format!("r{}", self.records.len() + 1);
        self.records.push(AttendanceRecord {
            id,
            date: date.to_string(),
            student_name: name.to_string(),
            class_id: class_id.to_string(),
            status,
            note: crate::model::NOTE_PLACEHOLDER.to_string(),
            flag: Flag::Normal,
        });
        self
    }

    pub fn present(&mut self, name: &str, class_id: &str, date: &str) -> &mut Self {
        self.record(name, class_id, date, Status::Present)
    }

    pub fn profile(&mut self, student_id: &str, name: &str, class_id: &str) -> &mut Self {
        self.profiles.push(StudentProfile {
            student_id: student_id.to_string(),
            name: name.to_string(),
            class_id: class_id.to_string(),
            ..StudentProfile::default()
        });
        self
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.unavailable {
            return Err(EngineError::DataUnavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl RecordStore for MemoryStore {
    fn query_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, EngineError> {
        self.check()?;
        let in_range = |r: &AttendanceRecord| match (&filter.range, parse_iso_date(&r.date).ok()) {
            (None, _) => true,
            (Some(range), Some(d)) => range.start <= d && d <= range.end,
            (Some(_), None) => false,
        };
        Ok(self
            .records
            .iter()
            .filter(|r| filter.student_name.as_ref().map_or(true, |n| &r.student_name == n))
            .filter(|r| filter.matches_row(r))
            .filter(|r| in_range(r))
            .cloned()
            .collect())
    }

    fn query_profiles(&self, filter: &ProfileFilter) -> Result<Vec<StudentProfile>, EngineError> {
        self.check()?;
        // Case-insensitive substring, as SQLite LIKE is for ASCII.
        let keyword = filter
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);
        let mut out: Vec<StudentProfile> = self
            .profiles
            .iter()
            .filter(|p| {
                keyword.as_ref().map_or(true, |k| {
                    [&p.student_id, &p.name, &p.phone, &p.parent_name]
                        .iter()
                        .any(|field| field.to_lowercase().contains(k.as_str()))
                })
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(out)
    }

    fn min_max_date(&self) -> Result<Option<DateRange>, EngineError> {
        self.check()?;
        let dates: Vec<chrono::NaiveDate> = self
            .records
            .iter()
            .filter_map(|r| parse_iso_date(&r.date).ok())
            .collect();
        match (dates.iter().min(), dates.iter().max()) {
            (Some(start), Some(end)) => Ok(Some(DateRange::new(*start, *end))),
            _ => Ok(None),
        }
    }
}
