use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::ClassSlot;
use crate::error::EngineError;

/// Placeholder note written by bulk attendance before the tutor adds an end-of-session remark.
pub const NOTE_PLACEHOLDER: &str = "(no note yet)";

pub const ISO_DATE: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
        }
    }

    /// Accepts the stored codes and the wording older workspaces were written with.
    pub fn parse(raw: &str) -> Option<Status> {
        let t = raw.trim();
        if t.eq_ignore_ascii_case("present") || t == "Đi học" {
            Some(Status::Present)
        } else if t.eq_ignore_ascii_case("absent") || t == "Nghỉ học" {
            Some(Status::Absent)
        } else {
            None
        }
    }
}

/// Display-only highlight of a record row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Flag {
    #[default]
    Normal,
    NeedsAttention,
    Good,
    Alert,
}

impl Flag {
    pub fn from_code(code: i64) -> Flag {
        match code {
            1 => Flag::NeedsAttention,
            2 => Flag::Good,
            3 => Flag::Alert,
            _ => Flag::Normal,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Flag::Normal => 0,
            Flag::NeedsAttention => 1,
            Flag::Good => 2,
            Flag::Alert => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    /// Stored text; older rows are not guaranteed to be well-formed ISO dates.
    pub date: String,
    pub student_name: String,
    pub class_id: String,
    pub status: Status,
    pub note: String,
    pub flag: Flag,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentProfile {
    pub student_id: String,
    pub name: String,
    pub class_id: String,
    pub phone: String,
    pub parent_name: String,
    pub date_of_birth: String,
    pub address: String,
    pub notes: String,
    pub registration_date: String,
}

/// Inclusive period. A range whose start is after its end is empty and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, EngineError> {
        Ok(Self::new(parse_iso_date(start)?, parse_iso_date(end)?))
    }

    pub fn empty() -> Self {
        Self::new(NaiveDate::MAX, NaiveDate::MIN)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn start_key(&self) -> String {
        self.start.format(ISO_DATE).to_string()
    }

    pub fn end_key(&self) -> String {
        self.end.format(ISO_DATE).to_string()
    }
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw.trim(), ISO_DATE)
        .map_err(|_| EngineError::MalformedDate(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPeriodStats {
    pub student_id: String,
    pub name: String,
    pub classes: Vec<String>,
    pub display_classes: String,
    pub attended: i64,
    pub absent: i64,
    pub expected_total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPeriodSummary {
    pub class_id: ClassSlot,
    pub label: &'static str,
    pub headcount: i64,
    pub expected_per_student: i64,
    pub total_expected: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub percent: f64,
}

impl ClassPeriodSummary {
    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    pub name: String,
    pub display_classes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_legacy_wording() {
        assert_eq!(Status::parse("Đi học"), Some(Status::Present));
        assert_eq!(Status::parse(" absent "), Some(Status::Absent));
        assert_eq!(Status::parse("late"), None);
    }

    #[test]
    fn inverted_range_is_empty() {
        let r = DateRange::parse("2024-02-01", "2024-01-01").expect("parse");
        assert!(r.is_empty());
        assert_eq!(r.days().count(), 0);
        assert!(DateRange::empty().is_empty());
    }

    #[test]
    fn malformed_date_is_reported() {
        let e = parse_iso_date("2024/01/06").unwrap_err();
        assert!(matches!(e, EngineError::MalformedDate(ref s) if s == "2024/01/06"));
    }
}
