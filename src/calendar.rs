use chrono::{Datelike, Weekday};
use serde::Serialize;
use std::cmp::Ordering;

use crate::model::DateRange;

/// The four recurring weekly class slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ClassSlot {
    #[serde(rename = "SatAM")]
    SaturdayMorning,
    #[serde(rename = "SatPM")]
    SaturdayAfternoon,
    #[serde(rename = "SunAM")]
    SundayMorning,
    #[serde(rename = "SunPM")]
    SundayAfternoon,
}

impl ClassSlot {
    pub const ALL: [ClassSlot; 4] = [
        ClassSlot::SaturdayMorning,
        ClassSlot::SaturdayAfternoon,
        ClassSlot::SundayMorning,
        ClassSlot::SundayAfternoon,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ClassSlot::SaturdayMorning => "SatAM",
            ClassSlot::SaturdayAfternoon => "SatPM",
            ClassSlot::SundayMorning => "SunAM",
            ClassSlot::SundayAfternoon => "SunPM",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClassSlot::SaturdayMorning => "Saturday morning",
            ClassSlot::SaturdayAfternoon => "Saturday afternoon",
            ClassSlot::SundayMorning => "Sunday morning",
            ClassSlot::SundayAfternoon => "Sunday afternoon",
        }
    }

    /// Labels written by the first generation of the desktop app.
    pub fn legacy_label(self) -> &'static str {
        match self {
            ClassSlot::SaturdayMorning => "Sáng T7",
            ClassSlot::SaturdayAfternoon => "Chiều T7",
            ClassSlot::SundayMorning => "Sáng CN",
            ClassSlot::SundayAfternoon => "Chiều CN",
        }
    }

    pub fn parse(raw: &str) -> Option<ClassSlot> {
        let t = raw.trim();
        ClassSlot::ALL.into_iter().find(|slot| {
            t.eq_ignore_ascii_case(slot.code())
                || t.eq_ignore_ascii_case(slot.label())
                || t == slot.legacy_label()
        })
    }

    pub fn weekdays(self) -> &'static [Weekday] {
        match self {
            ClassSlot::SaturdayMorning | ClassSlot::SaturdayAfternoon => &[Weekday::Sat],
            ClassSlot::SundayMorning | ClassSlot::SundayAfternoon => &[Weekday::Sun],
        }
    }
}

/// Unknown class identifiers have no schedule.
pub fn weekdays_for(class_id: &str) -> &'static [Weekday] {
    ClassSlot::parse(class_id).map(ClassSlot::weekdays).unwrap_or(&[])
}

/// Walks every day of the inclusive range and counts the ones the class meets on.
pub fn count_expected(class_id: &str, range: &DateRange) -> i64 {
    let weekdays = weekdays_for(class_id);
    if weekdays.is_empty() || range.is_empty() {
        return 0;
    }
    range
        .days()
        .filter(|d| weekdays.contains(&d.weekday()))
        .count() as i64
}

/// String-boundary form used by per-row callers. Malformed dates count as an empty period.
pub fn count_expected_sessions(class_id: &str, start: &str, end: &str) -> i64 {
    match DateRange::parse(start, end) {
        Ok(range) => count_expected(class_id, &range),
        Err(e) => {
            tracing::warn!(class_id, start, end, error = %e, "expected-session count on malformed date");
            0
        }
    }
}

/// Stored form of a class identifier: the slot code when recognized, otherwise the trimmed input.
pub fn canonical_class_id(raw: &str) -> String {
    match ClassSlot::parse(raw) {
        Some(slot) => slot.code().to_string(),
        None => raw.trim().to_string(),
    }
}

pub fn display_class(class_id: &str) -> String {
    match ClassSlot::parse(class_id) {
        Some(slot) => slot.label().to_string(),
        None => class_id.to_string(),
    }
}

/// Slot order first; unrecognized identifiers sort after the slots, by text.
pub fn class_order(a: &str, b: &str) -> Ordering {
    match (ClassSlot::parse(a), ClassSlot::parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).expect("range")
    }

    #[test]
    fn single_day_ranges() {
        assert_eq!(count_expected("SatAM", &range("2024-01-06", "2024-01-06")), 1);
        assert_eq!(count_expected("SatAM", &range("2024-01-07", "2024-01-07")), 0);
        assert_eq!(count_expected("SunPM", &range("2024-01-07", "2024-01-07")), 1);
    }

    #[test]
    fn january_2024_has_four_saturdays() {
        assert_eq!(count_expected("SatPM", &range("2024-01-01", "2024-01-31")), 4);
        assert_eq!(count_expected("SunAM", &range("2024-01-01", "2024-01-31")), 4);
    }

    #[test]
    fn inverted_range_counts_nothing() {
        for slot in ClassSlot::ALL {
            assert_eq!(count_expected(slot.code(), &range("2024-03-31", "2024-03-01")), 0);
        }
    }

    #[test]
    fn unknown_class_has_no_sessions() {
        assert!(weekdays_for("Monday evening").is_empty());
        assert_eq!(count_expected("Monday evening", &range("2024-01-01", "2024-12-31")), 0);
    }

    #[test]
    fn legacy_labels_resolve_to_slots() {
        assert_eq!(ClassSlot::parse("Chiều T7"), Some(ClassSlot::SaturdayAfternoon));
        assert_eq!(ClassSlot::parse("sunam"), Some(ClassSlot::SundayMorning));
        assert_eq!(canonical_class_id(" Sáng CN "), "SunAM");
        assert_eq!(canonical_class_id("Extra "), "Extra");
    }

    #[test]
    fn string_boundary_swallows_malformed_dates() {
        assert_eq!(count_expected_sessions("SatAM", "2024-01-01", "2024-01-31"), 4);
        assert_eq!(count_expected_sessions("SatAM", "01/01/2024", "2024-01-31"), 0);
    }

    #[test]
    fn ordering_puts_slots_before_unknown() {
        let mut ids = vec!["zeta", "SunPM", "SatPM", "alpha", "SatAM"];
        ids.sort_by(|a, b| class_order(a, b));
        assert_eq!(ids, vec!["SatAM", "SatPM", "SunPM", "alpha", "zeta"]);
    }

    #[test]
    fn leap_february_sundays() {
        // 2024-02: Sundays on 4, 11, 18, 25.
        assert_eq!(count_expected("SunAM", &range("2024-02-01", "2024-02-29")), 4);
    }
}
