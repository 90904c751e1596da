//! Expected-session reconciliation: how many sessions each student and each class slot
//! should have had over a period, against how many were actually recorded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::calendar::{canonical_class_id, class_order, count_expected, display_class, ClassSlot};
use crate::error::EngineError;
use crate::model::{
    ClassPeriodSummary, DateRange, Status, StudentDetail, StudentPeriodStats, StudentProfile,
};
use crate::store::{ProfileFilter, RecordFilter, RecordStore};

/// Which attendance rows count toward a class headcount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeadcountScope {
    #[default]
    Period,
    /// Every student ever recorded under the class, regardless of the period.
    AllTime,
}

/// Where a student's expected sessions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpectedBasis {
    /// Sum over every class the student has records under in the period.
    #[default]
    ClassesInPeriod,
    /// Only the profile's home class.
    ProfileClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsOptions {
    pub headcount_scope: HeadcountScope,
    pub expected_basis: ExpectedBasis,
}

/// Maps a profile onto the key attendance rows are filed under.
pub trait IdentityJoin {
    fn record_name<'p>(&self, profile: &'p StudentProfile) -> &'p str;
}

/// Exact, case- and whitespace-sensitive name equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameJoin;

impl IdentityJoin for NameJoin {
    fn record_name<'p>(&self, profile: &'p StudentProfile) -> &'p str {
        &profile.name
    }
}

pub fn count_by_status<S: RecordStore + ?Sized>(
    store: &S,
    student_name: &str,
    status: Status,
    range: &DateRange,
) -> Result<i64, EngineError> {
    let filter = RecordFilter {
        status: Some(status),
        ..RecordFilter::student(student_name, range)
    };
    Ok(store.query_records(&filter)?.len() as i64)
}

pub fn distinct_classes_in_period<S: RecordStore + ?Sized>(
    store: &S,
    student_name: &str,
    range: &DateRange,
) -> Result<Vec<String>, EngineError> {
    let records = store.query_records(&RecordFilter::student(student_name, range))?;
    Ok(sorted_distinct(records.into_iter().map(|r| r.class_id)))
}

fn sorted_distinct(class_ids: impl Iterator<Item = String>) -> Vec<String> {
    let unique: BTreeSet<String> = class_ids.map(|c| canonical_class_id(&c)).collect();
    let mut out: Vec<String> = unique.into_iter().collect();
    out.sort_by(|a, b| class_order(a, b));
    out
}

/// The requested period, or the span of all recorded dates when none was given.
pub fn resolve_range<S: RecordStore + ?Sized>(
    store: &S,
    requested: Option<DateRange>,
) -> Result<Option<DateRange>, EngineError> {
    match requested {
        Some(range) => Ok(Some(range)),
        None => store.min_max_date(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Classes the student has rows under in the period, in slot order.
    pub classes: Vec<String>,
    pub attended: i64,
    pub absent: i64,
    pub expected: i64,
}

/// Attended/expected/absent for one student name over one period.
///
/// `home_class` is the profile's nominal class, used when the student has no rows in the period.
pub fn reconcile_student<S: RecordStore + ?Sized>(
    store: &S,
    student_name: &str,
    home_class: Option<&str>,
    range: &DateRange,
    options: StatsOptions,
) -> Result<Reconciled, EngineError> {
    let attended = count_by_status(store, student_name, Status::Present, range)?;
    let classes = distinct_classes_in_period(store, student_name, range)?;

    let fallback = || home_class.map(|c| count_expected(c, range)).unwrap_or(0);
    let expected = match options.expected_basis {
        ExpectedBasis::ClassesInPeriod if !classes.is_empty() => {
            classes.iter().map(|c| count_expected(c, range)).sum()
        }
        _ => fallback(),
    };
    Ok(Reconciled {
        classes,
        attended,
        absent: (expected - attended).max(0),
        expected,
    })
}

fn display_classes(classes: &[String], home_class: &str) -> String {
    if classes.is_empty() {
        display_class(home_class)
    } else {
        classes
            .iter()
            .map(|c| display_class(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn student_period_stats<S: RecordStore + ?Sized, J: IdentityJoin + ?Sized>(
    store: &S,
    join: &J,
    profile: &StudentProfile,
    range: &DateRange,
    options: StatsOptions,
) -> Result<StudentPeriodStats, EngineError> {
    let name = join.record_name(profile);
    let r = reconcile_student(store, name, Some(&profile.class_id), range, options)?;
    Ok(StudentPeriodStats {
        student_id: profile.student_id.clone(),
        name: profile.name.clone(),
        display_classes: display_classes(&r.classes, &profile.class_id),
        classes: r.classes,
        attended: r.attended,
        absent: r.absent,
        expected_total: r.expected,
    })
}

/// One row per profile, ordered by student id. Empty when no range is given and no records exist.
pub fn compute_student_period_stats<S: RecordStore + ?Sized>(
    store: &S,
    requested: Option<DateRange>,
    options: StatsOptions,
) -> Result<Vec<StudentPeriodStats>, EngineError> {
    compute_student_period_stats_with(store, &NameJoin, requested, options)
}

pub fn compute_student_period_stats_with<S: RecordStore + ?Sized, J: IdentityJoin + ?Sized>(
    store: &S,
    join: &J,
    requested: Option<DateRange>,
    options: StatsOptions,
) -> Result<Vec<StudentPeriodStats>, EngineError> {
    let Some(range) = resolve_range(store, requested)? else {
        return Ok(Vec::new());
    };
    let mut profiles = store.query_profiles(&ProfileFilter::default())?;
    profiles.sort_by(|a, b| a.student_id.cmp(&b.student_id));
    profiles
        .iter()
        .map(|p| student_period_stats(store, join, p, &range, options))
        .collect()
}

/// Per-class roll-up in fixed slot order; always four rows.
pub fn compute_class_summaries<S: RecordStore + ?Sized>(
    store: &S,
    requested: Option<DateRange>,
    options: StatsOptions,
) -> Result<Vec<ClassPeriodSummary>, EngineError> {
    let range = resolve_range(store, requested)?.unwrap_or_else(DateRange::empty);
    ClassSlot::ALL
        .into_iter()
        .map(|slot| class_summary(store, slot, &range, options))
        .collect()
}

pub fn class_summary<S: RecordStore + ?Sized>(
    store: &S,
    slot: ClassSlot,
    range: &DateRange,
    options: StatsOptions,
) -> Result<ClassPeriodSummary, EngineError> {
    let class_filter = RecordFilter {
        class_id: Some(slot.code().to_string()),
        ..RecordFilter::default()
    };
    let in_period = store.query_records(&RecordFilter {
        range: Some(*range),
        ..class_filter.clone()
    })?;

    let headcount = match options.headcount_scope {
        HeadcountScope::Period => distinct_names(in_period.iter().map(|r| &r.student_name)),
        HeadcountScope::AllTime => {
            let all = store.query_records(&class_filter)?;
            distinct_names(all.iter().map(|r| &r.student_name))
        }
    };
    let expected_per_student = count_expected(slot.code(), range);
    let total_expected = headcount * expected_per_student;
    let present_count = in_period
        .iter()
        .filter(|r| r.status == Status::Present)
        .count() as i64;
    let absent_count = (total_expected - present_count).max(0);
    let percent = if total_expected > 0 {
        present_count as f64 / total_expected as f64 * 100.0
    } else {
        0.0
    };

    Ok(ClassPeriodSummary {
        class_id: slot,
        label: slot.label(),
        headcount,
        expected_per_student,
        total_expected,
        present_count,
        absent_count,
        percent,
    })
}

fn distinct_names<'a>(names: impl Iterator<Item = &'a String>) -> i64 {
    names.collect::<BTreeSet<_>>().len() as i64
}

/// Name and the classes each profiled student attended in the period, ordered by name.
pub fn compute_student_details<S: RecordStore + ?Sized>(
    store: &S,
    requested: Option<DateRange>,
) -> Result<Vec<StudentDetail>, EngineError> {
    let range = resolve_range(store, requested)?.unwrap_or_else(DateRange::empty);
    let mut profiles = store.query_profiles(&ProfileFilter::default())?;
    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    profiles
        .iter()
        .map(|p| {
            let classes = distinct_classes_in_period(store, NameJoin.record_name(p), &range)?;
            Ok(StudentDetail {
                name: p.name.clone(),
                display_classes: display_classes(&classes, &p.class_id),
            })
        })
        .collect()
}
