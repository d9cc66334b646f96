//! Overlap detection between a candidate entry and an employee's existing records.
//!
//! Every existing record whose range intersects the candidate is classified
//! with a [`Severity`]. `Critical` conflicts block creation and approval,
//! `Warning` and `Info` are returned to the caller for display only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::calendar::WorkCalendar;
use super::{DateRange, EntryKind, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What a conflict was raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Vacation,
    Permission,
    SickLeave,
    BusinessTrip,
    Attendance,
    Holiday,
}

impl From<EntryKind> for ConflictKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Vacation => ConflictKind::Vacation,
            EntryKind::Permission => ConflictKind::Permission,
            EntryKind::SickLeave => ConflictKind::SickLeave,
            EntryKind::BusinessTrip => ConflictKind::BusinessTrip,
            EntryKind::Attendance => ConflictKind::Attendance,
        }
    }
}

/// The entry being validated.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: EntryKind,
    pub range: DateRange,
    pub window: Option<TimeWindow>,
    /// Own record id when re-validating an existing entry.
    pub exclude_id: Option<Uuid>,
}

impl Candidate {
    pub fn new(kind: EntryKind, range: DateRange) -> Self {
        Self { kind, range, window: None, exclude_id: None }
    }

    pub fn with_window(mut self, window: Option<TimeWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn excluding(mut self, id: Uuid) -> Self {
        self.exclude_id = Some(id);
        self
    }
}

/// A record already on the employee's calendar. Rejected records are never loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingEntry {
    pub id: Uuid,
    pub kind: EntryKind,
    /// Pending requests and trips are `false`; sick leave and attendance are always `true`.
    pub approved: bool,
    pub range: DateRange,
    pub window: Option<TimeWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub severity: Severity,
    pub kind: ConflictKind,
    pub source_id: Option<Uuid>,
    /// Overlapping part only.
    #[serde(flatten)]
    pub range: DateRange,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    pub has_critical: bool,
}

impl ConflictReport {
    /// Sorts most severe first, then by date.
    pub fn new(mut conflicts: Vec<Conflict>) -> Self {
        conflicts.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.range.start().cmp(&b.range.start())));
        let has_critical = conflicts.iter().any(|c| c.severity == Severity::Critical);
        Self { conflicts, has_critical }
    }

    pub fn empty() -> Self {
        Self { conflicts: Vec::new(), has_critical: false }
    }

    pub fn has_critical(&self) -> bool {
        self.has_critical
    }

    pub fn critical_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.severity == Severity::Critical).count()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.conflicts.first().map(|c| c.severity)
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

pub fn detect_conflicts(candidate: &Candidate, existing: &[ExistingEntry], calendar: &WorkCalendar) -> ConflictReport {
    let mut conflicts = Vec::new();

    for entry in existing {
        if candidate.exclude_id == Some(entry.id) {
            continue;
        }
        let Some(overlap) = candidate.range.intersection(&entry.range) else {
            continue;
        };
        let Some(severity) = classify(candidate, entry) else {
            continue;
        };
        conflicts.push(Conflict {
            severity,
            kind: entry.kind.into(),
            source_id: Some(entry.id),
            range: overlap,
            message: describe(candidate, entry, &overlap),
        });
    }

    if matches!(candidate.kind, EntryKind::Vacation | EntryKind::Permission | EntryKind::BusinessTrip) {
        let holidays = calendar.holidays_in(&candidate.range);
        if let (Some(first), Some(last)) = (holidays.first(), holidays.last()) {
            let listed: Vec<String> = holidays.iter().map(|d| d.to_string()).collect();
            conflicts.push(Conflict {
                severity: Severity::Info,
                kind: ConflictKind::Holiday,
                source_id: None,
                range: DateRange::new(*first, *last).unwrap_or_else(|_| DateRange::single(*first)),
                message: format!("holidays not counted: {}", listed.join(", ")),
            });
        }
    }

    ConflictReport::new(conflicts)
}

/// Dates in `window` on which a candidate of `kind` would hit a critical conflict.
pub fn conflict_dates(kind: EntryKind, window: &DateRange, existing: &[ExistingEntry]) -> Vec<NaiveDate> {
    window
        .days()
        .filter(|day| {
            let candidate = Candidate::new(kind, DateRange::single(*day));
            existing
                .iter()
                .filter(|e| e.range.contains(*day))
                .any(|e| classify(&candidate, e) == Some(Severity::Critical))
        })
        .collect()
}

fn classify(candidate: &Candidate, entry: &ExistingEntry) -> Option<Severity> {
    use EntryKind::*;
    use Severity::*;

    if !entry.approved {
        return Some(match (candidate.kind, entry.kind) {
            (_, BusinessTrip) => Warning,
            (Attendance, _) => Info,
            _ => Warning,
        });
    }

    let severity = match (candidate.kind, entry.kind) {
        (Vacation, _) => Critical,

        (Permission, Vacation | BusinessTrip | SickLeave) => Critical,
        (Permission, Permission) => match (candidate.window, entry.window) {
            (Some(a), Some(b)) if !a.overlaps(&b) => Warning,
            _ => Critical,
        },
        (Permission, Attendance) => {
            if candidate.window.is_some() {
                Info
            } else {
                Warning
            }
        }

        (BusinessTrip, Vacation | BusinessTrip | SickLeave) => Critical,
        (BusinessTrip, Permission | Attendance) => Warning,

        (SickLeave, SickLeave) => Critical,
        (SickLeave, _) => Warning,

        (Attendance, Vacation | SickLeave) => Critical,
        (Attendance, Permission) => {
            if entry.window.is_some() {
                Info
            } else {
                Critical
            }
        }
        (Attendance, BusinessTrip) => Info,
        // same-day attendance is an upsert, not a conflict
        (Attendance, Attendance) => return None,
    };
    Some(severity)
}

fn describe(candidate: &Candidate, entry: &ExistingEntry, overlap: &DateRange) -> String {
    let state = match (entry.kind, entry.approved) {
        (EntryKind::SickLeave | EntryKind::Attendance, _) => "recorded",
        (_, true) => "approved",
        (_, false) => "pending",
    };
    let hours = entry
        .window
        .map(|w| format!(" ({}-{})", w.start_time().format("%H:%M"), w.end_time().format("%H:%M")))
        .unwrap_or_default();
    format!(
        "{} overlaps {} {}{} on {}",
        candidate.kind.label(),
        state,
        entry.kind.label(),
        hours,
        overlap
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave::calendar::tests::office_week;
    use crate::leave::calendar::Holiday;
    use chrono::NaiveTime;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::new(d(a), d(b)).unwrap()
    }

    fn window(from: u32, to: u32) -> TimeWindow {
        TimeWindow::new(NaiveTime::from_hms_opt(from, 0, 0).unwrap(), NaiveTime::from_hms_opt(to, 0, 0).unwrap())
            .unwrap()
    }

    fn entry(kind: EntryKind, approved: bool, r: DateRange) -> ExistingEntry {
        ExistingEntry { id: Uuid::new_v4(), kind, approved, range: r, window: None }
    }

    fn calendar() -> WorkCalendar {
        WorkCalendar::new(office_week(), &[])
    }

    #[test]
    fn approved_vacation_blocks_overlapping_vacation() {
        let existing = vec![entry(EntryKind::Vacation, true, range("2025-08-04", "2025-08-08"))];
        let candidate = Candidate::new(EntryKind::Vacation, range("2025-08-07", "2025-08-12"));
        let report = detect_conflicts(&candidate, &existing, &calendar());

        assert!(report.has_critical());
        assert_eq!(report.conflicts.len(), 1);
        let c = &report.conflicts[0];
        assert_eq!(c.kind, ConflictKind::Vacation);
        assert_eq!(c.range, range("2025-08-07", "2025-08-08"));
        assert!(c.message.contains("approved vacation"));
    }

    #[test]
    fn pending_leave_only_warns() {
        let existing = vec![entry(EntryKind::Vacation, false, range("2025-08-04", "2025-08-08"))];
        let report = detect_conflicts(
            &Candidate::new(EntryKind::Vacation, range("2025-08-05", "2025-08-05")),
            &existing,
            &calendar(),
        );
        assert!(!report.has_critical());
        assert_eq!(report.max_severity(), Some(Severity::Warning));
    }

    #[test]
    fn excluded_record_is_ignored() {
        let own = entry(EntryKind::Vacation, false, range("2025-08-04", "2025-08-08"));
        let candidate = Candidate::new(EntryKind::Vacation, own.range).excluding(own.id);
        assert!(detect_conflicts(&candidate, &[own], &calendar()).is_empty());
    }

    #[test]
    fn hourly_permissions_conflict_only_when_windows_overlap() {
        let mut morning = entry(EntryKind::Permission, true, range("2025-03-12", "2025-03-12"));
        morning.window = Some(window(9, 11));

        let afternoon = Candidate::new(EntryKind::Permission, morning.range).with_window(Some(window(14, 16)));
        let report = detect_conflicts(&afternoon, &[morning.clone()], &calendar());
        assert_eq!(report.max_severity(), Some(Severity::Warning));

        let late_morning = Candidate::new(EntryKind::Permission, morning.range).with_window(Some(window(10, 12)));
        assert!(detect_conflicts(&late_morning, &[morning.clone()], &calendar()).has_critical());

        // a full-day permission always collides with any approved permission
        let full_day = Candidate::new(EntryKind::Permission, morning.range);
        assert!(detect_conflicts(&full_day, &[morning], &calendar()).has_critical());
    }

    #[test]
    fn sick_leave_over_vacation_is_a_warning() {
        let existing = vec![
            entry(EntryKind::Vacation, true, range("2025-07-14", "2025-07-25")),
            entry(EntryKind::SickLeave, true, range("2025-07-10", "2025-07-15")),
        ];
        let report = detect_conflicts(
            &Candidate::new(EntryKind::SickLeave, range("2025-07-16", "2025-07-18")),
            &existing,
            &calendar(),
        );
        assert!(!report.has_critical());
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::Vacation);

        let overlapping = detect_conflicts(
            &Candidate::new(EntryKind::SickLeave, range("2025-07-15", "2025-07-16")),
            &existing,
            &calendar(),
        );
        assert!(overlapping.has_critical());
        assert_eq!(overlapping.conflicts[0].kind, ConflictKind::SickLeave);
    }

    #[test]
    fn attendance_rules() {
        let mut hourly = entry(EntryKind::Permission, true, range("2025-02-03", "2025-02-03"));
        hourly.window = Some(window(16, 18));
        let existing = vec![
            entry(EntryKind::Vacation, true, range("2025-02-04", "2025-02-04")),
            hourly,
            entry(EntryKind::BusinessTrip, true, range("2025-02-05", "2025-02-05")),
            entry(EntryKind::Attendance, true, range("2025-02-06", "2025-02-06")),
            entry(EntryKind::BusinessTrip, false, range("2025-02-07", "2025-02-07")),
        ];
        let check = |day: &str| {
            detect_conflicts(&Candidate::new(EntryKind::Attendance, range(day, day)), &existing, &calendar())
                .max_severity()
        };
        assert_eq!(check("2025-02-03"), Some(Severity::Info));
        assert_eq!(check("2025-02-04"), Some(Severity::Critical));
        assert_eq!(check("2025-02-05"), Some(Severity::Info));
        assert_eq!(check("2025-02-06"), None);
        assert_eq!(check("2025-02-07"), Some(Severity::Warning));
    }

    #[test]
    fn business_trip_over_sick_leave_is_critical() {
        let existing = vec![entry(EntryKind::SickLeave, true, range("2025-09-01", "2025-09-03"))];
        let report = detect_conflicts(
            &Candidate::new(EntryKind::BusinessTrip, range("2025-09-03", "2025-09-05")),
            &existing,
            &calendar(),
        );
        assert!(report.has_critical());
    }

    #[test]
    fn holidays_in_range_are_reported_as_info() {
        let cal = WorkCalendar::new(
            office_week(),
            &[Holiday { id: Uuid::new_v4(), date: d("2025-08-15"), name: "Ferragosto".into(), is_recurring: true }],
        );
        let report = detect_conflicts(&Candidate::new(EntryKind::Vacation, range("2025-08-11", "2025-08-22")), &[], &cal);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::Holiday);
        assert_eq!(report.conflicts[0].severity, Severity::Info);
        assert!(report.conflicts[0].message.contains("2025-08-15"));
    }

    #[test]
    fn report_orders_by_severity() {
        let existing = vec![
            entry(EntryKind::Vacation, false, range("2025-10-06", "2025-10-06")),
            entry(EntryKind::SickLeave, true, range("2025-10-08", "2025-10-08")),
        ];
        let report = detect_conflicts(
            &Candidate::new(EntryKind::Vacation, range("2025-10-06", "2025-10-10")),
            &existing,
            &calendar(),
        );
        assert_eq!(report.conflicts[0].severity, Severity::Critical);
        assert_eq!(report.conflicts[1].severity, Severity::Warning);
        assert_eq!(report.critical_count(), 1);
    }

    #[test]
    fn conflict_dates_lists_blocked_days() {
        let existing = vec![
            entry(EntryKind::Vacation, true, range("2025-06-09", "2025-06-10")),
            entry(EntryKind::Vacation, false, range("2025-06-12", "2025-06-12")),
        ];
        let dates = conflict_dates(EntryKind::Vacation, &range("2025-06-08", "2025-06-13"), &existing);
        assert_eq!(dates, vec![d("2025-06-09"), d("2025-06-10")]);
    }
}
