//! Leave, sick-leave, business-trip and attendance domain.
//!
//! The pure parts live in [`calendar`] (working-day decisions), [`conflicts`]
//! (overlap detection and severity) and [`balance`] (usage and balance math).
//! [`store`] persists records with sqlx and [`service`] ties everything
//! together inside SQL transactions.

pub mod balance;
pub mod calendar;
pub mod conflicts;
pub mod service;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use balance::{BalanceAdjustment, BalanceReport, LeaveBalance, YearUsage};
pub use calendar::{Holiday, ScheduleSource, WorkCalendar, WorkSchedule};
pub use conflicts::{Candidate, Conflict, ConflictKind, ConflictReport, ExistingEntry, Severity};
pub use service::{run_reconciler, LeaveService};

/// Type of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    /// Whole days off ("ferie"), counted in working days.
    Vacation,
    /// Hours off ("permesso"), counted in hours.
    Permission,
}

impl LeaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveKind::Vacation => "vacation",
            LeaveKind::Permission => "permission",
        }
    }
}

impl FromStr for LeaveKind {
    type Err = LeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vacation" => Ok(LeaveKind::Vacation),
            "permission" => Ok(LeaveKind::Permission),
            other => Err(LeaveError::InvalidValue { field: "kind", value: other.to_string() }),
        }
    }
}

/// Review state shared by leave requests and business trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveStatus {
    type Err = LeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "rejected" => Ok(LeaveStatus::Rejected),
            other => Err(LeaveError::InvalidValue { field: "status", value: other.to_string() }),
        }
    }
}

/// Every kind of record that can occupy an employee's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Vacation,
    Permission,
    SickLeave,
    BusinessTrip,
    Attendance,
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Vacation => "vacation",
            EntryKind::Permission => "permission",
            EntryKind::SickLeave => "sick leave",
            EntryKind::BusinessTrip => "business trip",
            EntryKind::Attendance => "attendance",
        }
    }
}

impl From<LeaveKind> for EntryKind {
    fn from(kind: LeaveKind) -> Self {
        match kind {
            LeaveKind::Vacation => EntryKind::Vacation,
            LeaveKind::Permission => EntryKind::Permission,
        }
    }
}

/// Inclusive date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    #[serde(rename = "start_date")]
    start: NaiveDate,
    #[serde(rename = "end_date")]
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, LeaveError> {
        if start > end {
            return Err(LeaveError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Overlapping part of two ranges, if any.
    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(DateRange { start: self.start.max(other.start), end: self.end.min(other.end) })
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[derive(Deserialize)]
struct RawDateRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = LeaveError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start_date, raw.end_date)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

/// Hour window of a permission on a single day, `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeWindow")]
pub struct TimeWindow {
    #[serde(rename = "time_from")]
    from: NaiveTime,
    #[serde(rename = "time_to")]
    to: NaiveTime,
}

impl TimeWindow {
    pub fn new(from: NaiveTime, to: NaiveTime) -> Result<Self, LeaveError> {
        if from >= to {
            return Err(LeaveError::InvalidTimeWindow(format!("time_from {} must be before time_to {}", from, to)));
        }
        Ok(Self { from, to })
    }

    pub fn start_time(&self) -> NaiveTime {
        self.from
    }

    pub fn end_time(&self) -> NaiveTime {
        self.to
    }

    pub fn hours(&self) -> f64 {
        (self.to - self.from).num_minutes() as f64 / 60.0
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.from < other.to && other.from < self.to
    }
}

#[derive(Deserialize)]
struct RawTimeWindow {
    time_from: NaiveTime,
    time_to: NaiveTime,
}

impl TryFrom<RawTimeWindow> for TimeWindow {
    type Error = LeaveError;

    fn try_from(raw: RawTimeWindow) -> Result<Self, Self::Error> {
        TimeWindow::new(raw.time_from, raw.time_to)
    }
}

/// Builds the optional hour window of a request and checks it fits the kind and range.
pub fn parse_window(
    kind: EntryKind,
    range: &DateRange,
    from: Option<NaiveTime>,
    to: Option<NaiveTime>,
) -> Result<Option<TimeWindow>, LeaveError> {
    match (from, to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) => {
            if kind != EntryKind::Permission {
                return Err(LeaveError::InvalidTimeWindow(format!(
                    "a time window is only allowed for permissions, not {}",
                    kind.label()
                )));
            }
            if !range.is_single_day() {
                return Err(LeaveError::InvalidTimeWindow(
                    "an hourly permission must start and end on the same day".into(),
                ));
            }
            TimeWindow::new(from, to).map(Some)
        }
        _ => Err(LeaveError::InvalidTimeWindow("time_from and time_to must be given together".into())),
    }
}

/// A vacation or permission request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub kind: LeaveKind,
    pub status: LeaveStatus,
    #[serde(flatten)]
    pub range: DateRange,
    #[serde(flatten)]
    pub window: Option<TimeWindow>,
    pub note: Option<String>,
    pub review_note: Option<String>,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

/// Travel record; approving it generates attendance for its working days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessTrip {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub destination: String,
    pub purpose: Option<String>,
    pub status: LeaveStatus,
    #[serde(flatten)]
    pub range: DateRange,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SickLeave {
    pub id: Uuid,
    pub employee_id: Uuid,
    #[serde(flatten)]
    pub range: DateRange,
    pub certificate_code: Option<String>,
    pub note: Option<String>,
    pub created_at: String,
}

/// Per-employee per-date presence record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attendance {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub is_sick_leave: bool,
    pub is_business_trip: bool,
    pub business_trip_id: Option<Uuid>,
    pub sick_leave_id: Option<Uuid>,
    pub note: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LeaveError {
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),
    #[error("no working days between {0}")]
    NoWorkingDays(DateRange),
    #[error("{} blocking conflict(s) found", .0.critical_count())]
    Conflicts(ConflictReport),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("status is already {0}")]
    UnchangedStatus(LeaveStatus),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("window of {days} days exceeds the maximum of {max}")]
    WindowTooLarge { days: i64, max: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
