use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::leave::{
    Attendance, BusinessTrip, ConflictReport, EntryKind, LeaveError, LeaveKind, LeaveRequest, LeaveStatus,
    ScheduleSource, SickLeave, WorkSchedule,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Admin,
    #[default]
    Employee,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Admin => "admin",
            EmployeeRole::Employee => "employee",
        }
    }
}

impl fmt::Display for EmployeeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmployeeRole {
    type Err = LeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(EmployeeRole::Admin),
            "employee" => Ok(EmployeeRole::Employee),
            other => Err(LeaveError::InvalidValue { field: "role", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Employee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: EmployeeRole,
    pub active: bool,
    pub created_at: String,
}

// ---------------------- request bodies ----------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEmployeeRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub role: EmployeeRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHolidayRequest {
    pub date: NaiveDate,
    pub name: String,
    #[serde(default)]
    pub is_recurring: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeaveRequest {
    pub employee_id: Uuid,
    pub kind: LeaveKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeRequest {
    pub status: LeaveStatus,
    pub review_note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBusinessTripRequest {
    pub employee_id: Uuid,
    pub destination: String,
    pub purpose: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSickLeaveRequest {
    pub employee_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub certificate_code: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertAttendanceRequest {
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckConflictsRequest {
    pub employee_id: Uuid,
    pub kind: EntryKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
    /// Own record id when editing an existing entry.
    pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetEntitlementsRequest {
    pub vacation_days_total: f64,
    pub permission_hours_total: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecalculateRequest {
    pub year: i32,
    /// All active employees when omitted.
    pub employee_id: Option<Uuid>,
}

// ---------------------- query strings ----------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmployeeListQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LeaveListQuery {
    pub employee_id: Option<Uuid>,
    pub status: Option<LeaveStatus>,
    pub kind: Option<LeaveKind>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TripListQuery {
    pub employee_id: Option<Uuid>,
    pub status: Option<LeaveStatus>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmployeeFilterQuery {
    pub employee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceQuery {
    pub employee_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictDatesQuery {
    pub kind: EntryKind,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// ---------------------- responses ----------------------

/// A created or approved record together with the non-blocking conflicts found.
#[derive(Debug, Clone, Serialize)]
pub struct WithConflicts<T> {
    #[serde(flatten)]
    pub record: T,
    pub conflicts: ConflictReport,
}

pub type LeaveRequestResponse = WithConflicts<LeaveRequest>;
pub type BusinessTripResponse = WithConflicts<BusinessTrip>;
pub type SickLeaveResponse = WithConflicts<SickLeave>;
pub type AttendanceResponse = WithConflicts<Attendance>;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSchedule {
    #[serde(flatten)]
    pub schedule: WorkSchedule,
    pub source: ScheduleSource,
    pub daily_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictDatesResponse {
    pub employee_id: Uuid,
    pub kind: EntryKind,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalculateResponse {
    pub year: i32,
    pub employees: usize,
}
