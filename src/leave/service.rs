//! Transactional orchestration of the leave workflow.
//!
//! Every mutating operation runs in one `BEGIN IMMEDIATE` transaction: conflict
//! validation, the write itself, balance reconciliation and generated
//! attendance rows either all commit or none do. Events are published only
//! after the commit.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use lru::LruCache;
use sqlx::{SqliteConnection, SqlitePool};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::balance::{usage_for, BalanceAdjustment, BalanceReport, LeaveBalance, YearUsage};
use super::calendar::{resolve_schedule, Holiday, ScheduleSource, WorkCalendar, WorkSchedule};
use super::conflicts::{self, Candidate, ConflictReport};
use super::store::{self, AttendanceSource, AttendanceUpsert, LeaveRequestFilter};
use super::{
    Attendance, BusinessTrip, DateRange, EntryKind, LeaveError, LeaveKind, LeaveRequest, LeaveStatus, SickLeave,
    TimeWindow,
};
use crate::config::LeavePolicyConfig;
use crate::db::WriteTx;
use crate::metrics::Metrics;
use crate::notify::{LeaveEvent, Notifier};
use crate::types::{Employee, EmployeeRole};

const SCHEDULE_CACHE_SIZE: usize = 256;

pub struct NewLeaveRequest {
    pub employee_id: Uuid,
    pub kind: LeaveKind,
    pub range: DateRange,
    pub window: Option<TimeWindow>,
    pub note: Option<String>,
}

pub struct NewBusinessTrip {
    pub employee_id: Uuid,
    pub destination: String,
    pub purpose: Option<String>,
    pub range: DateRange,
}

pub struct NewSickLeave {
    pub employee_id: Uuid,
    pub range: DateRange,
    pub certificate_code: Option<String>,
    pub note: Option<String>,
}

pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: EmployeeRole,
}

type ResolvedSchedule = (WorkSchedule, ScheduleSource);

/// Resolved schedules per employee.
///
/// Every invalidation bumps `generation`; a value read from the database is
/// only cached when no invalidation happened since the read started, so a
/// slow reader cannot put back a schedule that was just replaced.
pub(crate) struct ScheduleCache {
    entries: LruCache<Uuid, ResolvedSchedule>,
    generation: u64,
}

impl ScheduleCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: LruCache::new(capacity), generation: 0 }
    }

    pub(crate) fn get(&mut self, employee_id: &Uuid) -> Option<ResolvedSchedule> {
        self.entries.get(employee_id).cloned()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns whether the value was stored.
    pub(crate) fn insert_if_current(&mut self, read_at: u64, employee_id: Uuid, value: ResolvedSchedule) -> bool {
        if read_at != self.generation {
            return false;
        }
        self.entries.put(employee_id, value);
        true
    }

    /// `None` drops every employee, e.g. after a company schedule edit.
    pub(crate) fn invalidate(&mut self, employee_id: Option<Uuid>) {
        self.generation = self.generation.wrapping_add(1);
        match employee_id {
            Some(id) => {
                self.entries.pop(&id);
            }
            None => self.entries.clear(),
        }
    }
}

#[derive(Clone)]
pub struct LeaveService {
    db: SqlitePool,
    policy: LeavePolicyConfig,
    default_schedule: WorkSchedule,
    schedules: Arc<Mutex<ScheduleCache>>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

impl LeaveService {
    pub fn new(
        db: SqlitePool,
        policy: LeavePolicyConfig,
        default_schedule: WorkSchedule,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
    ) -> Self {
        Self {
            db,
            policy,
            default_schedule,
            schedules: Arc::new(Mutex::new(ScheduleCache::new(SCHEDULE_CACHE_SIZE))),
            notifier,
            metrics,
        }
    }

    // ---------------------- calendars ----------------------

    async fn company_schedule(&self, conn: &mut SqliteConnection) -> Result<WorkSchedule, LeaveError> {
        Ok(store::get_company_schedule(conn).await?.unwrap_or_else(|| self.default_schedule.clone()))
    }

    async fn effective_schedule(
        &self,
        conn: &mut SqliteConnection,
        employee_id: Uuid,
    ) -> Result<ResolvedSchedule, LeaveError> {
        let read_at = match self.schedules.lock() {
            Ok(mut cache) => {
                if let Some(hit) = cache.get(&employee_id) {
                    return Ok(hit);
                }
                Some(cache.generation())
            }
            Err(_) => None,
        };

        let own = store::get_employee_schedule(conn, employee_id).await?;
        let company = self.company_schedule(conn).await?;
        let resolved = resolve_schedule(own, &company);
        if let (Some(read_at), Ok(mut cache)) = (read_at, self.schedules.lock()) {
            if !cache.insert_if_current(read_at, employee_id, resolved.clone()) {
                tracing::debug!(%employee_id, "schedule changed while resolving; not cached");
            }
        }
        Ok(resolved)
    }

    async fn calendar_for(&self, conn: &mut SqliteConnection, employee_id: Uuid) -> Result<WorkCalendar, LeaveError> {
        let (schedule, _) = self.effective_schedule(conn, employee_id).await?;
        let holidays = store::list_holidays(conn, None).await?;
        Ok(WorkCalendar::new(schedule, &holidays))
    }

    /// Call only after the schedule write committed.
    fn forget_schedule(&self, employee_id: Option<Uuid>) {
        if let Ok(mut cache) = self.schedules.lock() {
            cache.invalidate(employee_id);
        }
    }

    // ---------------------- validation ----------------------

    async fn validate(
        &self,
        conn: &mut SqliteConnection,
        employee_id: Uuid,
        candidate: &Candidate,
    ) -> Result<(ConflictReport, WorkCalendar), LeaveError> {
        let calendar = self.calendar_for(conn, employee_id).await?;
        let existing = store::load_entries(conn, employee_id, &candidate.range).await?;
        let report = conflicts::detect_conflicts(candidate, &existing, &calendar);
        Ok((report, calendar))
    }

    fn refuse_critical(&self, employee_id: Uuid, report: ConflictReport) -> Result<ConflictReport, LeaveError> {
        if report.has_critical() {
            self.metrics.add_critical_conflicts(report.critical_count());
            tracing::info!(%employee_id, critical = report.critical_count(), "refused because of blocking conflicts");
            return Err(LeaveError::Conflicts(report));
        }
        Ok(report)
    }

    pub async fn check_conflicts(&self, employee_id: Uuid, candidate: &Candidate) -> Result<ConflictReport, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, employee_id).await?;
        let (report, _) = self.validate(&mut conn, employee_id, candidate).await?;
        Ok(report)
    }

    /// Dates on which a new entry of `kind` would be refused.
    pub async fn conflict_dates(
        &self,
        employee_id: Uuid,
        kind: EntryKind,
        window: DateRange,
    ) -> Result<Vec<NaiveDate>, LeaveError> {
        let max = self.policy.max_conflict_window_days;
        if window.len_days() > max {
            return Err(LeaveError::WindowTooLarge { days: window.len_days(), max });
        }
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, employee_id).await?;
        let existing = store::load_entries(&mut conn, employee_id, &window).await?;
        Ok(conflicts::conflict_dates(kind, &window, &existing))
    }

    // ---------------------- employees ----------------------

    pub async fn create_employee(&self, new: NewEmployee) -> Result<Employee, LeaveError> {
        let mut conn = self.db.acquire().await?;
        let employee = Employee {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            role: new.role,
            active: true,
            created_at: String::new(),
        };
        let employee = store::insert_employee(&mut conn, &employee).await?;
        tracing::info!(employee_id = %employee.id, "employee created");
        Ok(employee)
    }

    pub async fn employee(&self, id: Uuid) -> Result<Employee, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, id).await
    }

    pub async fn employees(&self, only_active: bool) -> Result<Vec<Employee>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::list_employees(&mut conn, only_active).await
    }

    // ---------------------- schedules & holidays ----------------------

    pub async fn company_work_schedule(&self) -> Result<WorkSchedule, LeaveError> {
        let mut conn = self.db.acquire().await?;
        self.company_schedule(&mut conn).await
    }

    pub async fn set_company_work_schedule(&self, schedule: &WorkSchedule) -> Result<(), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::put_company_schedule(&mut tx, schedule).await?;
        tx.commit().await?;
        self.forget_schedule(None);
        tracing::info!("company work schedule updated");
        Ok(())
    }

    pub async fn employee_work_schedule(&self, employee_id: Uuid) -> Result<(WorkSchedule, ScheduleSource), LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, employee_id).await?;
        self.effective_schedule(&mut conn, employee_id).await
    }

    pub async fn set_employee_work_schedule(&self, employee_id: Uuid, schedule: &WorkSchedule) -> Result<(), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, employee_id).await?;
        store::put_employee_schedule(&mut tx, employee_id, schedule).await?;
        tx.commit().await?;
        self.forget_schedule(Some(employee_id));
        Ok(())
    }

    /// Falls back to the company schedule. Returns whether an own schedule existed.
    pub async fn clear_employee_work_schedule(&self, employee_id: Uuid) -> Result<bool, LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, employee_id).await?;
        let removed = store::delete_employee_schedule(&mut tx, employee_id).await?;
        tx.commit().await?;
        self.forget_schedule(Some(employee_id));
        Ok(removed)
    }

    pub async fn create_holiday(&self, date: NaiveDate, name: String, is_recurring: bool) -> Result<Holiday, LeaveError> {
        let mut conn = self.db.acquire().await?;
        let holiday = Holiday { id: Uuid::new_v4(), date, name, is_recurring };
        store::insert_holiday(&mut conn, &holiday).await?;
        tracing::info!(%date, is_recurring, "holiday added");
        Ok(holiday)
    }

    pub async fn holidays(&self, year: Option<i32>) -> Result<Vec<Holiday>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::list_holidays(&mut conn, year).await
    }

    pub async fn delete_holiday(&self, id: Uuid) -> Result<(), LeaveError> {
        let mut conn = self.db.acquire().await?;
        if !store::delete_holiday(&mut conn, id).await? {
            return Err(LeaveError::NotFound { entity: "holiday", id });
        }
        Ok(())
    }

    // ---------------------- leave requests ----------------------

    pub async fn create_leave_request(
        &self,
        new: NewLeaveRequest,
    ) -> Result<(LeaveRequest, ConflictReport), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, new.employee_id).await?;

        let candidate = Candidate::new(new.kind.into(), new.range).with_window(new.window);
        let (report, calendar) = self.validate(&mut tx, new.employee_id, &candidate).await?;
        if calendar.working_days(&new.range).is_empty() {
            return Err(LeaveError::NoWorkingDays(new.range));
        }
        let report = self.refuse_critical(new.employee_id, report)?;

        let request = LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: new.employee_id,
            kind: new.kind,
            status: LeaveStatus::Pending,
            range: new.range,
            window: new.window,
            note: new.note,
            review_note: None,
            created_at: String::new(),
            reviewed_at: None,
        };
        let request = store::insert_leave_request(&mut tx, &request).await?;
        tx.commit().await?;

        self.metrics.inc_requests_created();
        self.notifier
            .notify(LeaveEvent::RequestCreated { id: request.id, employee_id: request.employee_id, kind: request.kind })
            .await;
        Ok((request, report))
    }

    pub async fn leave_request(&self, id: Uuid) -> Result<LeaveRequest, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_leave_request(&mut conn, id).await
    }

    pub async fn leave_requests(&self, filter: &LeaveRequestFilter) -> Result<Vec<LeaveRequest>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::list_leave_requests(&mut conn, filter).await
    }

    /// Moves a request to `status`, re-validating on approval and reconciling the balance.
    pub async fn change_leave_status(
        &self,
        id: Uuid,
        status: LeaveStatus,
        review_note: Option<&str>,
    ) -> Result<(LeaveRequest, ConflictReport), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        let current = store::require_leave_request(&mut tx, id).await?;
        if current.status == status {
            return Err(LeaveError::UnchangedStatus(status));
        }

        let mut report = ConflictReport::empty();
        if status == LeaveStatus::Approved {
            let candidate =
                Candidate::new(current.kind.into(), current.range).with_window(current.window).excluding(current.id);
            let (found, _) = self.validate(&mut tx, current.employee_id, &candidate).await?;
            report = self.refuse_critical(current.employee_id, found)?;
        }

        let updated = store::update_leave_status(&mut tx, id, status, review_note).await?;
        let adjusted = match BalanceAdjustment::for_transition(current.status, status) {
            Some(adjustment) => self.adjust_balances(&mut tx, &current, adjustment).await?,
            None => 0,
        };
        tx.commit().await?;

        match status {
            LeaveStatus::Approved => self.metrics.inc_requests_approved(),
            LeaveStatus::Rejected => self.metrics.inc_requests_rejected(),
            LeaveStatus::Pending => {}
        }
        self.metrics.add_balance_adjustments(adjusted);
        tracing::info!(request_id = %id, from = %current.status, to = %status, balance_years = adjusted, "leave request status changed");
        self.notifier
            .notify(LeaveEvent::RequestStatusChanged {
                id,
                employee_id: current.employee_id,
                kind: current.kind,
                from: current.status,
                to: status,
            })
            .await;
        Ok((updated, report))
    }

    /// Approved requests give their usage back before being removed.
    pub async fn delete_leave_request(&self, id: Uuid) -> Result<(), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        let current = store::require_leave_request(&mut tx, id).await?;
        let adjusted = if current.status == LeaveStatus::Approved {
            self.adjust_balances(&mut tx, &current, BalanceAdjustment::Release).await?
        } else {
            0
        };
        store::delete_leave_request(&mut tx, id).await?;
        tx.commit().await?;

        self.metrics.add_balance_adjustments(adjusted);
        self.notifier.notify(LeaveEvent::RequestDeleted { id, employee_id: current.employee_id }).await;
        Ok(())
    }

    // ---------------------- balances ----------------------

    async fn ensure_balance(
        &self,
        conn: &mut SqliteConnection,
        employee_id: Uuid,
        year: i32,
    ) -> Result<LeaveBalance, LeaveError> {
        store::ensure_balance(
            conn,
            employee_id,
            year,
            self.policy.vacation_days_per_year,
            self.policy.permission_hours_per_year,
        )
        .await
    }

    /// Applies one request's usage to every year it touches; returns the number of years.
    async fn adjust_balances(
        &self,
        conn: &mut SqliteConnection,
        request: &LeaveRequest,
        adjustment: BalanceAdjustment,
    ) -> Result<usize, LeaveError> {
        let calendar = self.calendar_for(conn, request.employee_id).await?;
        let usages = usage_for(request.kind, &request.range, request.window.as_ref(), &calendar);
        for usage in &usages {
            let mut balance = self.ensure_balance(conn, request.employee_id, usage.year).await?;
            balance.apply(usage, adjustment);
            store::save_balance_usage(conn, &balance).await?;
            tracing::debug!(
                employee_id = %request.employee_id,
                year = usage.year,
                ?adjustment,
                vacation_days = usage.vacation_days,
                permission_hours = usage.permission_hours,
                "balance adjusted"
            );
        }
        Ok(usages.len())
    }

    pub async fn balance(&self, employee_id: Uuid, year: i32) -> Result<BalanceReport, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, employee_id).await?;
        Ok(self.ensure_balance(&mut conn, employee_id, year).await?.into())
    }

    pub async fn balances(&self, employee_id: Uuid) -> Result<Vec<BalanceReport>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, employee_id).await?;
        Ok(store::list_balances(&mut conn, employee_id).await?.into_iter().map(BalanceReport::from).collect())
    }

    pub async fn set_entitlements(
        &self,
        employee_id: Uuid,
        year: i32,
        vacation_days_total: f64,
        permission_hours_total: f64,
    ) -> Result<BalanceReport, LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, employee_id).await?;
        let mut balance = self.ensure_balance(&mut tx, employee_id, year).await?;
        balance.vacation_days_total = vacation_days_total;
        balance.permission_hours_total = permission_hours_total;
        store::save_balance_totals(&mut tx, &balance).await?;
        tx.commit().await?;
        Ok(balance.into())
    }

    /// Recomputes used amounts from all approved requests touching `year`.
    pub async fn recalculate_balance(&self, employee_id: Uuid, year: i32) -> Result<BalanceReport, LeaveError> {
        let year_range = year_range(year)?;
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, employee_id).await?;

        let calendar = self.calendar_for(&mut tx, employee_id).await?;
        let approved = store::approved_requests_overlapping(&mut tx, employee_id, &year_range).await?;
        let usages: Vec<YearUsage> = approved
            .iter()
            .flat_map(|r| usage_for(r.kind, &r.range, r.window.as_ref(), &calendar))
            .collect();

        let mut balance = self.ensure_balance(&mut tx, employee_id, year).await?;
        let before = balance.clone();
        balance.recompute(&usages);
        store::save_balance_usage(&mut tx, &balance).await?;
        tx.commit().await?;

        if before != balance {
            tracing::info!(
                %employee_id,
                year,
                vacation_days_was = before.vacation_days_used,
                vacation_days_now = balance.vacation_days_used,
                permission_hours_was = before.permission_hours_used,
                permission_hours_now = balance.permission_hours_used,
                "balance drift repaired"
            );
        }
        self.metrics.inc_recalculations();
        self.notifier.notify(LeaveEvent::BalanceRecalculated { employee_id, year }).await;
        Ok(balance.into())
    }

    /// Recalculates `year` for every active employee; returns how many were processed.
    pub async fn recalculate_all(&self, year: i32) -> Result<usize, LeaveError> {
        let employees = self.employees(true).await?;
        for employee in &employees {
            self.recalculate_balance(employee.id, year).await?;
        }
        Ok(employees.len())
    }

    // ---------------------- business trips ----------------------

    pub async fn create_trip(&self, new: NewBusinessTrip) -> Result<(BusinessTrip, ConflictReport), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, new.employee_id).await?;

        let candidate = Candidate::new(EntryKind::BusinessTrip, new.range);
        let (report, _) = self.validate(&mut tx, new.employee_id, &candidate).await?;
        let report = self.refuse_critical(new.employee_id, report)?;

        let trip = BusinessTrip {
            id: Uuid::new_v4(),
            employee_id: new.employee_id,
            destination: new.destination,
            purpose: new.purpose,
            status: LeaveStatus::Pending,
            range: new.range,
            created_at: String::new(),
            reviewed_at: None,
        };
        let trip = store::insert_trip(&mut tx, &trip).await?;
        tx.commit().await?;
        tracing::info!(trip_id = %trip.id, employee_id = %trip.employee_id, "business trip created");
        Ok((trip, report))
    }

    pub async fn trip(&self, id: Uuid) -> Result<BusinessTrip, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_trip(&mut conn, id).await
    }

    pub async fn trips(
        &self,
        employee_id: Option<Uuid>,
        status: Option<LeaveStatus>,
    ) -> Result<Vec<BusinessTrip>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::list_trips(&mut conn, employee_id, status).await
    }

    /// Approval generates attendance rows for the trip's working days; leaving
    /// `approved` removes them again.
    pub async fn change_trip_status(
        &self,
        id: Uuid,
        status: LeaveStatus,
    ) -> Result<(BusinessTrip, ConflictReport), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        let current = store::require_trip(&mut tx, id).await?;
        if current.status == status {
            return Err(LeaveError::UnchangedStatus(status));
        }

        let mut report = ConflictReport::empty();
        if status == LeaveStatus::Approved {
            let candidate = Candidate::new(EntryKind::BusinessTrip, current.range).excluding(current.id);
            let (found, _) = self.validate(&mut tx, current.employee_id, &candidate).await?;
            report = self.refuse_critical(current.employee_id, found)?;
        }

        let updated = store::update_trip_status(&mut tx, id, status).await?;
        let source = AttendanceSource::BusinessTrip(id);
        let rows = match (current.status == LeaveStatus::Approved, status == LeaveStatus::Approved) {
            (false, true) => {
                let calendar = self.calendar_for(&mut tx, current.employee_id).await?;
                let days = calendar.working_days(&current.range);
                store::mark_attendance_days(&mut tx, current.employee_id, &days, source).await?
            }
            (true, false) => store::clear_attendance_days(&mut tx, source).await?,
            _ => 0,
        };
        tx.commit().await?;

        if status == LeaveStatus::Approved {
            self.metrics.inc_trips_approved();
        }
        self.notifier
            .notify(LeaveEvent::TripStatusChanged {
                id,
                employee_id: current.employee_id,
                from: current.status,
                to: status,
                attendance_rows: rows,
            })
            .await;
        Ok((updated, report))
    }

    // ---------------------- sick leave ----------------------

    pub async fn record_sick_leave(&self, new: NewSickLeave) -> Result<(SickLeave, ConflictReport), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, new.employee_id).await?;

        let candidate = Candidate::new(EntryKind::SickLeave, new.range);
        let (report, calendar) = self.validate(&mut tx, new.employee_id, &candidate).await?;
        let report = self.refuse_critical(new.employee_id, report)?;

        let sick = SickLeave {
            id: Uuid::new_v4(),
            employee_id: new.employee_id,
            range: new.range,
            certificate_code: new.certificate_code,
            note: new.note,
            created_at: String::new(),
        };
        let sick = store::insert_sick_leave(&mut tx, &sick).await?;
        let days = calendar.working_days(&sick.range);
        let rows =
            store::mark_attendance_days(&mut tx, sick.employee_id, &days, AttendanceSource::SickLeave(sick.id)).await?;
        tx.commit().await?;

        self.metrics.inc_sick_leaves_recorded();
        self.notifier
            .notify(LeaveEvent::SickLeaveRecorded { id: sick.id, employee_id: sick.employee_id, attendance_rows: rows })
            .await;
        Ok((sick, report))
    }

    pub async fn sick_leaves(&self, employee_id: Option<Uuid>) -> Result<Vec<SickLeave>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::list_sick_leaves(&mut conn, employee_id).await
    }

    pub async fn delete_sick_leave(&self, id: Uuid) -> Result<(), LeaveError> {
        let mut tx = WriteTx::begin(&self.db).await?;
        if store::get_sick_leave(&mut tx, id).await?.is_none() {
            return Err(LeaveError::NotFound { entity: "sick leave", id });
        }
        store::clear_attendance_days(&mut tx, AttendanceSource::SickLeave(id)).await?;
        store::delete_sick_leave(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    // ---------------------- attendance ----------------------

    pub async fn upsert_attendance(&self, input: AttendanceUpsert) -> Result<(Attendance, ConflictReport), LeaveError> {
        match (input.check_in_time, input.check_out_time) {
            (Some(check_in), Some(check_out)) if check_out <= check_in => {
                return Err(LeaveError::InvalidTimeWindow(format!(
                    "check_out_time {} must be after check_in_time {}",
                    check_out, check_in
                )));
            }
            (None, Some(check_out)) => {
                return Err(LeaveError::InvalidTimeWindow(format!(
                    "check_out_time {} given without check_in_time",
                    check_out
                )));
            }
            _ => {}
        }

        let mut tx = WriteTx::begin(&self.db).await?;
        store::require_employee(&mut tx, input.employee_id).await?;
        let candidate = Candidate::new(EntryKind::Attendance, DateRange::single(input.date));
        let (report, _) = self.validate(&mut tx, input.employee_id, &candidate).await?;
        let report = self.refuse_critical(input.employee_id, report)?;

        let attendance = store::upsert_attendance(&mut tx, &input).await?;
        tx.commit().await?;

        self.metrics.inc_attendance_upserts();
        self.notifier.notify(LeaveEvent::AttendanceRecorded { employee_id: input.employee_id, date: input.date }).await;
        Ok((attendance, report))
    }

    pub async fn attendance(&self, employee_id: Uuid, range: DateRange) -> Result<Vec<Attendance>, LeaveError> {
        let mut conn = self.db.acquire().await?;
        store::require_employee(&mut conn, employee_id).await?;
        store::list_attendance(&mut conn, employee_id, &range).await
    }
}

fn year_range(year: i32) -> Result<DateRange, LeaveError> {
    let invalid = || LeaveError::InvalidValue { field: "year", value: year.to_string() };
    let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;
    DateRange::new(start, end)
}

/// Recalculates the current year's balances every `every` until `shutdown` fires.
///
/// Failures are logged and retried on the next tick.
pub async fn run_reconciler(service: LeaveService, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately; startup already has fresh balances
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("balance reconciler stopped");
                return;
            }
            _ = ticker.tick() => {
                let year = Utc::now().year();
                match service.recalculate_all(year).await {
                    Ok(n) => tracing::debug!(year, employees = n, "periodic balance reconciliation done"),
                    Err(e) => tracing::warn!(year, "periodic balance reconciliation failed: {}", e),
                }
            }
        }
    }
}
