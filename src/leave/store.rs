//! SQLite persistence for the leave domain.
//!
//! All functions take a plain `&mut SqliteConnection` so callers can run them
//! on a pooled connection or inside a transaction alike.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::calendar::{Holiday, WorkSchedule};
use super::conflicts::ExistingEntry;
use super::{
    Attendance, BusinessTrip, DateRange, EntryKind, LeaveBalance, LeaveError, LeaveKind, LeaveRequest, LeaveStatus,
    SickLeave, TimeWindow,
};
use crate::types::{Employee, EmployeeRole};

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%SZ','now')";

// ---------------------- row decoding ----------------------

fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(col)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode { index: col.to_string(), source: Box::new(e) })
}

fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode { index: col.to_string(), source: Box::new(e) })
}

fn enum_col<T>(row: &SqliteRow, col: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(col)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode { index: col.to_string(), source: Box::new(e) })
}

fn range_cols(row: &SqliteRow) -> Result<DateRange, LeaveError> {
    DateRange::new(row.try_get("start_date")?, row.try_get("end_date")?)
}

fn window_cols(row: &SqliteRow) -> Result<Option<TimeWindow>, LeaveError> {
    let from: Option<NaiveTime> = row.try_get("time_from")?;
    let to: Option<NaiveTime> = row.try_get("time_to")?;
    match (from, to) {
        (Some(from), Some(to)) => TimeWindow::new(from, to).map(Some),
        _ => Ok(None),
    }
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, LeaveError> {
    Ok(Employee {
        id: uuid_col(row, "id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        role: enum_col::<EmployeeRole>(row, "role")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_schedule(row: &SqliteRow) -> Result<WorkSchedule, LeaveError> {
    let break_minutes: i64 = row.try_get("break_minutes")?;
    Ok(WorkSchedule {
        monday: row.try_get("monday")?,
        tuesday: row.try_get("tuesday")?,
        wednesday: row.try_get("wednesday")?,
        thursday: row.try_get("thursday")?,
        friday: row.try_get("friday")?,
        saturday: row.try_get("saturday")?,
        sunday: row.try_get("sunday")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        break_minutes: break_minutes.clamp(0, i64::from(u32::MAX)) as u32,
    })
}

fn row_to_holiday(row: &SqliteRow) -> Result<Holiday, LeaveError> {
    Ok(Holiday {
        id: uuid_col(row, "id")?,
        date: row.try_get("date")?,
        name: row.try_get("name")?,
        is_recurring: row.try_get("is_recurring")?,
    })
}

fn row_to_leave_request(row: &SqliteRow) -> Result<LeaveRequest, LeaveError> {
    Ok(LeaveRequest {
        id: uuid_col(row, "id")?,
        employee_id: uuid_col(row, "employee_id")?,
        kind: enum_col::<LeaveKind>(row, "kind")?,
        status: enum_col::<LeaveStatus>(row, "status")?,
        range: range_cols(row)?,
        window: window_cols(row)?,
        note: row.try_get("note")?,
        review_note: row.try_get("review_note")?,
        created_at: row.try_get("created_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn row_to_trip(row: &SqliteRow) -> Result<BusinessTrip, LeaveError> {
    Ok(BusinessTrip {
        id: uuid_col(row, "id")?,
        employee_id: uuid_col(row, "employee_id")?,
        destination: row.try_get("destination")?,
        purpose: row.try_get("purpose")?,
        status: enum_col::<LeaveStatus>(row, "status")?,
        range: range_cols(row)?,
        created_at: row.try_get("created_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn row_to_sick_leave(row: &SqliteRow) -> Result<SickLeave, LeaveError> {
    Ok(SickLeave {
        id: uuid_col(row, "id")?,
        employee_id: uuid_col(row, "employee_id")?,
        range: range_cols(row)?,
        certificate_code: row.try_get("certificate_code")?,
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_attendance(row: &SqliteRow) -> Result<Attendance, LeaveError> {
    Ok(Attendance {
        id: uuid_col(row, "id")?,
        employee_id: uuid_col(row, "employee_id")?,
        date: row.try_get("date")?,
        check_in_time: row.try_get("check_in_time")?,
        check_out_time: row.try_get("check_out_time")?,
        is_sick_leave: row.try_get("is_sick_leave")?,
        is_business_trip: row.try_get("is_business_trip")?,
        business_trip_id: opt_uuid_col(row, "business_trip_id")?,
        sick_leave_id: opt_uuid_col(row, "sick_leave_id")?,
        note: row.try_get("note")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_balance(row: &SqliteRow) -> Result<LeaveBalance, LeaveError> {
    let year: i64 = row.try_get("year")?;
    Ok(LeaveBalance {
        employee_id: uuid_col(row, "employee_id")?,
        year: year as i32,
        vacation_days_total: row.try_get("vacation_days_total")?,
        vacation_days_used: row.try_get("vacation_days_used")?,
        permission_hours_total: row.try_get("permission_hours_total")?,
        permission_hours_used: row.try_get("permission_hours_used")?,
    })
}

fn collect<T>(rows: Vec<SqliteRow>, f: fn(&SqliteRow) -> Result<T, LeaveError>) -> Result<Vec<T>, LeaveError> {
    rows.iter().map(f).collect()
}

// ---------------------- employees ----------------------

pub async fn insert_employee(conn: &mut SqliteConnection, employee: &Employee) -> Result<Employee, LeaveError> {
    sqlx::query(
        r#"INSERT INTO employees (id, first_name, last_name, email, role, active)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
    )
    .bind(employee.id.to_string())
    .bind(&employee.first_name)
    .bind(&employee.last_name)
    .bind(&employee.email)
    .bind(employee.role.as_str())
    .bind(employee.active)
    .execute(&mut *conn)
    .await?;
    get_employee(conn, employee.id).await?.ok_or(LeaveError::NotFound { entity: "employee", id: employee.id })
}

pub async fn get_employee(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Employee>, LeaveError> {
    let row = sqlx::query("SELECT * FROM employees WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_employee).transpose()
}

pub async fn require_employee(conn: &mut SqliteConnection, id: Uuid) -> Result<Employee, LeaveError> {
    get_employee(conn, id).await?.ok_or(LeaveError::NotFound { entity: "employee", id })
}

pub async fn list_employees(conn: &mut SqliteConnection, only_active: bool) -> Result<Vec<Employee>, LeaveError> {
    let sql = if only_active {
        "SELECT * FROM employees WHERE active = 1 ORDER BY last_name, first_name"
    } else {
        "SELECT * FROM employees ORDER BY last_name, first_name"
    };
    let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
    collect(rows, row_to_employee)
}

// ---------------------- schedules ----------------------

pub async fn get_company_schedule(conn: &mut SqliteConnection) -> Result<Option<WorkSchedule>, LeaveError> {
    let row = sqlx::query("SELECT * FROM work_schedules WHERE id = 1").fetch_optional(&mut *conn).await?;
    row.as_ref().map(row_to_schedule).transpose()
}

pub async fn put_company_schedule(conn: &mut SqliteConnection, s: &WorkSchedule) -> Result<(), LeaveError> {
    sqlx::query(&format!(
        r#"INSERT INTO work_schedules
             (id, monday, tuesday, wednesday, thursday, friday, saturday, sunday, start_time, end_time, break_minutes)
           VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT(id) DO UPDATE SET
             monday=excluded.monday, tuesday=excluded.tuesday, wednesday=excluded.wednesday,
             thursday=excluded.thursday, friday=excluded.friday, saturday=excluded.saturday,
             sunday=excluded.sunday, start_time=excluded.start_time, end_time=excluded.end_time,
             break_minutes=excluded.break_minutes, updated_at={NOW}"#
    ))
    .bind(s.monday)
    .bind(s.tuesday)
    .bind(s.wednesday)
    .bind(s.thursday)
    .bind(s.friday)
    .bind(s.saturday)
    .bind(s.sunday)
    .bind(s.start_time)
    .bind(s.end_time)
    .bind(i64::from(s.break_minutes))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_employee_schedule(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
) -> Result<Option<WorkSchedule>, LeaveError> {
    let row = sqlx::query("SELECT * FROM employee_work_schedules WHERE employee_id = ?1")
        .bind(employee_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_schedule).transpose()
}

pub async fn put_employee_schedule(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    s: &WorkSchedule,
) -> Result<(), LeaveError> {
    sqlx::query(&format!(
        r#"INSERT INTO employee_work_schedules
             (employee_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday, start_time, end_time, break_minutes)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT(employee_id) DO UPDATE SET
             monday=excluded.monday, tuesday=excluded.tuesday, wednesday=excluded.wednesday,
             thursday=excluded.thursday, friday=excluded.friday, saturday=excluded.saturday,
             sunday=excluded.sunday, start_time=excluded.start_time, end_time=excluded.end_time,
             break_minutes=excluded.break_minutes, updated_at={NOW}"#
    ))
    .bind(employee_id.to_string())
    .bind(s.monday)
    .bind(s.tuesday)
    .bind(s.wednesday)
    .bind(s.thursday)
    .bind(s.friday)
    .bind(s.saturday)
    .bind(s.sunday)
    .bind(s.start_time)
    .bind(s.end_time)
    .bind(i64::from(s.break_minutes))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_employee_schedule(conn: &mut SqliteConnection, employee_id: Uuid) -> Result<bool, LeaveError> {
    let res = sqlx::query("DELETE FROM employee_work_schedules WHERE employee_id = ?1")
        .bind(employee_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---------------------- holidays ----------------------

pub async fn insert_holiday(conn: &mut SqliteConnection, h: &Holiday) -> Result<(), LeaveError> {
    sqlx::query("INSERT INTO holidays (id, date, name, is_recurring) VALUES (?1, ?2, ?3, ?4)")
        .bind(h.id.to_string())
        .bind(h.date)
        .bind(&h.name)
        .bind(h.is_recurring)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Recurring holidays are always part of the result.
pub async fn list_holidays(conn: &mut SqliteConnection, year: Option<i32>) -> Result<Vec<Holiday>, LeaveError> {
    let rows = match year {
        Some(y) => {
            sqlx::query(
                r#"SELECT * FROM holidays
                   WHERE is_recurring = 1 OR (date >= ?1 AND date <= ?2)
                   ORDER BY substr(date, 6), date"#,
            )
            .bind(format!("{:04}-01-01", y))
            .bind(format!("{:04}-12-31", y))
            .fetch_all(&mut *conn)
            .await?
        }
        None => sqlx::query("SELECT * FROM holidays ORDER BY date").fetch_all(&mut *conn).await?,
    };
    collect(rows, row_to_holiday)
}

pub async fn delete_holiday(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, LeaveError> {
    let res = sqlx::query("DELETE FROM holidays WHERE id = ?1").bind(id.to_string()).execute(&mut *conn).await?;
    Ok(res.rows_affected() > 0)
}

// ---------------------- leave requests ----------------------

pub async fn insert_leave_request(conn: &mut SqliteConnection, r: &LeaveRequest) -> Result<LeaveRequest, LeaveError> {
    sqlx::query(
        r#"INSERT INTO leave_requests
             (id, employee_id, kind, status, start_date, end_date, time_from, time_to, note)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
    )
    .bind(r.id.to_string())
    .bind(r.employee_id.to_string())
    .bind(r.kind.as_str())
    .bind(r.status.as_str())
    .bind(r.range.start())
    .bind(r.range.end())
    .bind(r.window.map(|w| w.start_time()))
    .bind(r.window.map(|w| w.end_time()))
    .bind(&r.note)
    .execute(&mut *conn)
    .await?;
    require_leave_request(conn, r.id).await
}

pub async fn get_leave_request(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<LeaveRequest>, LeaveError> {
    let row = sqlx::query("SELECT * FROM leave_requests WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_leave_request).transpose()
}

pub async fn require_leave_request(conn: &mut SqliteConnection, id: Uuid) -> Result<LeaveRequest, LeaveError> {
    get_leave_request(conn, id).await?.ok_or(LeaveError::NotFound { entity: "leave request", id })
}

#[derive(Debug, Default, Clone)]
pub struct LeaveRequestFilter {
    pub employee_id: Option<Uuid>,
    pub status: Option<LeaveStatus>,
    pub kind: Option<LeaveKind>,
    pub year: Option<i32>,
}

pub async fn list_leave_requests(
    conn: &mut SqliteConnection,
    filter: &LeaveRequestFilter,
) -> Result<Vec<LeaveRequest>, LeaveError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM leave_requests WHERE 1=1");
    if let Some(e) = filter.employee_id {
        qb.push(" AND employee_id = ").push_bind(e.to_string());
    }
    if let Some(s) = filter.status {
        qb.push(" AND status = ").push_bind(s.as_str());
    }
    if let Some(k) = filter.kind {
        qb.push(" AND kind = ").push_bind(k.as_str());
    }
    if let Some(y) = filter.year {
        qb.push(" AND start_date <= ").push_bind(format!("{:04}-12-31", y));
        qb.push(" AND end_date >= ").push_bind(format!("{:04}-01-01", y));
    }
    qb.push(" ORDER BY start_date DESC, created_at DESC");
    let rows = qb.build().fetch_all(&mut *conn).await?;
    collect(rows, row_to_leave_request)
}

pub async fn approved_requests_overlapping(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    range: &DateRange,
) -> Result<Vec<LeaveRequest>, LeaveError> {
    let rows = sqlx::query(
        r#"SELECT * FROM leave_requests
           WHERE employee_id = ?1 AND status = 'approved' AND start_date <= ?3 AND end_date >= ?2
           ORDER BY start_date"#,
    )
    .bind(employee_id.to_string())
    .bind(range.start())
    .bind(range.end())
    .fetch_all(&mut *conn)
    .await?;
    collect(rows, row_to_leave_request)
}

pub async fn update_leave_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: LeaveStatus,
    review_note: Option<&str>,
) -> Result<LeaveRequest, LeaveError> {
    sqlx::query(&format!(
        "UPDATE leave_requests SET status = ?1, review_note = COALESCE(?2, review_note), reviewed_at = {NOW} WHERE id = ?3"
    ))
    .bind(status.as_str())
    .bind(review_note)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    require_leave_request(conn, id).await
}

pub async fn delete_leave_request(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, LeaveError> {
    let res =
        sqlx::query("DELETE FROM leave_requests WHERE id = ?1").bind(id.to_string()).execute(&mut *conn).await?;
    Ok(res.rows_affected() > 0)
}

// ---------------------- balances ----------------------

pub async fn get_balance(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    year: i32,
) -> Result<Option<LeaveBalance>, LeaveError> {
    let row = sqlx::query("SELECT * FROM leave_balances WHERE employee_id = ?1 AND year = ?2")
        .bind(employee_id.to_string())
        .bind(i64::from(year))
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_balance).transpose()
}

/// Returns the balance row, creating it with the given entitlements when missing.
pub async fn ensure_balance(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    year: i32,
    vacation_days_total: f64,
    permission_hours_total: f64,
) -> Result<LeaveBalance, LeaveError> {
    sqlx::query(
        r#"INSERT OR IGNORE INTO leave_balances
             (employee_id, year, vacation_days_total, vacation_days_used, permission_hours_total, permission_hours_used)
           VALUES (?1, ?2, ?3, 0, ?4, 0)"#,
    )
    .bind(employee_id.to_string())
    .bind(i64::from(year))
    .bind(vacation_days_total)
    .bind(permission_hours_total)
    .execute(&mut *conn)
    .await?;
    get_balance(conn, employee_id, year)
        .await?
        .ok_or(LeaveError::NotFound { entity: "leave balance", id: employee_id })
}

pub async fn save_balance_usage(conn: &mut SqliteConnection, b: &LeaveBalance) -> Result<(), LeaveError> {
    sqlx::query(&format!(
        r#"UPDATE leave_balances SET vacation_days_used = ?1, permission_hours_used = ?2, updated_at = {NOW}
           WHERE employee_id = ?3 AND year = ?4"#
    ))
    .bind(b.vacation_days_used)
    .bind(b.permission_hours_used)
    .bind(b.employee_id.to_string())
    .bind(i64::from(b.year))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn save_balance_totals(conn: &mut SqliteConnection, b: &LeaveBalance) -> Result<(), LeaveError> {
    sqlx::query(&format!(
        r#"UPDATE leave_balances SET vacation_days_total = ?1, permission_hours_total = ?2, updated_at = {NOW}
           WHERE employee_id = ?3 AND year = ?4"#
    ))
    .bind(b.vacation_days_total)
    .bind(b.permission_hours_total)
    .bind(b.employee_id.to_string())
    .bind(i64::from(b.year))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_balances(conn: &mut SqliteConnection, employee_id: Uuid) -> Result<Vec<LeaveBalance>, LeaveError> {
    let rows = sqlx::query("SELECT * FROM leave_balances WHERE employee_id = ?1 ORDER BY year DESC")
        .bind(employee_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    collect(rows, row_to_balance)
}

// ---------------------- business trips ----------------------

pub async fn insert_trip(conn: &mut SqliteConnection, t: &BusinessTrip) -> Result<BusinessTrip, LeaveError> {
    sqlx::query(
        r#"INSERT INTO business_trips (id, employee_id, destination, purpose, status, start_date, end_date)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
    )
    .bind(t.id.to_string())
    .bind(t.employee_id.to_string())
    .bind(&t.destination)
    .bind(&t.purpose)
    .bind(t.status.as_str())
    .bind(t.range.start())
    .bind(t.range.end())
    .execute(&mut *conn)
    .await?;
    require_trip(conn, t.id).await
}

pub async fn get_trip(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<BusinessTrip>, LeaveError> {
    let row = sqlx::query("SELECT * FROM business_trips WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_trip).transpose()
}

pub async fn require_trip(conn: &mut SqliteConnection, id: Uuid) -> Result<BusinessTrip, LeaveError> {
    get_trip(conn, id).await?.ok_or(LeaveError::NotFound { entity: "business trip", id })
}

pub async fn list_trips(
    conn: &mut SqliteConnection,
    employee_id: Option<Uuid>,
    status: Option<LeaveStatus>,
) -> Result<Vec<BusinessTrip>, LeaveError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM business_trips WHERE 1=1");
    if let Some(e) = employee_id {
        qb.push(" AND employee_id = ").push_bind(e.to_string());
    }
    if let Some(s) = status {
        qb.push(" AND status = ").push_bind(s.as_str());
    }
    qb.push(" ORDER BY start_date DESC");
    let rows = qb.build().fetch_all(&mut *conn).await?;
    collect(rows, row_to_trip)
}

pub async fn update_trip_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: LeaveStatus,
) -> Result<BusinessTrip, LeaveError> {
    sqlx::query(&format!("UPDATE business_trips SET status = ?1, reviewed_at = {NOW} WHERE id = ?2"))
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    require_trip(conn, id).await
}

// ---------------------- sick leave ----------------------

pub async fn insert_sick_leave(conn: &mut SqliteConnection, s: &SickLeave) -> Result<SickLeave, LeaveError> {
    sqlx::query(
        r#"INSERT INTO sick_leaves (id, employee_id, start_date, end_date, certificate_code, note)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
    )
    .bind(s.id.to_string())
    .bind(s.employee_id.to_string())
    .bind(s.range.start())
    .bind(s.range.end())
    .bind(&s.certificate_code)
    .bind(&s.note)
    .execute(&mut *conn)
    .await?;
    get_sick_leave(conn, s.id).await?.ok_or(LeaveError::NotFound { entity: "sick leave", id: s.id })
}

pub async fn get_sick_leave(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<SickLeave>, LeaveError> {
    let row = sqlx::query("SELECT * FROM sick_leaves WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_sick_leave).transpose()
}

pub async fn list_sick_leaves(
    conn: &mut SqliteConnection,
    employee_id: Option<Uuid>,
) -> Result<Vec<SickLeave>, LeaveError> {
    let rows = match employee_id {
        Some(e) => {
            sqlx::query("SELECT * FROM sick_leaves WHERE employee_id = ?1 ORDER BY start_date DESC")
                .bind(e.to_string())
                .fetch_all(&mut *conn)
                .await?
        }
        None => sqlx::query("SELECT * FROM sick_leaves ORDER BY start_date DESC").fetch_all(&mut *conn).await?,
    };
    collect(rows, row_to_sick_leave)
}

pub async fn delete_sick_leave(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, LeaveError> {
    let res = sqlx::query("DELETE FROM sick_leaves WHERE id = ?1").bind(id.to_string()).execute(&mut *conn).await?;
    Ok(res.rows_affected() > 0)
}

// ---------------------- attendance ----------------------

#[derive(Debug, Clone)]
pub struct AttendanceUpsert {
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub note: Option<String>,
}

/// Last write wins on `(employee_id, date)`; trip and sick-leave flags are kept.
pub async fn upsert_attendance(conn: &mut SqliteConnection, a: &AttendanceUpsert) -> Result<Attendance, LeaveError> {
    sqlx::query(&format!(
        r#"INSERT INTO unified_attendances (id, employee_id, date, check_in_time, check_out_time, note)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(employee_id, date) DO UPDATE SET
             check_in_time = excluded.check_in_time,
             check_out_time = excluded.check_out_time,
             note = excluded.note,
             updated_at = {NOW}"#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(a.employee_id.to_string())
    .bind(a.date)
    .bind(a.check_in_time)
    .bind(a.check_out_time)
    .bind(&a.note)
    .execute(&mut *conn)
    .await?;
    let row = sqlx::query("SELECT * FROM unified_attendances WHERE employee_id = ?1 AND date = ?2")
        .bind(a.employee_id.to_string())
        .bind(a.date)
        .fetch_one(&mut *conn)
        .await?;
    row_to_attendance(&row)
}

pub async fn list_attendance(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    range: &DateRange,
) -> Result<Vec<Attendance>, LeaveError> {
    let rows = sqlx::query(
        r#"SELECT * FROM unified_attendances
           WHERE employee_id = ?1 AND date >= ?2 AND date <= ?3
           ORDER BY date"#,
    )
    .bind(employee_id.to_string())
    .bind(range.start())
    .bind(range.end())
    .fetch_all(&mut *conn)
    .await?;
    collect(rows, row_to_attendance)
}

/// Which generated flag a batch of attendance rows carries.
#[derive(Debug, Clone, Copy)]
pub enum AttendanceSource {
    BusinessTrip(Uuid),
    SickLeave(Uuid),
}

impl AttendanceSource {
    fn columns(&self) -> (&'static str, &'static str) {
        match self {
            AttendanceSource::BusinessTrip(_) => ("is_business_trip", "business_trip_id"),
            AttendanceSource::SickLeave(_) => ("is_sick_leave", "sick_leave_id"),
        }
    }

    fn id(&self) -> Uuid {
        match self {
            AttendanceSource::BusinessTrip(id) | AttendanceSource::SickLeave(id) => *id,
        }
    }
}

pub async fn mark_attendance_days(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    days: &[NaiveDate],
    source: AttendanceSource,
) -> Result<u64, LeaveError> {
    let (flag, link) = source.columns();
    let sql = format!(
        r#"INSERT INTO unified_attendances (id, employee_id, date, {flag}, {link})
           VALUES (?1, ?2, ?3, 1, ?4)
           ON CONFLICT(employee_id, date) DO UPDATE SET
             {flag} = 1, {link} = excluded.{link}, updated_at = {NOW}"#
    );
    let mut marked = 0;
    for day in days {
        let res = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(employee_id.to_string())
            .bind(*day)
            .bind(source.id().to_string())
            .execute(&mut *conn)
            .await?;
        marked += res.rows_affected();
    }
    Ok(marked)
}

/// Drops generated rows that carry nothing else and unflags the rest.
pub async fn clear_attendance_days(conn: &mut SqliteConnection, source: AttendanceSource) -> Result<u64, LeaveError> {
    let (flag, link) = source.columns();
    let other = match source {
        AttendanceSource::BusinessTrip(_) => "is_sick_leave",
        AttendanceSource::SickLeave(_) => "is_business_trip",
    };
    let deleted = sqlx::query(&format!(
        "DELETE FROM unified_attendances WHERE {link} = ?1 AND check_in_time IS NULL AND {other} = 0"
    ))
    .bind(source.id().to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    let unflagged = sqlx::query(&format!(
        "UPDATE unified_attendances SET {flag} = 0, {link} = NULL, updated_at = {NOW} WHERE {link} = ?1"
    ))
    .bind(source.id().to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(deleted + unflagged)
}

// ---------------------- conflict snapshot ----------------------

/// Every non-rejected record of the employee intersecting `range`.
pub async fn load_entries(
    conn: &mut SqliteConnection,
    employee_id: Uuid,
    range: &DateRange,
) -> Result<Vec<ExistingEntry>, LeaveError> {
    let emp = employee_id.to_string();
    let mut entries = Vec::new();

    let rows = sqlx::query(
        r#"SELECT id, kind, status, start_date, end_date, time_from, time_to FROM leave_requests
           WHERE employee_id = ?1 AND status != 'rejected' AND start_date <= ?3 AND end_date >= ?2"#,
    )
    .bind(&emp)
    .bind(range.start())
    .bind(range.end())
    .fetch_all(&mut *conn)
    .await?;
    for row in &rows {
        let kind: LeaveKind = enum_col(row, "kind")?;
        let status: LeaveStatus = enum_col(row, "status")?;
        entries.push(ExistingEntry {
            id: uuid_col(row, "id")?,
            kind: kind.into(),
            approved: status == LeaveStatus::Approved,
            range: range_cols(row)?,
            window: window_cols(row)?,
        });
    }

    let rows = sqlx::query(
        r#"SELECT id, status, start_date, end_date FROM business_trips
           WHERE employee_id = ?1 AND status != 'rejected' AND start_date <= ?3 AND end_date >= ?2"#,
    )
    .bind(&emp)
    .bind(range.start())
    .bind(range.end())
    .fetch_all(&mut *conn)
    .await?;
    for row in &rows {
        let status: LeaveStatus = enum_col(row, "status")?;
        entries.push(ExistingEntry {
            id: uuid_col(row, "id")?,
            kind: EntryKind::BusinessTrip,
            approved: status == LeaveStatus::Approved,
            range: range_cols(row)?,
            window: None,
        });
    }

    let rows = sqlx::query(
        r#"SELECT id, start_date, end_date FROM sick_leaves
           WHERE employee_id = ?1 AND start_date <= ?3 AND end_date >= ?2"#,
    )
    .bind(&emp)
    .bind(range.start())
    .bind(range.end())
    .fetch_all(&mut *conn)
    .await?;
    for row in &rows {
        entries.push(ExistingEntry {
            id: uuid_col(row, "id")?,
            kind: EntryKind::SickLeave,
            approved: true,
            range: range_cols(row)?,
            window: None,
        });
    }

    let rows = sqlx::query(
        r#"SELECT id, date FROM unified_attendances
           WHERE employee_id = ?1 AND date >= ?2 AND date <= ?3 AND check_in_time IS NOT NULL"#,
    )
    .bind(&emp)
    .bind(range.start())
    .bind(range.end())
    .fetch_all(&mut *conn)
    .await?;
    for row in &rows {
        entries.push(ExistingEntry {
            id: uuid_col(row, "id")?,
            kind: EntryKind::Attendance,
            approved: true,
            range: DateRange::single(row.try_get("date")?),
            window: None,
        });
    }

    Ok(entries)
}
