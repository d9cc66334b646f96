use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::{validation::validate_optional_text, AppError, AppResult},
    leave::{store::AttendanceUpsert, Attendance, DateRange},
    state::AppState,
    types::{AttendanceQuery, AttendanceResponse, UpsertAttendanceRequest, WithConflicts},
};

/// Longest window the attendance listing serves in one call.
const MAX_LIST_DAYS: i64 = 400;

pub async fn upsert_attendance(
    State(state): State<AppState>,
    Json(req): Json<UpsertAttendanceRequest>,
) -> AppResult<Json<AttendanceResponse>> {
    validate_optional_text(req.note.as_deref(), "note", 1000)?;
    let (record, conflicts) = state
        .leave
        .upsert_attendance(AttendanceUpsert {
            employee_id: req.employee_id,
            date: req.date,
            check_in_time: req.check_in_time,
            check_out_time: req.check_out_time,
            note: req.note,
        })
        .await?;
    Ok(Json(WithConflicts { record, conflicts }))
}

pub async fn list_attendance(
    State(state): State<AppState>,
    Query(q): Query<AttendanceQuery>,
) -> AppResult<Json<Vec<Attendance>>> {
    let range = DateRange::new(q.from, q.to)?;
    if range.len_days() > MAX_LIST_DAYS {
        return Err(AppError::BadRequest(format!("window may span at most {} days", MAX_LIST_DAYS)));
    }
    Ok(Json(state.leave.attendance(q.employee_id, range).await?))
}
