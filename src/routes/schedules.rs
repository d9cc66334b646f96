use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    leave::{ScheduleSource, WorkSchedule},
    state::AppState,
    types::EffectiveSchedule,
};

fn validate_schedule(s: &WorkSchedule) -> AppResult<()> {
    if s.start_time >= s.end_time {
        return Err(AppError::ValidationError {
            field: "end_time".to_string(),
            message: "end_time must be after start_time".to_string(),
        });
    }
    if !s.has_working_days() {
        return Err(AppError::ValidationError {
            field: "weekdays".to_string(),
            message: "at least one weekday must be worked".to_string(),
        });
    }
    if s.daily_hours() <= 0.0 {
        return Err(AppError::ValidationError {
            field: "break_minutes".to_string(),
            message: "break leaves no working time".to_string(),
        });
    }
    Ok(())
}

fn effective(schedule: WorkSchedule, source: ScheduleSource) -> EffectiveSchedule {
    EffectiveSchedule { daily_hours: schedule.daily_hours(), schedule, source }
}

pub async fn get_company_schedule(State(state): State<AppState>) -> AppResult<Json<EffectiveSchedule>> {
    let schedule = state.leave.company_work_schedule().await?;
    Ok(Json(effective(schedule, ScheduleSource::Company)))
}

pub async fn put_company_schedule(
    State(state): State<AppState>,
    Json(schedule): Json<WorkSchedule>,
) -> AppResult<Json<EffectiveSchedule>> {
    validate_schedule(&schedule)?;
    state.leave.set_company_work_schedule(&schedule).await?;
    Ok(Json(effective(schedule, ScheduleSource::Company)))
}

/// The schedule actually applied to the employee, with where it comes from.
pub async fn get_employee_schedule(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<EffectiveSchedule>> {
    let (schedule, source) = state.leave.employee_work_schedule(employee_id).await?;
    Ok(Json(effective(schedule, source)))
}

pub async fn put_employee_schedule(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
    Json(schedule): Json<WorkSchedule>,
) -> AppResult<Json<EffectiveSchedule>> {
    validate_schedule(&schedule)?;
    state.leave.set_employee_work_schedule(employee_id, &schedule).await?;
    Ok(Json(effective(schedule, ScheduleSource::Employee)))
}

/// Drops the own schedule; the company one applies again.
pub async fn delete_employee_schedule(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<EffectiveSchedule>> {
    if !state.leave.clear_employee_work_schedule(employee_id).await? {
        return Err(AppError::NotFound(format!("employee {} has no own work schedule", employee_id)));
    }
    let (schedule, source) = state.leave.employee_work_schedule(employee_id).await?;
    Ok(Json(effective(schedule, source)))
}
