use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{validation::validate_optional_text, AppResult},
    leave::{service::NewSickLeave, DateRange, SickLeave},
    state::AppState,
    types::{CreateSickLeaveRequest, EmployeeFilterQuery, SickLeaveResponse, WithConflicts},
};

pub async fn record_sick_leave(
    State(state): State<AppState>,
    Json(req): Json<CreateSickLeaveRequest>,
) -> AppResult<(StatusCode, Json<SickLeaveResponse>)> {
    validate_optional_text(req.certificate_code.as_deref(), "certificate_code", 64)?;
    validate_optional_text(req.note.as_deref(), "note", 1000)?;
    let range = DateRange::new(req.start_date, req.end_date)?;

    let (record, conflicts) = state
        .leave
        .record_sick_leave(NewSickLeave {
            employee_id: req.employee_id,
            range,
            certificate_code: req.certificate_code,
            note: req.note,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(WithConflicts { record, conflicts })))
}

pub async fn list_sick_leaves(
    State(state): State<AppState>,
    Query(q): Query<EmployeeFilterQuery>,
) -> AppResult<Json<Vec<SickLeave>>> {
    Ok(Json(state.leave.sick_leaves(q.employee_id).await?))
}

pub async fn delete_sick_leave(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    state.leave.delete_sick_leave(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
