use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{validation::validate_optional_text, AppResult},
    leave::{
        parse_window,
        service::NewLeaveRequest,
        store::LeaveRequestFilter,
        DateRange, LeaveRequest,
    },
    middleware::ClientIp,
    state::AppState,
    types::{CreateLeaveRequest, LeaveListQuery, LeaveRequestResponse, StatusChangeRequest, WithConflicts},
};

const MAX_NOTE_LEN: usize = 1000;

/// Creates a pending vacation or permission request.
///
/// Answers `409` with the conflict report when the request overlaps something
/// that blocks it; warnings and infos come back alongside the created record.
pub async fn create_leave_request(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<CreateLeaveRequest>,
) -> AppResult<(StatusCode, Json<LeaveRequestResponse>)> {
    state.rate_limiter.check_endpoint_limit("/leave-requests", ip).await?;
    validate_optional_text(req.note.as_deref(), "note", MAX_NOTE_LEN)?;

    let range = DateRange::new(req.start_date, req.end_date)?;
    let window = parse_window(req.kind.into(), &range, req.time_from, req.time_to)?;
    let (record, conflicts) = state
        .leave
        .create_leave_request(NewLeaveRequest {
            employee_id: req.employee_id,
            kind: req.kind,
            range,
            window,
            note: req.note,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(WithConflicts { record, conflicts })))
}

pub async fn list_leave_requests(
    State(state): State<AppState>,
    Query(q): Query<LeaveListQuery>,
) -> AppResult<Json<Vec<LeaveRequest>>> {
    let filter = LeaveRequestFilter { employee_id: q.employee_id, status: q.status, kind: q.kind, year: q.year };
    Ok(Json(state.leave.leave_requests(&filter).await?))
}

pub async fn get_leave_request(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<LeaveRequest>> {
    Ok(Json(state.leave.leave_request(id).await?))
}

pub async fn change_status(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeRequest>,
) -> AppResult<Json<LeaveRequestResponse>> {
    state.rate_limiter.check_endpoint_limit("/leave-requests", ip).await?;
    validate_optional_text(req.review_note.as_deref(), "review_note", MAX_NOTE_LEN)?;
    let (record, conflicts) = state.leave.change_leave_status(id, req.status, req.review_note.as_deref()).await?;
    Ok(Json(WithConflicts { record, conflicts }))
}

pub async fn delete_leave_request(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    state.leave.delete_leave_request(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
