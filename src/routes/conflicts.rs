use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    leave::{parse_window, Candidate, ConflictReport, DateRange},
    middleware::ClientIp,
    state::AppState,
    types::{CheckConflictsRequest, ConflictDatesQuery, ConflictDatesResponse},
};

/// Dry run of the validator for a prospective entry; nothing is written.
pub async fn check_conflicts(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<CheckConflictsRequest>,
) -> AppResult<Json<ConflictReport>> {
    state.rate_limiter.check_endpoint_limit("/conflicts/check", ip).await?;

    let range = DateRange::new(req.start_date, req.end_date)?;
    let window = parse_window(req.kind, &range, req.time_from, req.time_to)?;
    let mut candidate = Candidate::new(req.kind, range).with_window(window);
    if let Some(id) = req.exclude_id {
        candidate = candidate.excluding(id);
    }
    Ok(Json(state.leave.check_conflicts(req.employee_id, &candidate).await?))
}

/// Dates a calendar picker should disable for a new entry of `kind`.
pub async fn conflict_dates(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
    Query(q): Query<ConflictDatesQuery>,
) -> AppResult<Json<ConflictDatesResponse>> {
    let window = DateRange::new(q.from, q.to)?;
    let dates = state.leave.conflict_dates(employee_id, q.kind, window).await?;
    Ok(Json(ConflictDatesResponse { employee_id, kind: q.kind, from: q.from, to: q.to, dates }))
}
