use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{
        validation::{validate_text, validate_year},
        AppResult,
    },
    leave::Holiday,
    state::AppState,
    types::{CreateHolidayRequest, YearQuery},
};

pub async fn create_holiday(
    State(state): State<AppState>,
    Json(req): Json<CreateHolidayRequest>,
) -> AppResult<(StatusCode, Json<Holiday>)> {
    validate_text(&req.name, "name", 100)?;
    let holiday = state.leave.create_holiday(req.date, req.name.trim().to_string(), req.is_recurring).await?;
    Ok((StatusCode::CREATED, Json(holiday)))
}

/// Holidays of one year (recurring ones always included), or all of them.
pub async fn list_holidays(
    State(state): State<AppState>,
    Query(q): Query<YearQuery>,
) -> AppResult<Json<Vec<Holiday>>> {
    if let Some(year) = q.year {
        validate_year(year)?;
    }
    Ok(Json(state.leave.holidays(q.year).await?))
}

pub async fn delete_holiday(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    state.leave.delete_holiday(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
