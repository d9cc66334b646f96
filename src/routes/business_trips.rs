use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{
        validation::{validate_optional_text, validate_text},
        AppResult,
    },
    leave::{service::NewBusinessTrip, BusinessTrip, DateRange},
    state::AppState,
    types::{BusinessTripResponse, CreateBusinessTripRequest, StatusChangeRequest, TripListQuery, WithConflicts},
};

pub async fn create_trip(
    State(state): State<AppState>,
    Json(req): Json<CreateBusinessTripRequest>,
) -> AppResult<(StatusCode, Json<BusinessTripResponse>)> {
    validate_text(&req.destination, "destination", 200)?;
    validate_optional_text(req.purpose.as_deref(), "purpose", 1000)?;
    let range = DateRange::new(req.start_date, req.end_date)?;

    let (record, conflicts) = state
        .leave
        .create_trip(NewBusinessTrip {
            employee_id: req.employee_id,
            destination: req.destination.trim().to_string(),
            purpose: req.purpose,
            range,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(WithConflicts { record, conflicts })))
}

pub async fn list_trips(
    State(state): State<AppState>,
    Query(q): Query<TripListQuery>,
) -> AppResult<Json<Vec<BusinessTrip>>> {
    Ok(Json(state.leave.trips(q.employee_id, q.status).await?))
}

pub async fn get_trip(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<BusinessTrip>> {
    Ok(Json(state.leave.trip(id).await?))
}

/// Approving fills the attendance sheet for the trip's working days.
pub async fn change_trip_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeRequest>,
) -> AppResult<Json<BusinessTripResponse>> {
    let (record, conflicts) = state.leave.change_trip_status(id, req.status).await?;
    Ok(Json(WithConflicts { record, conflicts }))
}
