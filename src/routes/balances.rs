use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::{
        validation::{validate_non_negative, validate_year},
        AppResult,
    },
    leave::BalanceReport,
    middleware::ClientIp,
    state::AppState,
    types::{RecalculateRequest, RecalculateResponse, SetEntitlementsRequest},
};

pub async fn list_balances(
    State(state): State<AppState>,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<Vec<BalanceReport>>> {
    Ok(Json(state.leave.balances(employee_id).await?))
}

/// Balance of one year; created with the configured entitlements when missing.
pub async fn get_balance(
    State(state): State<AppState>,
    Path((employee_id, year)): Path<(Uuid, i32)>,
) -> AppResult<Json<BalanceReport>> {
    validate_year(year)?;
    Ok(Json(state.leave.balance(employee_id, year).await?))
}

pub async fn set_entitlements(
    State(state): State<AppState>,
    Path((employee_id, year)): Path<(Uuid, i32)>,
    Json(req): Json<SetEntitlementsRequest>,
) -> AppResult<Json<BalanceReport>> {
    validate_year(year)?;
    validate_non_negative(req.vacation_days_total, "vacation_days_total")?;
    validate_non_negative(req.permission_hours_total, "permission_hours_total")?;
    let report = state
        .leave
        .set_entitlements(employee_id, year, req.vacation_days_total, req.permission_hours_total)
        .await?;
    Ok(Json(report))
}

pub async fn recalculate_employee(
    State(state): State<AppState>,
    Path((employee_id, year)): Path<(Uuid, i32)>,
) -> AppResult<Json<BalanceReport>> {
    validate_year(year)?;
    Ok(Json(state.leave.recalculate_balance(employee_id, year).await?))
}

/// Rebuilds used amounts from approved requests, for one employee or all active ones.
pub async fn recalculate(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<RecalculateRequest>,
) -> AppResult<Json<RecalculateResponse>> {
    state.rate_limiter.check_endpoint_limit("/balances/recalculate", ip).await?;
    validate_year(req.year)?;
    let employees = match req.employee_id {
        Some(id) => {
            state.leave.recalculate_balance(id, req.year).await?;
            1
        }
        None => state.leave.recalculate_all(req.year).await?,
    };
    Ok(Json(RecalculateResponse { year: req.year, employees }))
}
