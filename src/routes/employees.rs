use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{
        validation::{validate_email, validate_text},
        AppResult,
    },
    leave::service::NewEmployee,
    state::AppState,
    types::{CreateEmployeeRequest, Employee, EmployeeListQuery},
};

pub async fn create_employee(
    State(state): State<AppState>,
    Json(req): Json<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<Employee>)> {
    validate_text(&req.first_name, "first_name", 100)?;
    validate_text(&req.last_name, "last_name", 100)?;
    let email = req.email.trim().to_lowercase();
    validate_email(&email)?;

    let employee = state
        .leave
        .create_employee(NewEmployee {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email,
            role: req.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn list_employees(
    State(state): State<AppState>,
    Query(q): Query<EmployeeListQuery>,
) -> AppResult<Json<Vec<Employee>>> {
    Ok(Json(state.leave.employees(q.active.unwrap_or(false)).await?))
}

pub async fn get_employee(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Employee>> {
    Ok(Json(state.leave.employee(id).await?))
}
