use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;

use crate::leave::{ConflictReport, LeaveError};

/// Everything a handler can fail with, rendered as the JSON error envelope.
#[derive(Debug)]
pub enum AppError {
    /// Unexpected failure; the cause is logged, the client only sees an error id.
    Internal(anyhow::Error),
    BadRequest(String),
    NotFound(String),
    /// Duplicate master data, e.g. an employee email already in use.
    Conflict(String),
    /// Blocking overlaps with existing leave, trips, sick leave or attendance.
    LeaveConflict(ConflictReport),
    ServiceUnavailable(String),
    Database(String),
    Unauthorized(String),
    RateLimited { retry_after_seconds: u64 },
    /// A single request field failed validation.
    ValidationError { field: String, message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::LeaveConflict(report) => {
                write!(f, "Leave conflict: {} blocking conflict(s)", report.critical_count())
            }
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::RateLimited { retry_after_seconds } => {
                write!(f, "Rate limited. Retry after {} seconds", retry_after_seconds)
            }
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            AppError::LeaveConflict(report) => {
                let message = format!("{} blocking conflict(s) with existing entries", report.critical_count());
                (StatusCode::CONFLICT, "LEAVE_CONFLICT", message, Some(json!(report)))
            }
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg, None)
            }
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(json!({ "details": msg })),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            AppError::RateLimited { retry_after_seconds } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::Conflict(format!("Duplicate value: {}", db_err.message()))
                } else if db_err.is_foreign_key_violation() {
                    AppError::NotFound("Referenced record does not exist".to_string())
                } else {
                    AppError::Database(format!("Database error: {}", db_err.message()))
                }
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

impl From<LeaveError> for AppError {
    fn from(err: LeaveError) -> Self {
        match err {
            LeaveError::Conflicts(report) => AppError::LeaveConflict(report),
            LeaveError::NotFound { .. } => AppError::NotFound(err.to_string()),
            LeaveError::InvalidRange { .. } => {
                AppError::ValidationError { field: "end_date".to_string(), message: err.to_string() }
            }
            LeaveError::InvalidTimeWindow(ref msg) => {
                AppError::ValidationError { field: "time_window".to_string(), message: msg.clone() }
            }
            LeaveError::InvalidValue { field, .. } => {
                AppError::ValidationError { field: field.to_string(), message: err.to_string() }
            }
            LeaveError::NoWorkingDays(_) | LeaveError::UnchangedStatus(_) | LeaveError::WindowTooLarge { .. } => {
                AppError::BadRequest(err.to_string())
            }
            LeaveError::Database(e) => e.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub trait OptionExt<T> {
    /// `None` becomes `NotFound("<entity> not found")`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Field validators shared by the handlers.
pub mod validation {
    use super::*;

    /// Rejects empty, overlong or control-character text.
    pub fn validate_text(value: &str, field: &str, max_len: usize) -> AppResult<()> {
        if value.trim().is_empty() {
            return Err(AppError::ValidationError {
                field: field.to_string(),
                message: "Value cannot be empty".to_string(),
            });
        }
        validate_optional_text(Some(value), field, max_len)
    }

    pub fn validate_optional_text(value: Option<&str>, field: &str, max_len: usize) -> AppResult<()> {
        let Some(value) = value else { return Ok(()) };
        if value.chars().count() > max_len {
            return Err(AppError::ValidationError {
                field: field.to_string(),
                message: format!("Value exceeds {} characters", max_len),
            });
        }
        if value.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
            return Err(AppError::ValidationError {
                field: field.to_string(),
                message: "Value contains control characters".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_email(email: &str) -> AppResult<()> {
        validate_text(email, "email", 254)?;
        let valid = match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
            None => false,
        };
        if !valid || email.contains(char::is_whitespace) {
            return Err(AppError::ValidationError {
                field: "email".to_string(),
                message: format!("Invalid email address: {}", email),
            });
        }
        Ok(())
    }

    /// Years outside 2000..=2100 are almost certainly typos.
    pub fn validate_year(year: i32) -> AppResult<()> {
        if !(2000..=2100).contains(&year) {
            return Err(AppError::ValidationError {
                field: "year".to_string(),
                message: format!("Year must be in 2000..=2100, got {}", year),
            });
        }
        Ok(())
    }

    /// Validates that a number is not negative.
    pub fn validate_non_negative(value: f64, field: &str) -> AppResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::ValidationError {
                field: field.to_string(),
                message: format!("Value must be a non-negative number, got {}", value),
            });
        }
        Ok(())
    }
}
