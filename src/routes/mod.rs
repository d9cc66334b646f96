//! HTTP route handlers and the router that wires them together.
//!
//! - `employees`, `schedules`, `holidays`: master data
//! - `leave_requests`, `business_trips`, `sick_leaves`, `attendance`: the records
//! - `conflicts`: validator dry runs and blocked dates
//! - `balances`: per-year entitlements and reconciliation
//! - `events`: live SSE feed
//! - `health`: probes, metrics and version

pub mod attendance;
pub mod balances;
pub mod business_trips;
pub mod conflicts;
pub mod employees;
pub mod events;
pub mod health;
pub mod holidays;
pub mod leave_requests;
pub mod schedules;
pub mod sick_leaves;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::middleware;
use crate::state::AppState;

// Compression must skip SSE (text/event-stream) or live streams stall.
#[derive(Clone)]
struct NoSseDefault(DefaultPredicate);

impl Predicate for NoSseDefault {
    fn should_compress<B: axum::body::HttpBody>(&self, res: &axum::http::Response<B>) -> bool {
        let is_sse = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.starts_with("text/event-stream"))
            .unwrap_or(false);
        !is_sse && self.0.should_compress(res)
    }
}

/// Builds the complete application router with all middleware layers.
pub fn router(state: AppState) -> Router {
    let cfg_arc = state.config.clone();
    let compression = CompressionLayer::new().compress_when(NoSseDefault(DefaultPredicate::new()));

    let app = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/events", get(events::events))
        // master data
        .route("/employees", post(employees::create_employee).get(employees::list_employees))
        .route("/employees/{id}", get(employees::get_employee))
        .route(
            "/employees/{id}/work-schedule",
            get(schedules::get_employee_schedule)
                .put(schedules::put_employee_schedule)
                .delete(schedules::delete_employee_schedule),
        )
        .route("/work-schedule", get(schedules::get_company_schedule).put(schedules::put_company_schedule))
        .route("/holidays", post(holidays::create_holiday).get(holidays::list_holidays))
        .route("/holidays/{id}", axum::routing::delete(holidays::delete_holiday))
        // records
        .route(
            "/leave-requests",
            post(leave_requests::create_leave_request).get(leave_requests::list_leave_requests),
        )
        .route(
            "/leave-requests/{id}",
            get(leave_requests::get_leave_request).delete(leave_requests::delete_leave_request),
        )
        .route("/leave-requests/{id}/status", put(leave_requests::change_status))
        .route("/business-trips", post(business_trips::create_trip).get(business_trips::list_trips))
        .route("/business-trips/{id}", get(business_trips::get_trip))
        .route("/business-trips/{id}/status", put(business_trips::change_trip_status))
        .route("/sick-leaves", post(sick_leaves::record_sick_leave).get(sick_leaves::list_sick_leaves))
        .route("/sick-leaves/{id}", axum::routing::delete(sick_leaves::delete_sick_leave))
        .route("/attendance", put(attendance::upsert_attendance).get(attendance::list_attendance))
        // validator
        .route("/conflicts/check", post(conflicts::check_conflicts))
        .route("/employees/{id}/conflict-dates", get(conflicts::conflict_dates))
        // balances
        .route("/employees/{id}/balances", get(balances::list_balances))
        .route("/employees/{id}/balances/{year}", get(balances::get_balance).put(balances::set_entitlements))
        .route("/employees/{id}/balances/{year}/recalculate", post(balances::recalculate_employee))
        .route("/balances/recalculate", post(balances::recalculate))
        .with_state(state)
        .layer(DefaultBodyLimit::max(middleware::validation::MAX_BODY_BYTES))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn_with_state(cfg_arc.clone(), middleware::auth::auth_middleware))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg_arc, middleware::security_headers::security_headers_middleware));

    // CORS: permissive in debug builds for a separately served UI
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
