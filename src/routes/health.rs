use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::fmt::Write;

// Health check endpoint - lightweight, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: checks DB connectivity with timeout protection
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let counters: [(&str, &str, u64); 9] = [
        ("leave_requests_created", "Leave requests created", m.requests_created as u64),
        ("leave_requests_approved", "Leave requests approved", m.requests_approved as u64),
        ("leave_requests_rejected", "Leave requests rejected", m.requests_rejected as u64),
        ("critical_conflicts", "Blocking conflicts that refused a write", m.critical_conflicts as u64),
        ("balance_adjustments", "Balance years adjusted by status changes", m.balance_adjustments as u64),
        ("balance_recalculations", "Full balance recalculations", m.recalculations as u64),
        ("business_trips_approved", "Business trips approved", m.trips_approved as u64),
        ("sick_leaves_recorded", "Sick-leave periods recorded", m.sick_leaves_recorded as u64),
        ("attendance_upserts", "Attendance rows written", m.attendance_upserts as u64),
    ];

    let mut body = String::new();
    for (name, help, value) in counters {
        let _ = write!(body, "# HELP presenze_{name} {help}\n# TYPE presenze_{name} counter\npresenze_{name} {value}\n");
    }
    let _ = write!(
        body,
        "# HELP presenze_uptime_seconds Uptime seconds\n# TYPE presenze_uptime_seconds gauge\npresenze_uptime_seconds {}\n",
        m.uptime_seconds
    );
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
