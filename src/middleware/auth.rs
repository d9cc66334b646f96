use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;

/// Probes stay reachable for orchestrators without credentials.
const PUBLIC_PATHS: &[&str] = &["/healthz", "/readyz", "/version"];

/// Requires `Authorization: Bearer <token>` when `security.auth_token` is configured.
///
/// Without a configured token the middleware is a no-op.
pub async fn auth_middleware(State(cfg): State<Arc<AppConfig>>, req: Request, next: Next) -> Response {
    let Some(expected) = cfg.security.as_ref().and_then(|s| s.auth_token.as_deref()).filter(|t| !t.is_empty())
    else {
        return next.run(req).await;
    };
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => next.run(req).await,
        Some(_) => AppError::Unauthorized("Invalid bearer token".to_string()).into_response(),
        None => AppError::Unauthorized("Missing bearer token".to_string()).into_response(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
