use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Largest accepted request body; leave payloads are tiny.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

fn reject(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message,
            },
            "status": status.as_u16(),
        })),
    )
        .into_response()
}

/// An Axum middleware that validates incoming requests before routing.
///
/// Rejects encoded traversal or null bytes in the URI, bodies announced larger
/// than [`MAX_BODY_BYTES`], and write requests carrying a body that is not JSON.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    if has_suspicious_path(req.uri().path()) {
        return reject(StatusCode::BAD_REQUEST, "INVALID_PATH", "Malformed request path".to_string());
    }

    if matches!(req.method(), &Method::POST | &Method::PUT | &Method::PATCH) {
        let length = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(length) = length {
            if length > MAX_BODY_BYTES {
                return reject(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    format!("Request body exceeds maximum size of {} bytes", MAX_BODY_BYTES),
                );
            }
            if length > 0 && !is_json(&req) {
                return reject(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "UNSUPPORTED_MEDIA_TYPE",
                    "Request body must be application/json".to_string(),
                );
            }
        }
    }

    next.run(req).await
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

/// Every route is made of plain segments, so dot segments and encoded separators are never legitimate.
fn has_suspicious_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    path.contains("/..")
        || path.contains("/./")
        || path.contains('\0')
        || ["%2e", "%2f", "%5c", "%00"].iter().any(|p| lower.contains(p))
}
