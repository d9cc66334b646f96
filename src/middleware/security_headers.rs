//! Security headers for every API response.
//!
//! The backend only serves JSON and the `/events` stream, so both get
//! `no-store` caching; HSTS and CSP come from the `security` config section.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("referrer-policy", "no-referrer"),
        ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
        ("cross-origin-opener-policy", "same-origin"),
        ("cross-origin-resource-policy", "same-origin"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    if let Some(sec) = cfg.security.as_ref() {
        apply_configured(headers, sec);
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|ct| ct.to_str().ok()).map(str::to_owned);
    if let Some(ct) = content_type.as_deref() {
        let is_sse = ct.starts_with("text/event-stream");
        if is_sse || ct.starts_with("application/json") {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        // Reverse proxies must not buffer the event stream
        if is_sse {
            headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
        }
    }

    res
}

fn apply_configured(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let max_age = sec.hsts_max_age.unwrap_or(31536000);
        let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
        if let Ok(value) = HeaderValue::from_str(&format!("max-age={}{}", max_age, include_sub)) {
            headers.insert(HeaderName::from_static("strict-transport-security"), value);
        }
    }
    if let Some(csp) = sec.csp.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        match HeaderValue::from_str(csp) {
            Ok(value) => {
                headers.insert(HeaderName::from_static("content-security-policy"), value);
            }
            Err(e) => tracing::warn!("Ignoring invalid security.csp: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsts_and_csp_follow_config() {
        let mut headers = HeaderMap::new();
        let sec = SecurityConfig {
            enable_hsts: Some(true),
            hsts_max_age: Some(600),
            hsts_include_subdomains: Some(true),
            csp: Some("default-src 'none'".to_string()),
            ..Default::default()
        };
        apply_configured(&mut headers, &sec);
        assert_eq!(headers.get("strict-transport-security").unwrap(), "max-age=600; includeSubDomains");
        assert_eq!(headers.get("content-security-policy").unwrap(), "default-src 'none'");
    }

    #[test]
    fn disabled_hsts_adds_nothing() {
        let mut headers = HeaderMap::new();
        apply_configured(&mut headers, &SecurityConfig::default());
        assert!(headers.is_empty());
    }
}
