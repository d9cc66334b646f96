use axum::{
    extract::{connect_info::ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Extract client IP from proxy headers and optional transport metadata.
pub fn extract_ip_from_headers(headers: &HeaderMap, fallback: Option<IpAddr>) -> IpAddr {
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
        if let Ok(ip) = h.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    fallback.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Client address of a request; never rejects, even without `ConnectInfo`
/// (router tests drive the service directly).
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let remote = ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await.ok().map(|ci| ci.0.ip());
        Ok(ClientIp(extract_ip_from_headers(&parts.headers, remote)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.1.2.3, 172.16.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(extract_ip_from_headers(&headers, None), IpAddr::from([10, 1, 2, 3]));
    }

    #[test]
    fn falls_back_to_transport_then_loopback() {
        let headers = HeaderMap::new();
        let remote = IpAddr::from([192, 168, 1, 7]);
        assert_eq!(extract_ip_from_headers(&headers, Some(remote)), remote);
        assert_eq!(extract_ip_from_headers(&headers, None), IpAddr::from([127, 0, 0, 1]));
    }
}
