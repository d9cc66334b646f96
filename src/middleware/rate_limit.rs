use super::ip::extract_ip_from_headers;
use axum::{
    extract::{connect_info::ConnectInfo, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};

/// A thread-safe rate limiter based on the sliding window algorithm.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Allows `max_requests` per client within `window_seconds`.
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Records the request when allowed; otherwise returns how long the client must wait.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let timestamps = requests.entry(ip).or_default();

        // On clock skew keep the timestamp
        timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = now
                .checked_duration_since(oldest)
                .map(|elapsed| self.window.saturating_sub(elapsed))
                .unwrap_or(Duration::from_secs(1));
            return Err(retry_after.max(Duration::from_secs(1)));
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops clients without requests inside the window.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.requests.read().await.len()
    }
}

fn rate_limited(retry_after: Duration) -> AppError {
    AppError::RateLimited { retry_after_seconds: retry_after.as_secs() }
}

/// An Axum middleware for global per-IP rate limiting.
///
/// Defaults to 1000 requests per 60s, overridable through
/// `PRESENZE_RATE_LIMIT_MAX_REQUESTS` and `PRESENZE_RATE_LIMIT_WINDOW_SECONDS`.
pub async fn rate_limit_middleware(req: Request, next: Next) -> Response {
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);

    lazy_static::lazy_static! {
        static ref GLOBAL_RATE_LIMITER: RateLimiter = {
            let max = std::env::var("PRESENZE_RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1000);
            let win = std::env::var("PRESENZE_RATE_LIMIT_WINDOW_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            RateLimiter::new(max, win)
        };
        static ref GLOBAL_CLEANUP_STARTED: OnceLock<()> = OnceLock::new();
    }

    // Spawned once so the IP map cannot grow without bound
    GLOBAL_CLEANUP_STARTED.get_or_init(|| {
        let limiter = GLOBAL_RATE_LIMITER.clone();
        tokio::spawn(cleanup_task(limiter));
    });

    match GLOBAL_RATE_LIMITER.check_rate_limit(ip).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::debug!(%ip, "global rate limit hit");
            rate_limited(retry_after).into_response()
        }
    }
}

/// Per-endpoint limiters layered on top of the global one.
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<String, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `(endpoint, max_requests, window_seconds)` limits, replacing existing ones.
    pub fn with_limits(self, limits: Vec<(&str, usize, u64)>) -> Self {
        let mut map = Arc::try_unwrap(self.limiters).unwrap_or_else(|shared| (*shared).clone());
        for (endpoint, max_requests, window_seconds) in limits {
            map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(map) }
    }

    /// Endpoints without a configured limit are always allowed.
    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> AppResult<()> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check_rate_limit(ip).await.map_err(|retry_after| {
                tracing::debug!(%ip, endpoint, "endpoint rate limit hit");
                rate_limited(retry_after)
            }),
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}

/// Periodically trims a limiter's storage.
pub async fn cleanup_task(limiter: RateLimiter) {
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        interval.tick().await;
        limiter.cleanup_old_entries().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(3, 1);
        let ip = IpAddr::from([127, 0, 0, 1]);

        assert!(limiter.check_rate_limit(ip).await.is_ok());
        assert!(limiter.check_rate_limit(ip).await.is_ok());
        assert!(limiter.check_rate_limit(ip).await.is_ok());
        let retry = limiter.check_rate_limit(ip).await.unwrap_err();
        assert!(retry >= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check_rate_limit(ip).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_ips() {
        let limiter = RateLimiter::new(1, 60);
        let ip1 = IpAddr::from([127, 0, 0, 1]);
        let ip2 = IpAddr::from([127, 0, 0, 2]);

        assert!(limiter.check_rate_limit(ip1).await.is_ok());
        assert!(limiter.check_rate_limit(ip2).await.is_ok());
        assert!(limiter.check_rate_limit(ip1).await.is_err());
        assert!(limiter.check_rate_limit(ip2).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_forgets_idle_clients() {
        let limiter = RateLimiter::new(5, 1);
        limiter.check_rate_limit(IpAddr::from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(limiter.tracked_clients().await, 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        limiter.cleanup_old_entries().await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[tokio::test]
    async fn endpoint_limits_apply_only_to_listed_routes() {
        let limiter = EndpointRateLimiter::new().with_limits(vec![("/balances/recalculate", 1, 60)]);
        let ip = IpAddr::from([10, 0, 0, 2]);

        assert!(limiter.check_endpoint_limit("/balances/recalculate", ip).await.is_ok());
        assert!(matches!(
            limiter.check_endpoint_limit("/balances/recalculate", ip).await,
            Err(AppError::RateLimited { .. })
        ));
        for _ in 0..10 {
            assert!(limiter.check_endpoint_limit("/holidays", ip).await.is_ok());
        }
    }
}
