use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::leave::LeaveService;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::notify::BroadcastNotifier;

/// The shared application state.
///
/// Cloned into every handler; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Workflow counters exposed on `/metrics`.
    pub metrics: Metrics,
    /// The per-endpoint rate limiter.
    pub rate_limiter: EndpointRateLimiter,
    /// Leave, trip, sick-leave and attendance operations.
    pub leave: LeaveService,
    /// Source of the `/events` stream.
    pub events: Arc<BroadcastNotifier>,
    /// Cancelled on shutdown to stop background tasks.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires the service layer and rate limits around a ready database pool.
    ///
    /// Default endpoint limits:
    ///   - 120 leave-request writes per minute
    ///   - 600 conflict checks per minute
    ///   - 10 balance recalculations per minute
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/leave-requests", 120, 60),
            ("/conflicts/check", 600, 60),
            ("/balances/recalculate", 10, 60),
        ]);

        let metrics = Metrics::new();
        let events = Arc::new(BroadcastNotifier::new());
        let leave = LeaveService::new(
            db.clone(),
            config.leave_policy.clone(),
            config.work_schedule.clone(),
            events.clone(),
            metrics.clone(),
        );

        Self {
            db,
            config: Arc::new(config),
            metrics,
            rate_limiter,
            leave,
            events,
            shutdown: CancellationToken::new(),
        }
    }
}
