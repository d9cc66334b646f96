use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters for monitoring the leave workflow
#[derive(Clone)]
pub struct Metrics {
    pub requests_created: Arc<AtomicUsize>,
    pub requests_approved: Arc<AtomicUsize>,
    pub requests_rejected: Arc<AtomicUsize>,
    pub critical_conflicts: Arc<AtomicUsize>,
    pub balance_adjustments: Arc<AtomicUsize>,
    pub recalculations: Arc<AtomicUsize>,
    pub trips_approved: Arc<AtomicUsize>,
    pub sick_leaves_recorded: Arc<AtomicUsize>,
    pub attendance_upserts: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_created: Arc::new(AtomicUsize::new(0)),
            requests_approved: Arc::new(AtomicUsize::new(0)),
            requests_rejected: Arc::new(AtomicUsize::new(0)),
            critical_conflicts: Arc::new(AtomicUsize::new(0)),
            balance_adjustments: Arc::new(AtomicUsize::new(0)),
            recalculations: Arc::new(AtomicUsize::new(0)),
            trips_approved: Arc::new(AtomicUsize::new(0)),
            sick_leaves_recorded: Arc::new(AtomicUsize::new(0)),
            attendance_upserts: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_requests_created(&self) {
        self.requests_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_approved(&self) {
        self.requests_approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_critical_conflicts(&self, count: usize) {
        self.critical_conflicts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_balance_adjustments(&self, count: usize) {
        self.balance_adjustments.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_recalculations(&self) {
        self.recalculations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_trips_approved(&self) {
        self.trips_approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sick_leaves_recorded(&self) {
        self.sick_leaves_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_attendance_upserts(&self) {
        self.attendance_upserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_created: self.requests_created.load(Ordering::Relaxed),
            requests_approved: self.requests_approved.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            critical_conflicts: self.critical_conflicts.load(Ordering::Relaxed),
            balance_adjustments: self.balance_adjustments.load(Ordering::Relaxed),
            recalculations: self.recalculations.load(Ordering::Relaxed),
            trips_approved: self.trips_approved.load(Ordering::Relaxed),
            sick_leaves_recorded: self.sick_leaves_recorded.load(Ordering::Relaxed),
            attendance_upserts: self.attendance_upserts.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub requests_created: usize,
    pub requests_approved: usize,
    pub requests_rejected: usize,
    pub critical_conflicts: usize,
    pub balance_adjustments: usize,
    pub recalculations: usize,
    pub trips_approved: usize,
    pub sick_leaves_recorded: usize,
    pub attendance_upserts: usize,
    pub uptime_seconds: u64,
}
