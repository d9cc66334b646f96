use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::leave::{LeaveKind, LeaveStatus};

const CHANNEL_CAPACITY: usize = 256;

/// Something worth telling employees and reviewers about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeaveEvent {
    RequestCreated { id: Uuid, employee_id: Uuid, kind: LeaveKind },
    RequestStatusChanged { id: Uuid, employee_id: Uuid, kind: LeaveKind, from: LeaveStatus, to: LeaveStatus },
    RequestDeleted { id: Uuid, employee_id: Uuid },
    TripStatusChanged { id: Uuid, employee_id: Uuid, from: LeaveStatus, to: LeaveStatus, attendance_rows: u64 },
    SickLeaveRecorded { id: Uuid, employee_id: Uuid, attendance_rows: u64 },
    AttendanceRecorded { employee_id: Uuid, date: chrono::NaiveDate },
    BalanceRecalculated { employee_id: Uuid, year: i32 },
}

impl LeaveEvent {
    pub fn employee_id(&self) -> Uuid {
        match self {
            LeaveEvent::RequestCreated { employee_id, .. }
            | LeaveEvent::RequestStatusChanged { employee_id, .. }
            | LeaveEvent::RequestDeleted { employee_id, .. }
            | LeaveEvent::TripStatusChanged { employee_id, .. }
            | LeaveEvent::SickLeaveRecorded { employee_id, .. }
            | LeaveEvent::AttendanceRecorded { employee_id, .. }
            | LeaveEvent::BalanceRecalculated { employee_id, .. } => *employee_id,
        }
    }
}

/// Receives every domain event after its transaction committed.
///
/// A mailer or webhook sender is just another implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: LeaveEvent);
}

/// Logs events and fans them out to live subscribers (the `/events` stream).
pub struct BroadcastNotifier {
    sender: broadcast::Sender<LeaveEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self { sender: broadcast::channel(CHANNEL_CAPACITY).0 }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaveEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: LeaveEvent) {
        tracing::info!(employee_id = %event.employee_id(), ?event, "leave event");
        // No-op if nobody is listening.
        let _ = self.sender.send(event);
    }
}
