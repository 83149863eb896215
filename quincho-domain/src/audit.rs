use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reservation::ReservationStatus;

/// Append-only record of one cancellation event. `cancelled_by` is None for
/// system-triggered cancellations (block cascade). Rows are never updated or
/// deleted; no such operation exists anywhere in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationAudit {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub cancelled_by: Option<String>,
    pub reason: Option<String>,
    pub previous_status: ReservationStatus,
    /// Full copy of the reservation row at cancellation time.
    pub reservation_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
