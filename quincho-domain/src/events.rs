use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broadcast over the SSE stream after every reservation or blocked-date
/// mutation so clients can refresh the affected day.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub action: ChangeAction,
    pub id: Uuid,
    pub fecha: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Reservations,
    BlockedDates,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Cancelled,
    Deleted,
}
