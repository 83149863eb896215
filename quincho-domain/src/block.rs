use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::Slot;
use crate::{DomainError, DomainResult};

/// Administrative exclusion over a date. Absent times mean the whole day is
/// blocked. Unblocking deletes the row; there is no further lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedDate {
    pub id: Uuid,
    pub fecha: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub motivo: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Groups the entries created by one admin action.
    pub group_id: Uuid,
}

impl BlockedDate {
    pub fn covers(&self, slot: &Slot) -> bool {
        slot.intersects_range(self.start_time, self.end_time)
    }
}

/// One entry of a block request: a date with an optional sub-interval.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockEntry {
    pub fecha: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl BlockEntry {
    pub fn validate(&self) -> DomainResult<()> {
        match (self.start_time, self.end_time) {
            (None, None) => Ok(()),
            (Some(s), Some(e)) if e > s => Ok(()),
            (Some(_), Some(_)) => Err(DomainError::ValidationError(
                "end_time must be after start_time".into(),
            )),
            _ => Err(DomainError::ValidationError(
                "start_time and end_time must be given together".into(),
            )),
        }
    }
}

/// Admin note appended to every reservation cancelled by a block cascade.
pub fn cascade_note(motivo: &str) -> String {
    format!("Fechas bloqueadas por administración: {}", motivo)
}
