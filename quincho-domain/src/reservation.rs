use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::interval::Slot;
use crate::{DomainError, DomainResult};

/// How long an unconfirmed reservation holds its slot before the sweep
/// may delete it.
pub const CONFIRMATION_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ReservationStatus {
    /// Active statuses count toward the no-overlap constraint.
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled | ReservationStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "approved" => Ok(ReservationStatus::Approved),
            "rejected" => Ok(ReservationStatus::Rejected),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub responsable: String,
    pub email: String,
    pub motivo: String,
    pub fecha: NaiveDate,
    pub inicio: NaiveTime,
    pub fin: NaiveTime,
    pub personas: i32,
    pub affiliation: Option<String>,
    pub status: ReservationStatus,
    pub admin_notes: Option<String>,
    pub confirmed: bool,
    pub confirmation_token: Option<Uuid>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl Reservation {
    pub fn slot(&self) -> Slot {
        Slot::new(self.inicio, self.fin)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether admin approval/rejection is still possible.
    pub fn is_decidable(&self) -> bool {
        self.status == ReservationStatus::Pending
    }
}

/// Payload for creating a reservation, before ids and tokens are assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
    pub responsable: String,
    pub email: String,
    pub motivo: String,
    pub fecha: NaiveDate,
    pub inicio: NaiveTime,
    pub fin: NaiveTime,
    pub personas: i32,
    pub affiliation: Option<String>,
}

impl NewReservation {
    /// Field-level validation; failures here never reach the database.
    pub fn validate(&self) -> DomainResult<()> {
        if self.responsable.trim().is_empty() {
            return Err(DomainError::ValidationError("responsable is required".into()));
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(DomainError::ValidationError("a valid email is required".into()));
        }
        if self.motivo.trim().is_empty() {
            return Err(DomainError::ValidationError("motivo is required".into()));
        }
        if self.personas < 1 {
            return Err(DomainError::ValidationError("personas must be positive".into()));
        }
        if !Slot::new(self.inicio, self.fin).is_valid() {
            return Err(DomainError::ValidationError("fin must be after inicio".into()));
        }
        Ok(())
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.inicio, self.fin)
    }

    /// Expiry for a confirmation token issued at `now`.
    pub fn token_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(CONFIRMATION_WINDOW_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> NewReservation {
        NewReservation {
            responsable: "Ana Pérez".to_string(),
            email: "ana@example.com".to_string(),
            motivo: "Cumpleaños".to_string(),
            fecha: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            inicio: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            fin: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            personas: 8,
            affiliation: None,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut req = valid_request();
        req.responsable = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bad_email_rejected() {
        let mut req = valid_request();
        req.email = "not-an-email".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_inverted_interval_rejected() {
        let mut req = valid_request();
        req.fin = req.inicio;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_zero_personas_rejected() {
        let mut req = valid_request();
        req.personas = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_roundtrip() {
        for s in ["pending", "approved", "rejected", "cancelled"] {
            assert_eq!(ReservationStatus::from_str(s).unwrap().as_str(), s);
        }
        assert!(ReservationStatus::from_str("deleted").is_err());
    }

    #[test]
    fn test_active_statuses() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Approved.is_active());
        assert!(!ReservationStatus::Rejected.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
    }

    #[test]
    fn test_token_expiry_is_24h() {
        let now = Utc::now();
        assert_eq!(NewReservation::token_expiry(now) - now, Duration::hours(24));
    }
}
