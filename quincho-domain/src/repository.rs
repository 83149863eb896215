use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::audit::CancellationAudit;
use crate::block::{BlockEntry, BlockedDate};
use crate::reservation::{NewReservation, Reservation};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The authoritative exclusion constraint rejected the write: the slot
    /// was taken by a concurrent or earlier reservation. Never auto-retried.
    #[error("Slot already taken")]
    SlotTaken,

    #[error("Not found")]
    NotFound,

    /// Guard for idempotent cancellation and pending-only decisions: the
    /// reservation already left the active set.
    #[error("Reservation is no longer active")]
    AlreadyClosed,

    #[error("Confirmation token expired")]
    TokenExpired,

    #[error("Confirmation token invalid")]
    TokenInvalid,

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Result of one admin block action: the rows created plus the
/// pre-cancellation snapshots of every reservation the cascade cancelled.
#[derive(Debug)]
pub struct BlockOutcome {
    pub blocks: Vec<BlockedDate>,
    pub cancelled: Vec<Reservation>,
}

/// Result of a soft cancellation: the row as it read before the flip (the
/// audit snapshot source) and the row as it reads afterwards (what callers
/// should show).
#[derive(Debug)]
pub struct CancelOutcome {
    pub snapshot: Reservation,
    pub cancelled: Reservation,
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert a pending, unconfirmed reservation with a fresh token.
    /// `RepoError::SlotTaken` when the exclusion constraint rejects it or
    /// the interval falls inside a blocked date.
    async fn create(
        &self,
        req: &NewReservation,
        created_by: Option<&str>,
    ) -> RepoResult<Reservation>;

    async fn find(&self, id: Uuid) -> RepoResult<Reservation>;

    async fn list_by_date(&self, fecha: NaiveDate, active_only: bool)
        -> RepoResult<Vec<Reservation>>;

    /// `pending -> approved`. `AlreadyClosed` otherwise.
    async fn approve(&self, id: Uuid, actor: &str, notes: Option<&str>)
        -> RepoResult<Reservation>;

    /// `pending -> rejected`. `AlreadyClosed` otherwise.
    async fn reject(&self, id: Uuid, actor: &str, notes: Option<&str>)
        -> RepoResult<Reservation>;

    /// Soft-cancel an active reservation. Snapshot and flip happen in one
    /// transaction, so the snapshot's status is exactly what the audit row
    /// must record. `AlreadyClosed` when the row already left the active
    /// set, so it is never double-audited.
    async fn cancel(
        &self,
        id: Uuid,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> RepoResult<CancelOutcome>;

    /// Single-use confirmation: flips the confirmed flag within the token
    /// window. `TokenExpired` and `TokenInvalid` are distinct outcomes.
    async fn confirm(&self, token: Uuid) -> RepoResult<Reservation>;

    /// Sweep: delete unconfirmed pending reservations whose token expired
    /// before `now`. Returns how many rows were removed.
    async fn delete_expired_unconfirmed(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait BlockedDateRepository: Send + Sync {
    /// Persist one admin block action (shared group_id) and run the cascade:
    /// every active reservation intersecting a blocked range is cancelled
    /// and audited in the same transaction, except rows created by the
    /// blocking admin itself.
    async fn create_group(
        &self,
        motivo: &str,
        entries: &[BlockEntry],
        admin: &str,
    ) -> RepoResult<BlockOutcome>;

    async fn list(&self, from: Option<NaiveDate>) -> RepoResult<Vec<BlockedDate>>;

    async fn delete(&self, id: Uuid) -> RepoResult<BlockedDate>;

    async fn delete_group(&self, group_id: Uuid) -> RepoResult<Vec<BlockedDate>>;
}

/// Append-only by construction: no update or delete methods exist.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(
        &self,
        snapshot: &Reservation,
        cancelled_by: Option<&str>,
        reason: Option<&str>,
    ) -> RepoResult<CancellationAudit>;

    async fn list_for_reservation(&self, reservation_id: Uuid)
        -> RepoResult<Vec<CancellationAudit>>;
}
