use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use quincho_domain::repository::{CancelOutcome, RepoError, RepoResult, ReservationRepository};
use quincho_domain::reservation::{NewReservation, Reservation, ReservationStatus};

use crate::database::{lock_date, map_db_err};

pub struct ReservationStore {
    pool: PgPool,
}

impl ReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) const RESERVATION_COLUMNS: &str = "id, responsable, email, motivo, fecha, inicio, fin, \
     personas, affiliation, status, admin_notes, confirmed, confirmation_token, \
     token_expires_at, created_by, created_at, updated_at, updated_by";

#[derive(sqlx::FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    responsable: String,
    email: String,
    motivo: String,
    fecha: NaiveDate,
    inicio: NaiveTime,
    fin: NaiveTime,
    personas: i32,
    affiliation: Option<String>,
    status: String,
    admin_notes: Option<String>,
    confirmed: bool,
    confirmation_token: Option<Uuid>,
    token_expires_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    updated_by: Option<String>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = RepoError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = ReservationStatus::from_str(&row.status)
            .map_err(|e| RepoError::Backend(e.to_string()))?;
        Ok(Reservation {
            id: row.id,
            responsable: row.responsable,
            email: row.email,
            motivo: row.motivo,
            fecha: row.fecha,
            inicio: row.inicio,
            fin: row.fin,
            personas: row.personas,
            affiliation: row.affiliation,
            status,
            admin_notes: row.admin_notes,
            confirmed: row.confirmed,
            confirmation_token: row.confirmation_token,
            token_expires_at: row.token_expires_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        })
    }
}

pub(crate) fn rows_to_reservations(rows: Vec<ReservationRow>) -> RepoResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}

#[async_trait]
impl ReservationRepository for ReservationStore {
    async fn create(
        &self,
        req: &NewReservation,
        created_by: Option<&str>,
    ) -> RepoResult<Reservation> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let token = Uuid::new_v4();
        let expires = NewReservation::token_expiry(now);

        // Serialize against block creation on this date, then check the
        // blocked ranges inside the same transaction. The advisory lock
        // guarantees every committed block row is visible here, so a blocked
        // interval loses authoritatively, not just in the handler pre-check.
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        lock_date(&mut tx, req.fecha).await.map_err(map_db_err)?;

        let blocked: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM blocked_dates \
             WHERE fecha = $1 \
               AND (start_time IS NULL OR (start_time < $3 AND end_time > $2)) \
             LIMIT 1",
        )
        .bind(req.fecha)
        .bind(req.inicio)
        .bind(req.fin)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if blocked.is_some() {
            return Err(RepoError::SlotTaken);
        }

        // The insert itself is the authoritative overlap check: a concurrent
        // competitor for the same interval loses here with 23P01, which
        // map_db_err turns into SlotTaken.
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "INSERT INTO reservations \
             (id, responsable, email, motivo, fecha, inicio, fin, personas, \
              affiliation, status, confirmed, confirmation_token, token_expires_at, \
              created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', FALSE, $10, $11, $12, $13, $13) \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.responsable)
        .bind(&req.email)
        .bind(&req.motivo)
        .bind(req.fecha)
        .bind(req.inicio)
        .bind(req.fin)
        .bind(req.personas)
        .bind(&req.affiliation)
        .bind(token)
        .bind(expires)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;

        info!("Reservation created: {} on {} {}-{}", id, req.fecha, req.inicio, req.fin);
        row.try_into()
    }

    async fn find(&self, id: Uuid) -> RepoResult<Reservation> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or(RepoError::NotFound)?;

        row.try_into()
    }

    async fn list_by_date(
        &self,
        fecha: NaiveDate,
        active_only: bool,
    ) -> RepoResult<Vec<Reservation>> {
        let rows = if active_only {
            sqlx::query_as::<_, ReservationRow>(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE fecha = $1 AND status NOT IN ('cancelled', 'rejected') \
                 ORDER BY inicio ASC"
            ))
            .bind(fecha)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, ReservationRow>(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE fecha = $1 ORDER BY inicio ASC"
            ))
            .bind(fecha)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(map_db_err)?;

        rows_to_reservations(rows)
    }

    async fn approve(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> RepoResult<Reservation> {
        self.decide(id, ReservationStatus::Approved, actor, notes).await
    }

    async fn reject(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> RepoResult<Reservation> {
        self.decide(id, ReservationStatus::Rejected, actor, notes).await
    }

    async fn cancel(
        &self,
        id: Uuid,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> RepoResult<CancelOutcome> {
        // Snapshot and flip share a transaction with the row locked, so the
        // snapshot's status cannot go stale under a concurrent transition
        // and an already-closed row is a no-op (never double-audited).
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?
        .ok_or(RepoError::NotFound)?;

        let snapshot: Reservation = row.try_into()?;
        if !snapshot.is_active() {
            return Err(RepoError::AlreadyClosed);
        }

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations \
             SET status = 'cancelled', \
                 admin_notes = TRIM(BOTH E'\\n' FROM CONCAT(COALESCE(admin_notes, ''), E'\\n', $2)), \
                 updated_at = NOW(), updated_by = $3 \
             WHERE id = $1 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(reason.unwrap_or(""))
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;
        let cancelled: Reservation = row.try_into()?;

        tx.commit().await.map_err(map_db_err)?;

        info!("Reservation cancelled: {} (was {})", id, snapshot.status);
        Ok(CancelOutcome { snapshot, cancelled })
    }

    async fn confirm(&self, token: Uuid) -> RepoResult<Reservation> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations \
             SET confirmed = TRUE, confirmation_token = NULL, updated_at = NOW() \
             WHERE confirmation_token = $1 AND token_expires_at > $2 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        if let Some(row) = row {
            return row.try_into();
        }

        // Distinguish an outdated token from one we never issued (or one
        // already consumed, which reads the same to the caller).
        let expired: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM reservations WHERE confirmation_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;

        match expired {
            Some(_) => Err(RepoError::TokenExpired),
            None => Err(RepoError::TokenInvalid),
        }
    }

    async fn delete_expired_unconfirmed(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let rows: Vec<(Uuid, NaiveDate)> = sqlx::query_as(
            "DELETE FROM reservations \
             WHERE confirmed = FALSE AND status = 'pending' AND token_expires_at < $1 \
             RETURNING id, fecha",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        for (id, fecha) in &rows {
            info!("Deleted expired unconfirmed reservation {} on {}", id, fecha);
        }

        Ok(rows.len() as u64)
    }
}

impl ReservationStore {
    /// Shared pending-only transition for approve/reject.
    async fn decide(
        &self,
        id: Uuid,
        status: ReservationStatus,
        actor: &str,
        notes: Option<&str>,
    ) -> RepoResult<Reservation> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations \
             SET status = $2, admin_notes = COALESCE($3, admin_notes), \
                 updated_at = NOW(), updated_by = $4 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(notes)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        match row {
            Some(row) => {
                info!("Reservation {}: pending -> {}", id, status);
                row.try_into()
            }
            None => {
                // Either the row does not exist or it already left pending.
                self.find(id).await?;
                Err(RepoError::AlreadyClosed)
            }
        }
    }
}
