use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use quincho_domain::audit::CancellationAudit;
use quincho_domain::repository::{AuditRepository, RepoError, RepoResult};
use quincho_domain::reservation::{Reservation, ReservationStatus};

use crate::database::map_db_err;

pub struct AuditStore {
    pool: PgPool,
}

impl AuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    reservation_id: Uuid,
    cancelled_by: Option<String>,
    reason: Option<String>,
    previous_status: String,
    reservation_snapshot: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for CancellationAudit {
    type Error = RepoError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let previous_status = ReservationStatus::from_str(&row.previous_status)
            .map_err(|e| RepoError::Backend(e.to_string()))?;
        Ok(CancellationAudit {
            id: row.id,
            reservation_id: row.reservation_id,
            cancelled_by: row.cancelled_by,
            reason: row.reason,
            previous_status,
            reservation_snapshot: row.reservation_snapshot,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AuditRepository for AuditStore {
    async fn append(
        &self,
        snapshot: &Reservation,
        cancelled_by: Option<&str>,
        reason: Option<&str>,
    ) -> RepoResult<CancellationAudit> {
        let snapshot_json =
            serde_json::to_value(snapshot).map_err(|e| RepoError::Backend(e.to_string()))?;

        let row = sqlx::query_as::<_, AuditRow>(
            "INSERT INTO cancellation_audits \
             (id, reservation_id, cancelled_by, reason, previous_status, reservation_snapshot) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, reservation_id, cancelled_by, reason, previous_status, \
                       reservation_snapshot, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.id)
        .bind(cancelled_by)
        .bind(reason)
        .bind(snapshot.status.as_str())
        .bind(snapshot_json)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        row.try_into()
    }

    async fn list_for_reservation(
        &self,
        reservation_id: Uuid,
    ) -> RepoResult<Vec<CancellationAudit>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, reservation_id, cancelled_by, reason, previous_status, \
                    reservation_snapshot, created_at \
             FROM cancellation_audits WHERE reservation_id = $1 \
             ORDER BY created_at ASC",
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.into_iter().map(CancellationAudit::try_from).collect()
    }
}
