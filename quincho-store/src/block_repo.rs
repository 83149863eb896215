use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use quincho_domain::block::{cascade_note, BlockEntry, BlockedDate};
use quincho_domain::repository::{
    BlockOutcome, BlockedDateRepository, RepoError, RepoResult,
};
use quincho_domain::reservation::Reservation;

use crate::database::{lock_date, map_db_err};
use crate::reservation_repo::{rows_to_reservations, ReservationRow, RESERVATION_COLUMNS};

pub struct BlockedDateStore {
    pool: PgPool,
}

impl BlockedDateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BlockedDateRow {
    id: Uuid,
    fecha: NaiveDate,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    motivo: String,
    created_by: String,
    created_at: DateTime<Utc>,
    group_id: Uuid,
}

impl From<BlockedDateRow> for BlockedDate {
    fn from(row: BlockedDateRow) -> Self {
        BlockedDate {
            id: row.id,
            fecha: row.fecha,
            start_time: row.start_time,
            end_time: row.end_time,
            motivo: row.motivo,
            created_by: row.created_by,
            created_at: row.created_at,
            group_id: row.group_id,
        }
    }
}

const BLOCK_COLUMNS: &str =
    "id, fecha, start_time, end_time, motivo, created_by, created_at, group_id";

#[async_trait]
impl BlockedDateRepository for BlockedDateStore {
    async fn create_group(
        &self,
        motivo: &str,
        entries: &[BlockEntry],
        admin: &str,
    ) -> RepoResult<BlockOutcome> {
        let group_id = Uuid::new_v4();
        let note = cascade_note(motivo);

        // One transaction covers the whole admin action: the block rows and
        // every cascaded cancellation (with its audit row) commit together,
        // so N cancellations always mean exactly N audit rows.
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // Same per-date lock reservation inserts take. Holding it up front
        // (in sorted order, so concurrent groups cannot deadlock) means the
        // cascade's SELECT sees every reservation that could still commit on
        // these dates, and later inserts see the committed block rows.
        let mut dates: Vec<NaiveDate> = entries.iter().map(|e| e.fecha).collect();
        dates.sort_unstable();
        dates.dedup();
        for fecha in dates {
            lock_date(&mut tx, fecha).await.map_err(map_db_err)?;
        }

        let mut blocks: Vec<BlockedDate> = Vec::with_capacity(entries.len());
        let mut cancelled: Vec<Reservation> = Vec::new();

        for entry in entries {
            let row = sqlx::query_as::<_, BlockedDateRow>(&format!(
                "INSERT INTO blocked_dates \
                 (id, fecha, start_time, end_time, motivo, created_by, group_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {BLOCK_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(entry.fecha)
            .bind(entry.start_time)
            .bind(entry.end_time)
            .bind(motivo)
            .bind(admin)
            .bind(group_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;

            // Active reservations caught by this entry, locked for the
            // cascade. The blocking admin's own rows are its placeholder
            // bookings and are left alone. A NULL sub-interval blocks the
            // whole day.
            let affected = sqlx::query_as::<_, ReservationRow>(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE fecha = $1 \
                   AND status NOT IN ('cancelled', 'rejected') \
                   AND created_by IS DISTINCT FROM $2 \
                   AND ($3::time IS NULL OR (inicio < $4 AND fin > $3)) \
                 FOR UPDATE"
            ))
            .bind(entry.fecha)
            .bind(admin)
            .bind(entry.start_time)
            .bind(entry.end_time)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_db_err)?;

            for snapshot in rows_to_reservations(affected)? {
                sqlx::query(
                    "UPDATE reservations \
                     SET status = 'cancelled', \
                         admin_notes = TRIM(BOTH E'\\n' FROM CONCAT(COALESCE(admin_notes, ''), E'\\n', $2)), \
                         updated_at = NOW(), updated_by = NULL \
                     WHERE id = $1",
                )
                .bind(snapshot.id)
                .bind(&note)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;

                let snapshot_json = serde_json::to_value(&snapshot)
                    .map_err(|e| RepoError::Backend(e.to_string()))?;

                // System cancellation: cancelled_by stays NULL.
                sqlx::query(
                    "INSERT INTO cancellation_audits \
                     (id, reservation_id, cancelled_by, reason, previous_status, reservation_snapshot) \
                     VALUES ($1, $2, NULL, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(snapshot.id)
                .bind(motivo)
                .bind(snapshot.status.as_str())
                .bind(snapshot_json)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;

                cancelled.push(snapshot);
            }

            blocks.push(row.into());
        }

        tx.commit().await.map_err(map_db_err)?;

        info!(
            "Block group {} created: {} entries, {} reservations cancelled",
            group_id,
            blocks.len(),
            cancelled.len()
        );

        Ok(BlockOutcome { blocks, cancelled })
    }

    async fn list(&self, from: Option<NaiveDate>) -> RepoResult<Vec<BlockedDate>> {
        let rows = sqlx::query_as::<_, BlockedDateRow>(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocked_dates \
             WHERE $1::date IS NULL OR fecha >= $1 \
             ORDER BY fecha ASC, start_time ASC NULLS FIRST"
        ))
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(BlockedDate::from).collect())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<BlockedDate> {
        let row = sqlx::query_as::<_, BlockedDateRow>(&format!(
            "DELETE FROM blocked_dates WHERE id = $1 RETURNING {BLOCK_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or(RepoError::NotFound)?;

        info!("Blocked date removed: {} ({})", id, row.fecha);
        Ok(row.into())
    }

    async fn delete_group(&self, group_id: Uuid) -> RepoResult<Vec<BlockedDate>> {
        let rows = sqlx::query_as::<_, BlockedDateRow>(&format!(
            "DELETE FROM blocked_dates WHERE group_id = $1 RETURNING {BLOCK_COLUMNS}"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        if rows.is_empty() {
            return Err(RepoError::NotFound);
        }

        info!("Block group removed: {} ({} entries)", group_id, rows.len());
        Ok(rows.into_iter().map(BlockedDate::from).collect())
    }
}
