use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use quincho_domain::repository::RepoError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Transaction-scoped advisory lock on one calendar date. Reservation
/// inserts and block creation both take it before touching the date, so
/// neither can commit while blind to the other's uncommitted rows: whichever
/// transaction wins the lock commits first, and the loser then reads the
/// winner's committed state.
pub(crate) async fn lock_date(
    conn: &mut sqlx::PgConnection,
    fecha: chrono::NaiveDate,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(fecha.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

/// Map a sqlx error onto the repository taxonomy. SQLSTATE 23P01
/// (exclusion_violation) is the authoritative slot-conflict signal; it must
/// stay distinguishable from every other failure so callers can surface
/// "slot just taken" instead of a generic error.
pub fn map_db_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23P01") => RepoError::SlotTaken,
            _ => RepoError::Backend(e.to_string()),
        },
        _ => RepoError::Backend(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(map_db_err(sqlx::Error::RowNotFound), RepoError::NotFound));
    }

    #[test]
    fn test_non_database_error_maps_to_backend() {
        let err = map_db_err(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RepoError::Backend(_)));
    }
}
