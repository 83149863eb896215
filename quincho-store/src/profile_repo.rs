use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;

/// Admin-ness lookup. This is a secondary check on the auth path: it runs
/// under a short timeout and fails open to "not admin" so a slow profiles
/// table can never block the main flow. The overlap constraint is the
/// opposite policy (fail closed); keep the two apart.
pub struct ProfileStore {
    pool: PgPool,
    lookup_timeout: Duration,
}

impl ProfileStore {
    pub fn new(pool: PgPool, lookup_timeout: Duration) -> Self {
        Self { pool, lookup_timeout }
    }

    pub async fn is_admin(&self, user_id: &str) -> bool {
        let query = sqlx::query_scalar::<_, bool>(
            "SELECT is_admin FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool);

        match tokio::time::timeout(self.lookup_timeout, query).await {
            Ok(Ok(Some(is_admin))) => is_admin,
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                warn!("Profile lookup failed for {}, treating as non-admin: {}", user_id, e);
                false
            }
            Err(_) => {
                warn!("Profile lookup timed out for {}, treating as non-admin", user_id);
                false
            }
        }
    }

    /// Test/bootstrap helper; the admin flag is otherwise managed out of band.
    pub async fn upsert(&self, user_id: &str, email: &str, is_admin: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO profiles (user_id, email, is_admin) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET email = $2, is_admin = $3",
        )
        .bind(user_id)
        .bind(email)
        .bind(is_admin)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
