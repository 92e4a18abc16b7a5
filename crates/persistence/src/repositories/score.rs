//! Stored procedures for scores and device registration.

use domain::models::DeviceRegistration;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::metrics::QueryTimer;

/// Wraps `recalculate_user_score` and `register_user_device`.
#[derive(Clone)]
pub struct ProcedureRepository {
    pool: PgPool,
}

impl ProcedureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Refreshes the cached score and returns it.
    pub async fn recalculate_user_score(&self, user_id: i64) -> Result<f64, sqlx::Error> {
        let timer = QueryTimer::new("recalculate_user_score");

        let result: Result<(f64,), sqlx::Error> =
            sqlx::query_as("SELECT recalculate_user_score($1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await;

        timer.record();
        Ok(result?.0)
    }

    /// Runs the single-transaction registration. Returns the procedure's verdict.
    pub async fn register_user_device(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("register_user_device");

        let result: Result<(Option<bool>,), sqlx::Error> =
            sqlx::query_as("SELECT register_user_device($1, $2, $3, $4, $5)")
                .bind(registration.account_id)
                .bind(registration.device_id)
                .bind(&registration.display_name)
                .bind(Json(&registration.browser_info))
                .bind(registration.synced_at)
                .fetch_one(&self.pool)
                .await;

        timer.record();
        Ok(result?.0.unwrap_or(false))
    }
}
