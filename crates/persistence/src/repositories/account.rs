//! Account and session repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::AccountEntity;
use crate::metrics::QueryTimer;

/// Repository for users and user_sessions.
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<AccountEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_account_by_id");

        let result = sqlx::query_as::<_, AccountEntity>(
            r#"
            SELECT id, username, display_name, profile_image, subscription_tier,
                   active_device_uuid, last_extension_sync, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Accounts in id order.
    pub async fn list(&self, limit: i64) -> Result<Vec<AccountEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_accounts");

        let result = sqlx::query_as::<_, AccountEntity>(
            r#"
            SELECT id, username, display_name, profile_image, subscription_tier,
                   active_device_uuid, last_extension_sync, created_at
            FROM users
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Points the account at its active device. Returns rows affected.
    pub async fn set_active_device(
        &self,
        id: i64,
        device_uuid: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("set_active_device");

        let result = sqlx::query(
            r#"
            UPDATE users
            SET active_device_uuid = $2, last_extension_sync = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(device_uuid)
        .bind(at)
        .execute(&self.pool)
        .await;

        timer.record();
        Ok(result?.rows_affected())
    }

    pub async fn touch_last_sync(&self, id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("touch_account_last_sync");

        let result = sqlx::query("UPDATE users SET last_extension_sync = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await;

        timer.record();
        result.map(|_| ())
    }

    /// User id of an unexpired session.
    pub async fn find_session_user(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let timer = QueryTimer::new("find_session_user");

        let result: Result<Option<(i64,)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM user_sessions
            WHERE session_token = $1 AND expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        Ok(result?.map(|(user_id,)| user_id))
    }

    /// Deletes the user and everything it owns in one transaction.
    pub async fn delete_with_data(&self, id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_account_data");
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM events_raw WHERE user_id = $1",
            "DELETE FROM user_devices WHERE user_id = $1",
            "DELETE FROM user_scores WHERE user_id = $1",
            "DELETE FROM user_sessions WHERE user_id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        timer.record();
        Ok(deleted > 0)
    }
}
