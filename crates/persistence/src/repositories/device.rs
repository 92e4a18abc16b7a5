//! Device repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::DeviceRegistration;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::DeviceEntity;
use crate::metrics::QueryTimer;

/// Repository for user_devices.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_device_uuid(
        &self,
        device_uuid: Uuid,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_device_by_uuid");

        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, user_id, device_uuid, device_name, browser_info,
                   is_active, last_sync_at, deactivated_at, created_at
            FROM user_devices
            WHERE device_uuid = $1
            "#,
        )
        .bind(device_uuid)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// The device, only if active and owned by `user_id`.
    pub async fn find_active(
        &self,
        user_id: i64,
        device_uuid: Uuid,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_active_device");

        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, user_id, device_uuid, device_name, browser_info,
                   is_active, last_sync_at, deactivated_at, created_at
            FROM user_devices
            WHERE user_id = $1 AND device_uuid = $2 AND is_active = true
            "#,
        )
        .bind(user_id)
        .bind(device_uuid)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// All devices of a user, most recently synced first.
    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_devices_by_user");

        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, user_id, device_uuid, device_name, browser_info,
                   is_active, last_sync_at, deactivated_at, created_at
            FROM user_devices
            WHERE user_id = $1
            ORDER BY last_sync_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Deactivates every other active device of the user.
    pub async fn deactivate_others(
        &self,
        user_id: i64,
        keep: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("deactivate_sibling_devices");

        let result = sqlx::query(
            r#"
            UPDATE user_devices
            SET is_active = false, deactivated_at = $3
            WHERE user_id = $1 AND device_uuid <> $2 AND is_active = true
            "#,
        )
        .bind(user_id)
        .bind(keep)
        .bind(at)
        .execute(&self.pool)
        .await;

        timer.record();
        Ok(result?.rows_affected())
    }

    /// Inserts the device or updates it in place, marking it active.
    /// A device moving to another account is cleared from its previous owner.
    pub async fn upsert_active(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<DeviceEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_active_device");
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE users SET active_device_uuid = NULL WHERE active_device_uuid = $1 AND id <> $2",
        )
        .bind(registration.device_id)
        .bind(registration.account_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, DeviceEntity>(
            r#"
            INSERT INTO user_devices (user_id, device_uuid, device_name, browser_info, is_active, last_sync_at, deactivated_at)
            VALUES ($1, $2, $3, $4, true, $5, NULL)
            ON CONFLICT (device_uuid) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                device_name = EXCLUDED.device_name,
                browser_info = EXCLUDED.browser_info,
                is_active = true,
                last_sync_at = EXCLUDED.last_sync_at,
                deactivated_at = NULL
            RETURNING id, user_id, device_uuid, device_name, browser_info,
                      is_active, last_sync_at, deactivated_at, created_at
            "#,
        )
        .bind(registration.account_id)
        .bind(registration.device_id)
        .bind(&registration.display_name)
        .bind(Json(&registration.browser_info))
        .bind(registration.synced_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(row)
    }

    /// Returns the number of rows affected (0 if missing or already inactive).
    pub async fn deactivate(&self, device_uuid: Uuid, at: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("deactivate_device");

        let result = sqlx::query(
            r#"
            UPDATE user_devices
            SET is_active = false, deactivated_at = $2
            WHERE device_uuid = $1 AND is_active = true
            "#,
        )
        .bind(device_uuid)
        .bind(at)
        .execute(&self.pool)
        .await;

        timer.record();
        Ok(result?.rows_affected())
    }

    pub async fn delete(&self, device_uuid: Uuid) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_device");
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET active_device_uuid = NULL WHERE active_device_uuid = $1")
            .bind(device_uuid)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM user_devices WHERE device_uuid = $1")
            .bind(device_uuid)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() > 0 {
            sqlx::query(
                "INSERT INTO purged_devices (device_uuid) VALUES ($1) ON CONFLICT (device_uuid) DO NOTHING",
            )
            .bind(device_uuid)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn is_purged(&self, device_uuid: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("is_device_purged");

        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM purged_devices WHERE device_uuid = $1)",
        )
        .bind(device_uuid)
        .fetch_one(&self.pool)
        .await;

        timer.record();
        result
    }

    pub async fn touch_last_sync(&self, device_uuid: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("touch_device_last_sync");

        let result = sqlx::query("UPDATE user_devices SET last_sync_at = $2 WHERE device_uuid = $1")
            .bind(device_uuid)
            .bind(at)
            .execute(&self.pool)
            .await;

        timer.record();
        result.map(|_| ())
    }
}
