//! Postgres implementation of the domain storage ports.

use chrono::{DateTime, Utc};
use domain::errors::StoreError;
use domain::models::{Account, Device, DeviceRegistration, EventKey, NewUsageEvent, UsageEvent};
use domain::ports::{
    AccountStore, AtomicDeviceRegistration, DeviceStore, EventStore, ScoreRecalculator, StoreHealth,
};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::repositories::{AccountRepository, DeviceRepository, EventRepository, ProcedureRepository};

/// Maps sqlx errors onto the storage error taxonomy.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::UniqueViolation(db_err.message().to_string()),
            Some("23503") | Some("P0002") => StoreError::NotFound(db_err.message().to_string()),
            // undefined_function: the procedure migration has not been applied
            Some("42883") => StoreError::Unavailable(db_err.message().to_string()),
            _ => StoreError::Database(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

/// Every port backed by one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    events: EventRepository,
    devices: DeviceRepository,
    accounts: AccountRepository,
    procedures: ProcedureRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EventRepository::new(pool.clone()),
            devices: DeviceRepository::new(pool.clone()),
            accounts: AccountRepository::new(pool.clone()),
            procedures: ProcedureRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EventStore for PgStore {
    async fn find_existing_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>, StoreError> {
        let rows = self
            .events
            .find_existing_keys(keys)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(EventKey::from).collect())
    }

    async fn insert_events(&self, events: &[NewUsageEvent]) -> Result<u64, StoreError> {
        self.events.insert_batch(events).await.map_err(map_sqlx_error)
    }

    async fn events_for_account(
        &self,
        account_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        let rows = self
            .events
            .find_by_user(account_id, since)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn events_for_accounts(&self, account_ids: &[i64]) -> Result<Vec<UsageEvent>, StoreError> {
        let rows = self
            .events
            .find_by_users(account_ids)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_anomalous(
        &self,
        max_active_ms: i64,
        max_visits: i32,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        let rows = self
            .events
            .delete_anomalous(max_active_ms, max_visits)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait::async_trait]
impl DeviceStore for PgStore {
    async fn find_by_device_id(&self, device_id: Uuid) -> Result<Option<Device>, StoreError> {
        let row = self
            .devices
            .find_by_device_uuid(device_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn find_active_device(
        &self,
        account_id: i64,
        device_id: Uuid,
    ) -> Result<Option<Device>, StoreError> {
        let row = self
            .devices
            .find_active(account_id, device_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_for_account(&self, account_id: i64) -> Result<Vec<Device>, StoreError> {
        let rows = self
            .devices
            .find_by_user(account_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn deactivate_siblings(
        &self,
        account_id: i64,
        keep: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.devices
            .deactivate_others(account_id, keep, at)
            .await
            .map_err(map_sqlx_error)
    }

    async fn upsert_active(&self, registration: &DeviceRegistration) -> Result<Device, StoreError> {
        let row = self
            .devices
            .upsert_active(registration)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn deactivate(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<u64, StoreError> {
        self.devices
            .deactivate(device_id, at)
            .await
            .map_err(map_sqlx_error)
    }

    async fn purge(&self, device_id: Uuid) -> Result<u64, StoreError> {
        self.devices.delete(device_id).await.map_err(map_sqlx_error)
    }

    async fn is_purged(&self, device_id: Uuid) -> Result<bool, StoreError> {
        self.devices
            .is_purged(device_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn touch_last_sync(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.devices
            .touch_last_sync(device_id, at)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait::async_trait]
impl AccountStore for PgStore {
    async fn find_account(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let row = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn set_active_device(
        &self,
        account_id: i64,
        device_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = self
            .accounts
            .set_active_device(account_id, device_id, at)
            .await
            .map_err(map_sqlx_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("account {account_id}")));
        }
        Ok(())
    }

    async fn touch_last_sync(&self, account_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.accounts
            .touch_last_sync(account_id, at)
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_accounts(&self, limit: i64) -> Result<Vec<Account>, StoreError> {
        let rows = self.accounts.list(limit).await.map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_session_account(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        self.accounts
            .find_session_user(token, now)
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_account_data(&self, account_id: i64) -> Result<bool, StoreError> {
        self.accounts
            .delete_with_data(account_id)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait::async_trait]
impl ScoreRecalculator for PgStore {
    async fn recalculate(&self, account_id: i64) -> Result<(), StoreError> {
        let score = self
            .procedures
            .recalculate_user_score(account_id)
            .await
            .map_err(map_sqlx_error)?;
        tracing::debug!(account_id, score, "Recalculated cached score");
        Ok(())
    }
}

#[async_trait::async_trait]
impl AtomicDeviceRegistration for PgStore {
    async fn register_atomically(&self, registration: &DeviceRegistration) -> Result<(), StoreError> {
        let confirmed = self
            .procedures
            .register_user_device(registration)
            .await
            .map_err(map_sqlx_error)?;
        if !confirmed {
            return Err(StoreError::Database(
                "register_user_device returned false".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
