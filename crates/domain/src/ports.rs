//! Storage ports.
//!
//! The pipeline services only talk to storage through these traits. The
//! persistence crate implements them on Postgres; [`crate::memory`] implements
//! them in process for tests.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Account, Device, DeviceRegistration, EventKey, NewUsageEvent, UsageEvent};

/// Persisted usage events (`events_raw`).
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Returns the subset of `keys` that already exist in storage.
    async fn find_existing_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>, StoreError>;

    /// Inserts all events or none of them.
    ///
    /// A key collision fails the whole insert with [`StoreError::UniqueViolation`].
    async fn insert_events(&self, events: &[NewUsageEvent]) -> Result<u64, StoreError>;

    /// Events for one account, optionally only those at or after `since`.
    async fn events_for_account(
        &self,
        account_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, StoreError>;

    async fn events_for_accounts(&self, account_ids: &[i64]) -> Result<Vec<UsageEvent>, StoreError>;

    /// Deletes and returns events exceeding either threshold.
    async fn delete_anomalous(
        &self,
        max_active_ms: i64,
        max_visits: i32,
    ) -> Result<Vec<UsageEvent>, StoreError>;
}

/// Registered devices (`user_devices`).
#[async_trait::async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find_by_device_id(&self, device_id: Uuid) -> Result<Option<Device>, StoreError>;

    /// The device, only if it belongs to `account_id` and is active.
    async fn find_active_device(
        &self,
        account_id: i64,
        device_id: Uuid,
    ) -> Result<Option<Device>, StoreError>;

    /// All devices of an account, most recently synced first.
    async fn list_for_account(&self, account_id: i64) -> Result<Vec<Device>, StoreError>;

    /// Deactivates every active device of the account except `keep`.
    async fn deactivate_siblings(
        &self,
        account_id: i64,
        keep: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Inserts or updates the device and marks it active.
    async fn upsert_active(&self, registration: &DeviceRegistration) -> Result<Device, StoreError>;

    /// Returns the number of rows changed (0 when already inactive or missing).
    async fn deactivate(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Deletes the device and leaves a tombstone. Returns the number of rows deleted.
    async fn purge(&self, device_id: Uuid) -> Result<u64, StoreError>;

    /// True if the device was purged.
    async fn is_purged(&self, device_id: Uuid) -> Result<bool, StoreError>;

    async fn touch_last_sync(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Accounts and sessions (`users`, `user_sessions`).
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_account(&self, account_id: i64) -> Result<Option<Account>, StoreError>;

    async fn set_active_device(
        &self,
        account_id: i64,
        device_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn touch_last_sync(&self, account_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Accounts in id order, at most `limit`.
    async fn list_accounts(&self, limit: i64) -> Result<Vec<Account>, StoreError>;

    /// Account id of an unexpired session token.
    async fn find_session_account(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError>;

    /// Removes the account with its events, devices, cached scores and sessions.
    async fn delete_account_data(&self, account_id: i64) -> Result<bool, StoreError>;
}

/// Recomputes the denormalized score cache (`recalculate_user_score`).
#[async_trait::async_trait]
pub trait ScoreRecalculator: Send + Sync {
    async fn recalculate(&self, account_id: i64) -> Result<(), StoreError>;
}

/// Single-transaction device registration (`register_user_device`).
#[async_trait::async_trait]
pub trait AtomicDeviceRegistration: Send + Sync {
    /// Deactivates siblings, upserts the device as active and points the
    /// account at it, with no intermediate state observable.
    async fn register_atomically(&self, registration: &DeviceRegistration) -> Result<(), StoreError>;
}

/// Backend liveness.
#[async_trait::async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Every port of one backend, shared across requests.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub devices: Arc<dyn DeviceStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub scores: Arc<dyn ScoreRecalculator>,
    pub registration: Arc<dyn AtomicDeviceRegistration>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// Uses one backend for every port.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: EventStore
            + DeviceStore
            + AccountStore
            + ScoreRecalculator
            + AtomicDeviceRegistration
            + StoreHealth
            + 'static,
    {
        Self {
            events: backend.clone(),
            devices: backend.clone(),
            accounts: backend.clone(),
            scores: backend.clone(),
            registration: backend.clone(),
            health: backend,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
