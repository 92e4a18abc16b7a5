//! Sync orchestration.
//!
//! A batch is handled in a fixed order: optional registration, account
//! resolution, the device gate, validation and deduplication, last-sync
//! bookkeeping and finally a background score recalculation. Nothing is
//! persisted for a batch that fails the gates.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::DomainError;
use crate::models::{AccountStats, BrowserInfo, DeviceRegistration, NewUsageEvent, SyncRequest};
use crate::ports::Stores;
use crate::services::deduplicator::{self, ALL_FILTERED_MESSAGE};
use crate::services::device_registry::{DeviceRegistrar, RegistrationPath};
use crate::services::event_validator::EventValidator;
use crate::services::scoring;

pub const DEVICE_NOT_REGISTERED: &str = "Device not registered or inactive";
pub const DEVICE_NOT_ACTIVE_FOR_ACCOUNT: &str = "Device not active for this user";

/// Everything the caller needs to answer and instrument a sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub account_id: i64,
    pub processed: u64,
    pub errors: Vec<String>,
    pub rejected: Vec<&'static str>,
    pub duplicates_in_batch: usize,
    pub duplicates_in_store: usize,
    pub registration: Option<RegistrationPath>,
}

#[derive(Clone)]
pub struct SyncService {
    stores: Stores,
    registrar: Arc<dyn DeviceRegistrar>,
    validator: EventValidator,
}

impl SyncService {
    pub fn new(stores: Stores, registrar: Arc<dyn DeviceRegistrar>, validator: EventValidator) -> Self {
        Self {
            stores,
            registrar,
            validator,
        }
    }

    pub fn validator(&self) -> &EventValidator {
        &self.validator
    }

    /// Ingests one batch.
    pub async fn sync(
        &self,
        request: SyncRequest,
        browser_info: BrowserInfo,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, DomainError> {
        let device_id = request.device_id;
        let mut outcome = SyncOutcome::default();

        if let Some(account_id) = request.account_id {
            if self.stores.accounts.find_account(account_id).await?.is_none() {
                tracing::warn!(account_id, device_id = %device_id, "Sync for unknown account");
                return Err(DomainError::AccountNotFound(account_id));
            }

            let registration = DeviceRegistration::new(account_id, device_id, browser_info, now);
            let receipt = self.registrar.register(&registration).await?;
            outcome.registration = Some(receipt.path);
        }

        let account_id = match request.account_id {
            Some(account_id) => account_id,
            None => self.resolve_owner(device_id).await?,
        };
        outcome.account_id = account_id;

        if self
            .stores
            .devices
            .find_active_device(account_id, device_id)
            .await?
            .is_none()
        {
            tracing::warn!(account_id, device_id = %device_id, "Device not active for account");
            return Err(DomainError::Authorization(
                DEVICE_NOT_ACTIVE_FOR_ACCOUNT.to_string(),
            ));
        }

        if !request.events.is_empty() {
            self.ingest(account_id, device_id, request.events, now, &mut outcome)
                .await?;
        }

        self.record_sync(account_id, device_id, now).await;

        let scores = self.stores.scores.clone();
        tokio::spawn(async move {
            if let Err(err) = scores.recalculate(account_id).await {
                tracing::error!(account_id, error = %err, "Score recalculation failed");
            }
        });

        tracing::info!(
            account_id,
            device_id = %device_id,
            batch_id = %request.batch_id,
            processed = outcome.processed,
            rejected = outcome.rejected.len(),
            "Sync completed"
        );
        Ok(outcome)
    }

    async fn resolve_owner(&self, device_id: Uuid) -> Result<i64, DomainError> {
        match self.stores.devices.find_by_device_id(device_id).await? {
            Some(device) if device.is_active() => Ok(device.account_id),
            _ => {
                tracing::warn!(device_id = %device_id, "Sync from unregistered or inactive device");
                Err(DomainError::Authorization(DEVICE_NOT_REGISTERED.to_string()))
            }
        }
    }

    async fn ingest(
        &self,
        account_id: i64,
        device_id: Uuid,
        events: Vec<crate::models::RawEvent>,
        now: DateTime<Utc>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), DomainError> {
        let validated = self.validator.partition(events, now);
        outcome.rejected = validated.rejected.iter().map(|r| r.reason()).collect();
        outcome
            .errors
            .extend(validated.rejected.iter().map(ToString::to_string));

        let prepared: Vec<NewUsageEvent> = validated
            .accepted
            .iter()
            .filter_map(|raw| {
                NewUsageEvent::from_raw(raw, device_id, account_id, self.validator.max_active_ms)
            })
            .collect();

        if prepared.is_empty() {
            outcome.errors.push(ALL_FILTERED_MESSAGE.to_string());
            return Ok(());
        }

        let ingested = deduplicator::ingest(self.stores.events.as_ref(), prepared).await?;
        outcome.processed = ingested.processed;
        outcome.duplicates_in_batch = ingested.duplicates_in_batch;
        outcome.duplicates_in_store = ingested.duplicates_in_store;
        outcome.errors.extend(ingested.errors);
        Ok(())
    }

    async fn record_sync(&self, account_id: i64, device_id: Uuid, now: DateTime<Utc>) {
        if let Err(err) = self.stores.devices.touch_last_sync(device_id, now).await {
            tracing::error!(device_id = %device_id, error = %err, "Failed to update device last sync");
        }
        if let Err(err) = self.stores.accounts.touch_last_sync(account_id, now).await {
            tracing::error!(account_id, error = %err, "Failed to update account last sync");
        }
    }

    /// Statistics for a device that is active for the account.
    pub async fn stats(
        &self,
        account_id: i64,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AccountStats, DomainError> {
        if self
            .stores
            .devices
            .find_active_device(account_id, device_id)
            .await?
            .is_none()
        {
            return Err(DomainError::Authorization(DEVICE_NOT_REGISTERED.to_string()));
        }

        let events = self.stores.events.events_for_account(account_id, None).await?;
        Ok(scoring::account_stats(&events, now))
    }
}
