//! Device registration and lifecycle.
//!
//! An account has at most one active device. Registration prefers the store's
//! single-transaction path and falls back to three sequential writes when that
//! path errors. The fallback is not race-free: two concurrent fallbacks for
//! the same account can each deactivate the other's device before upserting
//! their own, and the re-read afterwards only confirms the caller's device.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::DomainError;
use crate::models::{Device, DeviceRegistration, DeviceState};
use crate::ports::{AccountStore, AtomicDeviceRegistration, DeviceStore, Stores};

/// Lifecycle state as stored, `Purged` for tombstoned ids and `Unregistered`
/// for unknown ones.
async fn current_state(
    devices: &dyn DeviceStore,
    device_id: Uuid,
) -> Result<DeviceState, DomainError> {
    if let Some(device) = devices.find_by_device_id(device_id).await? {
        return Ok(device.state);
    }
    if devices.is_purged(device_id).await? {
        return Ok(DeviceState::Purged);
    }
    Ok(DeviceState::Unregistered)
}

/// Which write path completed a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPath {
    Atomic,
    Fallback,
}

impl RegistrationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationPath::Atomic => "atomic",
            RegistrationPath::Fallback => "fallback",
        }
    }
}

/// A confirmed registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationReceipt {
    pub device: Device,
    pub path: RegistrationPath,
}

/// Makes a device the single active device of its account.
#[async_trait::async_trait]
pub trait DeviceRegistrar: Send + Sync {
    /// Succeeds only once the device has been read back as active.
    async fn register(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationReceipt, DomainError>;
}

/// Atomic registration with a sequential fallback.
#[derive(Clone)]
pub struct AtomicOrFallbackRegistrar {
    atomic: Arc<dyn AtomicDeviceRegistration>,
    devices: Arc<dyn DeviceStore>,
    accounts: Arc<dyn AccountStore>,
}

impl AtomicOrFallbackRegistrar {
    pub fn new(stores: &Stores) -> Self {
        Self {
            atomic: stores.registration.clone(),
            devices: stores.devices.clone(),
            accounts: stores.accounts.clone(),
        }
    }

    async fn register_sequentially(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<(), DomainError> {
        let deactivated = self
            .devices
            .deactivate_siblings(
                registration.account_id,
                registration.device_id,
                registration.synced_at,
            )
            .await?;
        self.devices.upsert_active(registration).await?;
        self.accounts
            .set_active_device(
                registration.account_id,
                registration.device_id,
                registration.synced_at,
            )
            .await?;

        tracing::info!(
            account_id = registration.account_id,
            device_id = %registration.device_id,
            deactivated,
            "Registered device sequentially"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceRegistrar for AtomicOrFallbackRegistrar {
    async fn register(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationReceipt, DomainError> {
        let current = current_state(self.devices.as_ref(), registration.device_id).await?;
        if let Err(err) = current.register() {
            tracing::warn!(
                account_id = registration.account_id,
                device_id = %registration.device_id,
                "Refused to register a purged device"
            );
            return Err(err);
        }

        let path = match self.atomic.register_atomically(registration).await {
            Ok(()) => RegistrationPath::Atomic,
            Err(err) => {
                tracing::warn!(
                    account_id = registration.account_id,
                    device_id = %registration.device_id,
                    error = %err,
                    "Atomic device registration failed, falling back to sequential writes (not race-free)"
                );
                self.register_sequentially(registration).await?;
                RegistrationPath::Fallback
            }
        };

        let device = self
            .devices
            .find_active_device(registration.account_id, registration.device_id)
            .await?
            .ok_or(DomainError::RegistrationUnconfirmed(registration.device_id))?;

        tracing::info!(
            account_id = registration.account_id,
            device_id = %registration.device_id,
            path = path.as_str(),
            "Device registered"
        );
        Ok(RegistrationReceipt { device, path })
    }
}

/// Outcome of a removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deactivated,
    Purged,
}

/// Device reads and lifecycle operations.
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<dyn DeviceStore>,
}

impl DeviceRegistry {
    pub fn new(stores: &Stores) -> Self {
        Self {
            devices: stores.devices.clone(),
        }
    }

    /// True iff an active device with this id belongs to the account.
    pub async fn validate_device(&self, account_id: i64, device_id: Uuid) -> Result<bool, DomainError> {
        Ok(self
            .devices
            .find_active_device(account_id, device_id)
            .await?
            .is_some())
    }

    pub async fn find(&self, device_id: Uuid) -> Result<Option<Device>, DomainError> {
        Ok(self.devices.find_by_device_id(device_id).await?)
    }

    /// Lifecycle state, `Purged` for tombstoned ids and `Unregistered` for unknown ones.
    pub async fn state_of(&self, device_id: Uuid) -> Result<DeviceState, DomainError> {
        current_state(self.devices.as_ref(), device_id).await
    }

    pub async fn devices_for_account(&self, account_id: i64) -> Result<Vec<Device>, DomainError> {
        Ok(self.devices.list_for_account(account_id).await?)
    }

    /// Marks the device inactive. Already inactive or unknown devices are left as is.
    pub async fn deactivate(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
        let current = self.state_of(device_id).await?;
        if current.deactivate(at) == current {
            tracing::debug!(device_id = %device_id, ?current, "Device not active, nothing to deactivate");
            return Ok(());
        }

        let changed = self.devices.deactivate(device_id, at).await?;
        tracing::info!(device_id = %device_id, changed, "Device deactivated");
        Ok(())
    }

    /// Hard-deletes the device. A purged id can never be registered again.
    /// Unknown and already purged devices are ignored.
    pub async fn purge(&self, device_id: Uuid) -> Result<(), DomainError> {
        let current = self.state_of(device_id).await?;
        if current.purge() == current {
            tracing::debug!(device_id = %device_id, ?current, "Nothing to purge");
            return Ok(());
        }

        let deleted = self.devices.purge(device_id).await?;
        tracing::info!(device_id = %device_id, deleted, "Device purged");
        Ok(())
    }

    pub async fn remove(
        &self,
        device_id: Uuid,
        purge: bool,
        at: DateTime<Utc>,
    ) -> Result<Removal, DomainError> {
        if purge {
            self.purge(device_id).await?;
            Ok(Removal::Purged)
        } else {
            self.deactivate(device_id, at).await?;
            Ok(Removal::Deactivated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::BrowserInfo;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap()
    }

    fn registration(account_id: i64, device_id: Uuid) -> DeviceRegistration {
        DeviceRegistration::new(account_id, device_id, BrowserInfo::default(), now())
    }

    fn setup() -> (Arc<InMemoryStore>, Stores) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_account(1, Some("alice"));
        store.insert_account(2, Some("bob"));
        let stores = Stores::from_backend(store.clone());
        (store, stores)
    }

    #[tokio::test]
    async fn test_atomic_path() {
        let (store, stores) = setup();
        let registrar = AtomicOrFallbackRegistrar::new(&stores);
        let device_id = Uuid::new_v4();

        let receipt = registrar.register(&registration(1, device_id)).await.unwrap();
        assert_eq!(receipt.path, RegistrationPath::Atomic);
        assert!(receipt.device.is_active());
        assert_eq!(store.account(1).unwrap().active_device_id, Some(device_id));
    }

    #[tokio::test]
    async fn test_fallback_path_when_atomic_fails() {
        let (store, stores) = setup();
        store.disable_atomic_registration(true);
        let registrar = AtomicOrFallbackRegistrar::new(&stores);
        let device_id = Uuid::new_v4();

        let receipt = registrar.register(&registration(1, device_id)).await.unwrap();
        assert_eq!(receipt.path, RegistrationPath::Fallback);
        assert!(receipt.device.is_active());
        assert_eq!(store.account(1).unwrap().active_device_id, Some(device_id));
    }

    #[tokio::test]
    async fn test_single_active_device_on_both_paths() {
        for atomic_disabled in [false, true] {
            let (store, stores) = setup();
            store.disable_atomic_registration(atomic_disabled);
            let registrar = AtomicOrFallbackRegistrar::new(&stores);
            let registry = DeviceRegistry::new(&stores);

            let first = Uuid::new_v4();
            let second = Uuid::new_v4();
            registrar.register(&registration(1, first)).await.unwrap();
            registrar.register(&registration(1, second)).await.unwrap();

            let devices = registry.devices_for_account(1).await.unwrap();
            let active: Vec<_> = devices.iter().filter(|d| d.is_active()).collect();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].device_id, second);
            assert!(!registry.validate_device(1, first).await.unwrap());
            assert!(matches!(
                registry.state_of(first).await.unwrap(),
                DeviceState::Inactive { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_other_accounts_untouched() {
        let (_store, stores) = setup();
        let registrar = AtomicOrFallbackRegistrar::new(&stores);
        let registry = DeviceRegistry::new(&stores);

        let alice_device = Uuid::new_v4();
        let bob_device = Uuid::new_v4();
        registrar.register(&registration(1, alice_device)).await.unwrap();
        registrar.register(&registration(2, bob_device)).await.unwrap();

        assert!(registry.validate_device(1, alice_device).await.unwrap());
        assert!(registry.validate_device(2, bob_device).await.unwrap());
        assert!(!registry.validate_device(2, alice_device).await.unwrap());
    }

    #[tokio::test]
    async fn test_unconfirmed_registration() {
        let (store, stores) = setup();
        store.disable_atomic_registration(true);
        store.fail_device_writes(true);
        let registrar = AtomicOrFallbackRegistrar::new(&stores);

        let err = registrar
            .register(&registration(1, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
    }

    #[tokio::test]
    async fn test_deactivate_and_purge_idempotent() {
        let (_store, stores) = setup();
        let registrar = AtomicOrFallbackRegistrar::new(&stores);
        let registry = DeviceRegistry::new(&stores);
        let device_id = Uuid::new_v4();
        registrar.register(&registration(1, device_id)).await.unwrap();

        registry.deactivate(device_id, now()).await.unwrap();
        registry.deactivate(device_id, now()).await.unwrap();
        assert_eq!(
            registry.state_of(device_id).await.unwrap(),
            DeviceState::Inactive { since: now() }
        );

        assert_eq!(
            registry.remove(device_id, true, now()).await.unwrap(),
            Removal::Purged
        );
        registry.purge(device_id).await.unwrap();
        assert_eq!(registry.state_of(device_id).await.unwrap(), DeviceState::Purged);

        let unknown = Uuid::new_v4();
        registry.purge(unknown).await.unwrap();
        assert_eq!(registry.state_of(unknown).await.unwrap(), DeviceState::Unregistered);
    }

    #[tokio::test]
    async fn test_purged_device_cannot_register_again() {
        for atomic_disabled in [false, true] {
            let (store, stores) = setup();
            store.disable_atomic_registration(atomic_disabled);
            let registrar = AtomicOrFallbackRegistrar::new(&stores);
            let registry = DeviceRegistry::new(&stores);
            let device_id = Uuid::new_v4();

            registrar.register(&registration(1, device_id)).await.unwrap();
            registry.remove(device_id, true, now()).await.unwrap();

            let err = registrar
                .register(&registration(1, device_id))
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition(_)));
            assert!(store.device(device_id).is_none());
            assert_eq!(store.account(1).unwrap().active_device_id, None);
        }
    }

    #[tokio::test]
    async fn test_moving_device_clears_previous_owner_pointer() {
        for atomic_disabled in [false, true] {
            let (store, stores) = setup();
            store.disable_atomic_registration(atomic_disabled);
            let registrar = AtomicOrFallbackRegistrar::new(&stores);
            let device_id = Uuid::new_v4();

            registrar.register(&registration(1, device_id)).await.unwrap();
            registrar.register(&registration(2, device_id)).await.unwrap();

            assert_eq!(store.account(1).unwrap().active_device_id, None);
            assert_eq!(store.account(2).unwrap().active_device_id, Some(device_id));
            assert_eq!(store.device(device_id).unwrap().account_id, 2);
        }
    }

    #[tokio::test]
    async fn test_reregistration_reactivates() {
        let (_store, stores) = setup();
        let registrar = AtomicOrFallbackRegistrar::new(&stores);
        let registry = DeviceRegistry::new(&stores);
        let device_id = Uuid::new_v4();

        registrar.register(&registration(1, device_id)).await.unwrap();
        registry.deactivate(device_id, now()).await.unwrap();
        registrar.register(&registration(1, device_id)).await.unwrap();

        assert!(registry.validate_device(1, device_id).await.unwrap());
        assert_eq!(registry.devices_for_account(1).await.unwrap().len(), 1);
    }
}
