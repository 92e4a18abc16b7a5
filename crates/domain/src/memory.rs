//! In-process implementation of every storage port.
//!
//! Used by the service and API tests, and by local runs without a database.
//! Failure toggles let tests drive the error paths of the pipeline.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{
    Account, Device, DeviceRegistration, DeviceState, EventKey, NewUsageEvent, UsageEvent,
};
use crate::ports::{
    AccountStore, AtomicDeviceRegistration, DeviceStore, EventStore, ScoreRecalculator,
    StoreHealth,
};

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<i64, Account>,
    devices: HashMap<Uuid, Device>,
    purged: HashSet<Uuid>,
    events: Vec<UsageEvent>,
    sessions: HashMap<String, (i64, DateTime<Utc>)>,
    recalculations: HashMap<i64, u32>,
    next_event_id: i64,
    next_device_id: i64,
}

impl State {
    fn deactivate_siblings(&mut self, account_id: i64, keep: Uuid, at: DateTime<Utc>) -> u64 {
        let mut changed = 0;
        for device in self.devices.values_mut() {
            if device.account_id == account_id && device.device_id != keep && device.is_active() {
                device.state = device.state.deactivate(at);
                changed += 1;
            }
        }
        changed
    }

    fn upsert_active(&mut self, registration: &DeviceRegistration) -> Result<Device, StoreError> {
        if self.purged.contains(&registration.device_id) {
            return Err(StoreError::Database(format!(
                "device {} was purged",
                registration.device_id
            )));
        }

        let next_id = self.next_device_id + 1;
        let device = self
            .devices
            .entry(registration.device_id)
            .or_insert_with(|| Device {
                id: next_id,
                device_id: registration.device_id,
                account_id: registration.account_id,
                display_name: registration.display_name.clone(),
                browser_info: None,
                state: DeviceState::Unregistered,
                last_sync_at: None,
                created_at: registration.synced_at,
            });
        if device.id == next_id {
            self.next_device_id = next_id;
        }

        let previous_owner = device.account_id;
        device.account_id = registration.account_id;
        device.display_name = registration.display_name.clone();
        device.browser_info = Some(registration.browser_info.clone());
        device.state = device
            .state
            .register()
            .map_err(|err| StoreError::Database(err.to_string()))?;
        device.last_sync_at = Some(registration.synced_at);
        let device = device.clone();

        if previous_owner != registration.account_id {
            if let Some(account) = self.accounts.get_mut(&previous_owner) {
                if account.active_device_id == Some(registration.device_id) {
                    account.active_device_id = None;
                }
            }
        }
        Ok(device)
    }

    fn set_active_device(
        &mut self,
        account_id: i64,
        device_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {account_id}")))?;
        account.active_device_id = Some(device_id);
        account.last_sync_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    atomic_registration_disabled: AtomicBool,
    device_writes_fail: AtomicBool,
    device_upserts_ignored: AtomicBool,
    recalculation_fails: AtomicBool,
    existing_keys_hidden: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_device_writes(&self) -> Result<(), StoreError> {
        if self.device_writes_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated device write failure".to_string()));
        }
        Ok(())
    }

    /// Adds an account with default profile fields.
    pub fn insert_account(&self, id: i64, username: Option<&str>) {
        self.upsert_account(Account {
            id,
            username: username.map(str::to_string),
            display_name: None,
            profile_image: None,
            subscription_tier: None,
            active_device_id: None,
            last_sync_at: None,
            created_at: Utc::now(),
        });
    }

    pub fn upsert_account(&self, account: Account) {
        self.state().accounts.insert(account.id, account);
    }

    pub fn insert_session(&self, token: &str, account_id: i64, expires_at: DateTime<Utc>) {
        self.state()
            .sessions
            .insert(token.to_string(), (account_id, expires_at));
    }

    /// Stores events without validation or deduplication.
    pub fn seed_events(&self, events: Vec<NewUsageEvent>) {
        let mut state = self.state();
        for event in events {
            state.next_event_id += 1;
            let id = state.next_event_id;
            state.events.push(stored(id, event));
        }
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.state().accounts.get(&id).cloned()
    }

    pub fn device(&self, device_id: Uuid) -> Option<Device> {
        self.state().devices.get(&device_id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.state().events.len()
    }

    pub fn recalculations(&self, account_id: i64) -> u32 {
        self.state()
            .recalculations
            .get(&account_id)
            .copied()
            .unwrap_or(0)
    }

    /// Recalculation count after background recalculations have had a chance to run.
    pub async fn settled_recalculations(&self, account_id: i64) -> u32 {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        self.recalculations(account_id)
    }

    pub fn disable_atomic_registration(&self, disabled: bool) {
        self.atomic_registration_disabled
            .store(disabled, Ordering::SeqCst);
    }

    pub fn fail_device_writes(&self, fail: bool) {
        self.device_writes_fail.store(fail, Ordering::SeqCst);
    }

    /// Device upserts report success but write nothing.
    pub fn ignore_device_upserts(&self, ignore: bool) {
        self.device_upserts_ignored.store(ignore, Ordering::SeqCst);
    }

    pub fn fail_recalculation(&self, fail: bool) {
        self.recalculation_fails.store(fail, Ordering::SeqCst);
    }

    /// Existing-key lookups return nothing, as if a concurrent writer had not committed yet.
    pub fn hide_existing_keys(&self, hidden: bool) {
        self.existing_keys_hidden.store(hidden, Ordering::SeqCst);
    }
}

fn stored(id: i64, event: NewUsageEvent) -> UsageEvent {
    UsageEvent {
        id,
        device_id: Some(event.device_id),
        account_id: event.account_id,
        occurred_at: event.occurred_at,
        domain: event.domain,
        active_ms: event.active_ms,
        total_ms: event.total_ms,
        visits: event.visits,
        client_version: Some(event.client_version),
        created_at: Utc::now(),
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryStore {
    async fn find_existing_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>, StoreError> {
        if self.existing_keys_hidden.load(Ordering::SeqCst) {
            return Ok(HashSet::new());
        }
        let wanted: HashSet<&EventKey> = keys.iter().collect();
        Ok(self
            .state()
            .events
            .iter()
            .map(UsageEvent::key)
            .filter(|key| wanted.contains(key))
            .collect())
    }

    async fn insert_events(&self, events: &[NewUsageEvent]) -> Result<u64, StoreError> {
        let mut state = self.state();
        let mut keys: HashSet<EventKey> = state.events.iter().map(UsageEvent::key).collect();
        for event in events {
            let key = event.key();
            if !keys.insert(key.clone()) {
                return Err(StoreError::UniqueViolation(key.to_string()));
            }
        }

        for event in events {
            state.next_event_id += 1;
            let id = state.next_event_id;
            state.events.push(stored(id, event.clone()));
        }
        Ok(events.len() as u64)
    }

    async fn events_for_account(
        &self,
        account_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        let mut events: Vec<_> = self
            .state()
            .events
            .iter()
            .filter(|e| e.account_id == account_id)
            .filter(|e| since.map_or(true, |since| e.occurred_at >= since))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    async fn events_for_accounts(&self, account_ids: &[i64]) -> Result<Vec<UsageEvent>, StoreError> {
        let wanted: HashSet<i64> = account_ids.iter().copied().collect();
        Ok(self
            .state()
            .events
            .iter()
            .filter(|e| wanted.contains(&e.account_id))
            .cloned()
            .collect())
    }

    async fn delete_anomalous(
        &self,
        max_active_ms: i64,
        max_visits: i32,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        let mut state = self.state();
        let (anomalous, kept): (Vec<_>, Vec<_>) = state
            .events
            .drain(..)
            .partition(|e| e.active_ms > max_active_ms || e.visits > max_visits);
        state.events = kept;
        Ok(anomalous)
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryStore {
    async fn find_by_device_id(&self, device_id: Uuid) -> Result<Option<Device>, StoreError> {
        Ok(self.state().devices.get(&device_id).cloned())
    }

    async fn find_active_device(
        &self,
        account_id: i64,
        device_id: Uuid,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self
            .state()
            .devices
            .get(&device_id)
            .filter(|d| d.account_id == account_id && d.is_active())
            .cloned())
    }

    async fn list_for_account(&self, account_id: i64) -> Result<Vec<Device>, StoreError> {
        let mut devices: Vec<_> = self
            .state()
            .devices
            .values()
            .filter(|d| d.account_id == account_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| {
            b.last_sync_at
                .cmp(&a.last_sync_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(devices)
    }

    async fn deactivate_siblings(
        &self,
        account_id: i64,
        keep: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_device_writes()?;
        Ok(self.state().deactivate_siblings(account_id, keep, at))
    }

    async fn upsert_active(&self, registration: &DeviceRegistration) -> Result<Device, StoreError> {
        self.check_device_writes()?;
        if self.device_upserts_ignored.load(Ordering::SeqCst) {
            return Ok(Device {
                id: 0,
                device_id: registration.device_id,
                account_id: registration.account_id,
                display_name: registration.display_name.clone(),
                browser_info: Some(registration.browser_info.clone()),
                state: DeviceState::Active,
                last_sync_at: Some(registration.synced_at),
                created_at: registration.synced_at,
            });
        }
        self.state().upsert_active(registration)
    }

    async fn deactivate(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state();
        match state.devices.get_mut(&device_id) {
            Some(device) if device.is_active() => {
                device.state = device.state.deactivate(at);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn purge(&self, device_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state();
        let removed = state.devices.remove(&device_id).is_some();
        if removed {
            state.purged.insert(device_id);
            for account in state.accounts.values_mut() {
                if account.active_device_id == Some(device_id) {
                    account.active_device_id = None;
                }
            }
        }
        Ok(u64::from(removed))
    }

    async fn is_purged(&self, device_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state().purged.contains(&device_id))
    }

    async fn touch_last_sync(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(device) = self.state().devices.get_mut(&device_id) {
            device.last_sync_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for InMemoryStore {
    async fn find_account(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        Ok(self.account(account_id))
    }

    async fn set_active_device(
        &self,
        account_id: i64,
        device_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state().set_active_device(account_id, device_id, at)
    }

    async fn touch_last_sync(&self, account_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(account) = self.state().accounts.get_mut(&account_id) {
            account.last_sync_at = Some(at);
        }
        Ok(())
    }

    async fn list_accounts(&self, limit: i64) -> Result<Vec<Account>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.state().accounts.values().take(limit).cloned().collect())
    }

    async fn find_session_account(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self
            .state()
            .sessions
            .get(token)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(account_id, _)| *account_id))
    }

    async fn delete_account_data(&self, account_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.events.retain(|e| e.account_id != account_id);
        state.devices.retain(|_, d| d.account_id != account_id);
        state.sessions.retain(|_, (owner, _)| *owner != account_id);
        state.recalculations.remove(&account_id);
        Ok(state.accounts.remove(&account_id).is_some())
    }
}

#[async_trait::async_trait]
impl ScoreRecalculator for InMemoryStore {
    async fn recalculate(&self, account_id: i64) -> Result<(), StoreError> {
        if self.recalculation_fails.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated recalculation failure".to_string()));
        }
        *self.state().recalculations.entry(account_id).or_default() += 1;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AtomicDeviceRegistration for InMemoryStore {
    async fn register_atomically(&self, registration: &DeviceRegistration) -> Result<(), StoreError> {
        if self.atomic_registration_disabled.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "register_user_device is not installed".to_string(),
            ));
        }
        self.check_device_writes()?;

        let mut state = self.state();
        if !state.accounts.contains_key(&registration.account_id) {
            return Err(StoreError::NotFound(format!(
                "account {}",
                registration.account_id
            )));
        }
        if state.purged.contains(&registration.device_id) {
            return Err(StoreError::Database(format!(
                "device {} was purged",
                registration.device_id
            )));
        }
        state.deactivate_siblings(
            registration.account_id,
            registration.device_id,
            registration.synced_at,
        );
        if !self.device_upserts_ignored.load(Ordering::SeqCst) {
            state.upsert_active(registration)?;
        }
        state.set_active_device(
            registration.account_id,
            registration.device_id,
            registration.synced_at,
        )
    }
}

#[async_trait::async_trait]
impl StoreHealth for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
