//! Device domain model.
//!
//! Device activity is an explicit state machine rather than a pair of loosely
//! related flags, so a device can never be both active and deactivated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::DomainError;

/// Browser details attached to a device registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub user_agent: String,
    pub browser_name: String,
    pub browser_version: String,
    pub os: String,
    pub device_name: String,
}

impl Default for BrowserInfo {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            browser_name: "Unknown".to_string(),
            browser_version: "0.0".to_string(),
            os: "Unknown".to_string(),
            device_name: "Unknown Device".to_string(),
        }
    }
}

/// Lifecycle state of a device installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceState {
    Unregistered,
    Active,
    Inactive { since: DateTime<Utc> },
    Purged,
}

impl DeviceState {
    /// Registering (or re-registering) makes a device active.
    pub fn register(self) -> Result<Self, DomainError> {
        match self {
            DeviceState::Unregistered | DeviceState::Active | DeviceState::Inactive { .. } => {
                Ok(DeviceState::Active)
            }
            DeviceState::Purged => Err(DomainError::InvalidTransition(
                "a purged device cannot be re-registered".to_string(),
            )),
        }
    }

    /// Deactivation is idempotent and keeps the original timestamp.
    pub fn deactivate(self, at: DateTime<Utc>) -> Self {
        match self {
            DeviceState::Active => DeviceState::Inactive { since: at },
            other => other,
        }
    }

    /// Unknown devices have nothing to purge and stay `Unregistered`.
    pub fn purge(self) -> Self {
        match self {
            DeviceState::Unregistered => DeviceState::Unregistered,
            _ => DeviceState::Purged,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DeviceState::Active)
    }

    pub fn deactivated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            DeviceState::Inactive { since } => Some(*since),
            _ => None,
        }
    }

    /// Rebuilds the state from its persisted columns.
    pub fn from_columns(is_active: bool, deactivated_at: Option<DateTime<Utc>>, fallback: DateTime<Utc>) -> Self {
        if is_active {
            DeviceState::Active
        } else {
            DeviceState::Inactive {
                since: deactivated_at.unwrap_or(fallback),
            }
        }
    }
}

/// A registered client installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    pub device_id: Uuid,
    pub account_id: i64,
    pub display_name: String,
    pub browser_info: Option<BrowserInfo>,
    pub state: DeviceState,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Input to device registration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistration {
    pub account_id: i64,
    pub device_id: Uuid,
    pub display_name: String,
    pub browser_info: BrowserInfo,
    pub synced_at: DateTime<Utc>,
}

impl DeviceRegistration {
    pub fn new(account_id: i64, device_id: Uuid, browser_info: BrowserInfo, synced_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            device_id,
            display_name: browser_info.device_name.clone(),
            browser_info,
            synced_at,
        }
    }
}

/// Request payload for `POST /devices`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    #[serde(alias = "deviceUuid")]
    pub device_id: Uuid,

    #[serde(alias = "userId")]
    #[validate(range(min = 1, message = "accountId must be a positive integer"))]
    pub account_id: i64,

    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

/// Request payload for `DELETE /devices`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveDeviceRequest {
    #[serde(alias = "deviceUuid")]
    pub device_id: Uuid,

    #[serde(default)]
    pub purge: bool,
}

/// Device summary returned to the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub id: i64,
    pub device_id: Uuid,
    pub device_name: String,
    pub browser_info: Option<BrowserInfo>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl From<Device> for DeviceSummary {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            device_id: device.device_id,
            device_name: device.display_name,
            browser_info: device.browser_info,
            is_active: device.state.is_active(),
            last_sync_at: device.last_sync_at,
            created_at: device.created_at,
            deactivated_at: device.state.deactivated_at(),
        }
    }
}
