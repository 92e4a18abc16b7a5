//! Device registration, removal and verification.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Duration, Utc};
use domain::models::{
    AccountSummary, Device, DeviceRegistration, DeviceSummary, RegisterDeviceRequest,
    RemoveDeviceRequest,
};
use domain::services::{user_agent::parse_user_agent, Removal};
use domain::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::SessionAccount;
use crate::middleware::metrics;
use crate::routes::sync::user_agent;

/// A device synced within this window counts as recently seen.
const RECENT_SYNC_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub success: bool,
    pub devices: Vec<DeviceSummary>,
}

/// `GET /api/v1/devices`: the caller's devices, most recently synced first.
pub async fn list_devices(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
) -> Result<Json<DeviceListResponse>, ApiError> {
    let devices = state.devices.devices_for_account(account_id).await?;
    Ok(Json(DeviceListResponse {
        success: true,
        devices: devices.into_iter().map(DeviceSummary::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub success: bool,
    pub message: &'static str,
    pub device: DeviceSummary,
}

/// `POST /api/v1/devices`: makes the device the account's only active one.
pub async fn register_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(request), _): WithRejection<Json<RegisterDeviceRequest>, ApiError>,
) -> Result<Json<RegisterDeviceResponse>, ApiError> {
    request.validate()?;

    if state
        .stores
        .accounts
        .find_account(request.account_id)
        .await?
        .is_none()
    {
        return Err(DomainError::AccountNotFound(request.account_id).into());
    }

    let registration = DeviceRegistration::new(
        request.account_id,
        request.device_id,
        parse_user_agent(user_agent(&headers)),
        Utc::now(),
    );
    let receipt = state.registrar.register(&registration).await?;
    metrics::record_device_registration(receipt.path);

    Ok(Json(RegisterDeviceResponse {
        success: true,
        message: "Device registered successfully",
        device: receipt.device.into(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

/// `DELETE /api/v1/devices`: deactivates, or deletes with `purge: true`.
pub async fn remove_device(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<RemoveDeviceRequest>, ApiError>,
) -> Result<Json<MessageResponse>, ApiError> {
    let removal = state
        .devices
        .remove(request.device_id, request.purge, Utc::now())
        .await?;

    let message = match removal {
        Removal::Purged => "Device removed permanently",
        Removal::Deactivated => "Device deactivated successfully",
    };
    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdParam {
    #[serde(alias = "deviceUuid")]
    pub device_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedDevice {
    pub uuid: Uuid,
    pub name: String,
    pub user_id: i64,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Device> for VerifiedDevice {
    fn from(device: &Device) -> Self {
        Self {
            uuid: device.device_id,
            name: device.display_name.clone(),
            user_id: device.account_id,
            last_sync: device.last_sync_at,
            created_at: device.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub verified: bool,
    pub is_active: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<VerifiedDevice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AccountSummary>,
}

/// `GET /api/v1/device/verify?deviceId=`
pub async fn verify_device(
    State(state): State<AppState>,
    WithRejection(Query(param), _): WithRejection<Query<DeviceIdParam>, ApiError>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Some(device) = state.devices.find(param.device_id).await? else {
        return Ok(Json(VerifyResponse {
            success: true,
            verified: false,
            is_active: false,
            message: "Device not registered",
            device: None,
            user: None,
        }));
    };

    let account = state.stores.accounts.find_account(device.account_id).await?;
    let is_active = device.is_active();

    Ok(Json(VerifyResponse {
        success: true,
        verified: is_active,
        is_active,
        message: if is_active {
            "Device is active and verified"
        } else {
            "Device is registered but not active"
        },
        device: Some(VerifiedDevice::from(&device)),
        user: account.as_ref().map(AccountSummary::from),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckResponse {
    pub success: bool,
    pub verified: bool,
    pub is_active: bool,
    pub has_recent_sync: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub user_id: Option<i64>,
}

fn synced_recently(last_sync_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_sync_at.map_or(false, |at| now - at < Duration::seconds(RECENT_SYNC_WINDOW_SECS))
}

/// `POST /api/v1/device/verify`: activity plus whether the device synced
/// within the last five minutes.
pub async fn verify_device_sync(
    State(state): State<AppState>,
    WithRejection(Json(param), _): WithRejection<Json<DeviceIdParam>, ApiError>,
) -> Result<Json<SyncCheckResponse>, ApiError> {
    let device = state.devices.find(param.device_id).await?;
    let is_active = device.as_ref().map_or(false, Device::is_active);
    let last_sync_at = device.as_ref().and_then(|d| d.last_sync_at);

    Ok(Json(SyncCheckResponse {
        success: true,
        verified: is_active,
        is_active,
        has_recent_sync: synced_recently(last_sync_at, Utc::now()),
        last_sync_at,
        user_id: device.map(|d| d.account_id),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

/// `POST /api/v1/device/status`
pub async fn device_status(
    State(state): State<AppState>,
    WithRejection(Json(param), _): WithRejection<Json<DeviceIdParam>, ApiError>,
) -> Result<Json<StatusResponse>, ApiError> {
    let response = match state.devices.find(param.device_id).await? {
        Some(device) => StatusResponse {
            connected: device.is_active(),
            user_id: Some(device.account_id),
        },
        None => StatusResponse {
            connected: false,
            user_id: None,
        },
    };
    Ok(Json(response))
}
