//! Extension sync endpoints.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use domain::DomainError;
use domain::models::{AccountStats, SyncRequest, SyncResponse};
use domain::services::user_agent::parse_user_agent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics;

pub const DEVICE_ID_HEADER: &str = "x-extension-device-uuid";
pub const ACCOUNT_ID_HEADER: &str = "x-extension-user-id";

pub(crate) fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// `POST /api/v1/sync`
pub async fn sync_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(request), _): WithRejection<Json<SyncRequest>, ApiError>,
) -> Result<Json<SyncResponse>, ApiError> {
    request.validate()?;

    let max_batch = state.config.limits.max_batch_size;
    if request.events.len() > max_batch {
        return Err(DomainError::Validation(format!(
            "Batch of {} events exceeds the maximum of {max_batch}",
            request.events.len()
        ))
        .into());
    }

    let batch_id = request.batch_id.clone();
    let browser_info = parse_user_agent(user_agent(&headers));
    let outcome = state.sync.sync(request, browser_info, Utc::now()).await?;
    metrics::record_sync(&outcome);

    Ok(Json(SyncResponse {
        success: true,
        processed: outcome.processed,
        errors: outcome.errors,
        batch_id,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default, alias = "deviceUuid")]
    pub device_id: Option<Uuid>,
    #[serde(default, alias = "userId")]
    pub account_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: AccountStats,
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Result<Option<T>, ApiError> {
    match headers.get(name).and_then(|v| v.to_str().ok()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header"))),
    }
}

/// `GET /api/v1/sync`: today's and total stats for an active device.
///
/// Identifiers come from the query string, or from the extension headers.
pub async fn sync_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Query(query), _): WithRejection<Query<StatsQuery>, ApiError>,
) -> Result<Json<StatsResponse>, ApiError> {
    let device_id = match query.device_id {
        Some(id) => Some(id),
        None => header_value::<Uuid>(&headers, DEVICE_ID_HEADER)?,
    };
    let account_id = match query.account_id {
        Some(id) => Some(id),
        None => header_value::<i64>(&headers, ACCOUNT_ID_HEADER)?,
    };

    let (Some(device_id), Some(account_id)) = (device_id, account_id) else {
        return Err(
            DomainError::Validation("deviceId and accountId are required".to_string()).into(),
        );
    };

    let data = state.sync.stats(account_id, device_id, Utc::now()).await?;
    Ok(Json(StatsResponse {
        success: true,
        data,
    }))
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
    pub success: bool,
}

/// `DELETE /api/extension/sync`: the extension signing out of its device.
pub async fn unregister_device(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnregisterResponse>, ApiError> {
    let Some(device_id) = header_value::<Uuid>(&headers, DEVICE_ID_HEADER)? else {
        return Err(ApiError::BadRequest("Missing device UUID".to_string()));
    };

    state.devices.remove(device_id, false, Utc::now()).await?;
    tracing::info!(device_id = %device_id, "Extension unregistered device");
    Ok(Json(UnregisterResponse { success: true }))
}
