//! Session-protected account reads and deletion.

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::{Duration, Utc};
use domain::DomainError;
use domain::models::{Account, AccountStats, ActivityReport, DeviceSummary};
use domain::services::scoring;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::SessionAccount;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub success: bool,
    pub user: Account,
    pub stats: AccountStats,
    pub active_device: Option<DeviceSummary>,
}

/// `GET /api/v1/user/me`
pub async fn me(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
) -> Result<Json<MeResponse>, ApiError> {
    let user = state
        .stores
        .accounts
        .find_account(account_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("User not found".to_string()))?;

    let events = state.stores.events.events_for_account(account_id, None).await?;
    let stats = scoring::account_stats(&events, Utc::now());

    let active_device = state
        .devices
        .devices_for_account(account_id)
        .await?
        .into_iter()
        .find(|device| device.is_active())
        .map(DeviceSummary::from);

    Ok(Json(MeResponse {
        success: true,
        user,
        stats,
        active_device,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreParams {
    #[serde(default, alias = "accountId")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub success: bool,
    pub score: i64,
}

async fn own_score(
    state: &AppState,
    caller: i64,
    requested: Option<i64>,
) -> Result<Json<ScoreResponse>, ApiError> {
    if requested.is_some_and(|id| id != caller) {
        return Err(ApiError::Forbidden("Forbidden".to_string()));
    }

    let events = state.stores.events.events_for_account(caller, None).await?;
    let score = scoring::aggregate(&events, |_| true).score();
    Ok(Json(ScoreResponse {
        success: true,
        score,
    }))
}

/// `GET /api/v1/user/score`: total score from raw events. Only the caller's
/// own score is readable.
pub async fn score(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
    WithRejection(Query(params), _): WithRejection<Query<ScoreParams>, ApiError>,
) -> Result<Json<ScoreResponse>, ApiError> {
    own_score(&state, account_id, params.user_id).await
}

/// `POST /api/v1/user/score` with `{userId}`.
pub async fn score_for(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
    WithRejection(Json(params), _): WithRejection<Json<ScoreParams>, ApiError>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let requested = params
        .user_id
        .ok_or_else(|| DomainError::Validation("Missing userId".to_string()))?;
    own_score(&state, account_id, Some(requested)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityParams {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: ActivityReport,
}

/// `GET /api/v1/user/activity?days=N`: daily scores and the current streak.
pub async fn activity(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
    WithRejection(Query(params), _): WithRejection<Query<ActivityParams>, ApiError>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let days = state.config.limits.activity_days(params.days);
    let now = Utc::now();
    let today = shared::time::utc_day(now);
    let since = shared::time::start_of_utc_day(now) - Duration::days(i64::from(days) - 1);

    let events = state
        .stores
        .events
        .events_for_account(account_id, Some(since))
        .await?;

    Ok(Json(ActivityResponse {
        success: true,
        report: scoring::daily_activity(&events, days, today),
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: &'static str,
}

/// `DELETE /api/v1/user`: removes the account with all of its data.
pub async fn delete_account(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
) -> Result<Json<DeleteAccountResponse>, ApiError> {
    if !state.stores.accounts.delete_account_data(account_id).await? {
        return Err(DomainError::NotFound("User not found".to_string()).into());
    }

    tracing::info!(account_id, "Account deleted");
    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "Account deleted",
    }))
}
