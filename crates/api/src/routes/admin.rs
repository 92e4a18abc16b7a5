//! Operator endpoints.

use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;
use domain::services::anomaly_cleanup;
use serde::{Deserialize, Serialize};
use shared::secret::constant_time_eq;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::SessionAccount;
use crate::middleware::metrics;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    #[serde(default)]
    pub confirm_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub cleaned: usize,
    pub affected_accounts: Vec<i64>,
}

/// `POST /api/v1/admin/cleanup`: deletes stored events above the ingestion
/// thresholds and recomputes the affected scores.
///
/// Requires a session and `confirmToken` matching `admin.cleanup_token`.
/// Responds 404 when no token is configured.
pub async fn cleanup_anomalies(
    State(state): State<AppState>,
    SessionAccount(account_id): SessionAccount,
    WithRejection(Json(request), _): WithRejection<Json<CleanupRequest>, ApiError>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let expected = &state.config.admin.cleanup_token;
    if expected.is_empty() {
        return Err(ApiError::NotFound("Not found".to_string()));
    }
    if !constant_time_eq(&request.confirm_token, expected) {
        tracing::warn!(account_id, "Cleanup requested with a wrong confirmation token");
        return Err(ApiError::Forbidden("Invalid confirmation token".to_string()));
    }

    let report = anomaly_cleanup::clean_anomalous(&state.stores, &state.validator).await?;
    metrics::record_events_cleaned(report.cleaned());
    tracing::info!(account_id, cleaned = report.cleaned(), "Cleanup triggered");

    Ok(Json(CleanupResponse {
        success: true,
        cleaned: report.cleaned(),
        affected_accounts: report.affected_accounts,
    }))
}
