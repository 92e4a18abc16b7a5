//! Removal of stored events that exceed the ingestion thresholds.
//!
//! Such events predate validation and would otherwise keep inflating scores.

use std::collections::BTreeSet;

use crate::errors::DomainError;
use crate::models::UsageEvent;
use crate::ports::Stores;
use crate::services::event_validator::EventValidator;

/// Deleted events and the accounts whose scores were recomputed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub deleted: Vec<UsageEvent>,
    pub affected_accounts: Vec<i64>,
}

impl CleanupReport {
    pub fn cleaned(&self) -> usize {
        self.deleted.len()
    }
}

pub async fn clean_anomalous(
    stores: &Stores,
    validator: &EventValidator,
) -> Result<CleanupReport, DomainError> {
    let max_active_ms = i64::try_from(validator.max_active_ms).unwrap_or(i64::MAX);
    let max_visits = i32::try_from(validator.max_visits).unwrap_or(i32::MAX);

    let deleted = stores
        .events
        .delete_anomalous(max_active_ms, max_visits)
        .await?;

    for event in &deleted {
        tracing::info!(
            event_id = event.id,
            account_id = event.account_id,
            domain = %event.domain,
            active_hours = event.active_ms as f64 / 3_600_000.0,
            visits = event.visits,
            "Deleted anomalous event"
        );
    }

    let affected: BTreeSet<i64> = deleted.iter().map(|event| event.account_id).collect();
    for account_id in &affected {
        if let Err(err) = stores.scores.recalculate(*account_id).await {
            tracing::error!(account_id, error = %err, "Score recalculation failed after cleanup");
        }
    }

    tracing::info!(cleaned = deleted.len(), "Anomalous event cleanup finished");
    Ok(CleanupReport {
        deleted,
        affected_accounts: affected.into_iter().collect(),
    })
}
