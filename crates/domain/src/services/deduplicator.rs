//! Duplicate suppression for ingested events.
//!
//! Events are identified by `(account, domain, occurred_at)`. Duplicates are
//! removed first within the submitted batch, then against storage, and the
//! survivors are inserted in one all-or-nothing write.

use std::collections::HashSet;

use crate::errors::StoreError;
use crate::models::NewUsageEvent;
use crate::ports::EventStore;

pub const ALL_FILTERED_MESSAGE: &str = "All events were filtered out as invalid or duplicates";
pub const ALL_EXISTING_MESSAGE: &str = "All events already exist in database";
pub const RACE_DUPLICATE_MESSAGE: &str = "Some events were duplicates";

/// Counts and advisory messages from one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub processed: u64,
    pub duplicates_in_batch: usize,
    pub duplicates_in_store: usize,
    pub errors: Vec<String>,
}

/// Keeps the first occurrence of each identity key, in submission order.
///
/// Returns the survivors and the number of dropped duplicates.
pub fn dedupe_within_batch(events: Vec<NewUsageEvent>) -> (Vec<NewUsageEvent>, usize) {
    let mut seen = HashSet::with_capacity(events.len());
    let mut unique = Vec::with_capacity(events.len());
    let mut dropped = 0;

    for event in events {
        if seen.insert(event.key()) {
            unique.push(event);
        } else {
            tracing::warn!(
                domain = %event.domain,
                occurred_at = %event.occurred_at,
                "Skipping duplicate event within batch"
            );
            dropped += 1;
        }
    }

    (unique, dropped)
}

/// Drops events whose key is already persisted.
pub async fn filter_persisted(
    store: &dyn EventStore,
    events: Vec<NewUsageEvent>,
) -> Result<(Vec<NewUsageEvent>, usize), StoreError> {
    let keys: Vec<_> = events.iter().map(NewUsageEvent::key).collect();
    let existing = store.find_existing_keys(&keys).await?;
    if existing.is_empty() {
        return Ok((events, 0));
    }

    let before = events.len();
    let fresh: Vec<_> = events
        .into_iter()
        .filter(|event| {
            let known = existing.contains(&event.key());
            if known {
                tracing::warn!(
                    domain = %event.domain,
                    occurred_at = %event.occurred_at,
                    "Skipping duplicate event (already stored)"
                );
            }
            !known
        })
        .collect();
    let dropped = before - fresh.len();
    Ok((fresh, dropped))
}

/// Runs both deduplication steps and inserts what is left.
///
/// A uniqueness violation at insert time means a concurrent sync won the race:
/// the whole batch is reported as a no-op and not retried.
pub async fn ingest(
    store: &dyn EventStore,
    events: Vec<NewUsageEvent>,
) -> Result<IngestOutcome, StoreError> {
    let (unique, duplicates_in_batch) = dedupe_within_batch(events);
    let mut outcome = IngestOutcome {
        duplicates_in_batch,
        ..Default::default()
    };

    if unique.is_empty() {
        outcome.errors.push(ALL_FILTERED_MESSAGE.to_string());
        return Ok(outcome);
    }

    let (fresh, duplicates_in_store) = filter_persisted(store, unique).await?;
    outcome.duplicates_in_store = duplicates_in_store;

    if fresh.is_empty() {
        outcome.errors.push(ALL_EXISTING_MESSAGE.to_string());
        return Ok(outcome);
    }

    match store.insert_events(&fresh).await {
        Ok(inserted) => {
            tracing::info!(
                inserted,
                duplicates_in_batch,
                duplicates_in_store,
                "Inserted events"
            );
            outcome.processed = inserted;
        }
        Err(StoreError::UniqueViolation(detail)) => {
            tracing::warn!(detail = %detail, "Concurrent insert collided, dropping batch");
            outcome.errors.push(RACE_DUPLICATE_MESSAGE.to_string());
        }
        Err(err) => return Err(err),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn event(account_id: i64, domain: &str, offset_secs: i64) -> NewUsageEvent {
        NewUsageEvent {
            device_id: Uuid::nil(),
            account_id,
            occurred_at: Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap()
                + Duration::seconds(offset_secs),
            domain: domain.to_string(),
            active_ms: 1_000,
            total_ms: 1_000,
            visits: 1,
            client_version: "extension_v1".to_string(),
        }
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let mut first = event(1, "claude.ai", 0);
        first.active_ms = 111;
        let mut again = event(1, "claude.ai", 0);
        again.active_ms = 222;

        let (unique, dropped) =
            dedupe_within_batch(vec![first, event(1, "chatgpt.com", 0), again]);
        assert_eq!(dropped, 1);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].active_ms, 111);
        assert_eq!(unique[1].domain, "chatgpt.com");
    }

    #[test]
    fn test_dedupe_distinguishes_accounts_and_times() {
        let (unique, dropped) = dedupe_within_batch(vec![
            event(1, "claude.ai", 0),
            event(2, "claude.ai", 0),
            event(1, "claude.ai", 1),
        ]);
        assert_eq!(dropped, 0);
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let store = InMemoryStore::new();
        let batch = vec![event(1, "claude.ai", 0), event(1, "claude.ai", 5)];

        let first = ingest(&store, batch.clone()).await.unwrap();
        assert_eq!(first.processed, 2);
        assert!(first.errors.is_empty());

        let second = ingest(&store, batch).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.duplicates_in_store, 2);
        assert_eq!(second.errors, vec![ALL_EXISTING_MESSAGE.to_string()]);
        assert_eq!(store.event_count(), 2);
    }

    #[tokio::test]
    async fn test_ingest_partial_overlap_inserts_only_new() {
        let store = InMemoryStore::new();
        ingest(&store, vec![event(1, "claude.ai", 0)]).await.unwrap();

        let outcome = ingest(
            &store,
            vec![
                event(1, "claude.ai", 10),
                event(1, "claude.ai", 0),
                event(1, "claude.ai", 10),
            ],
        )
        .await
        .unwrap();

        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.duplicates_in_batch, 1);
        assert_eq!(outcome.duplicates_in_store, 1);
        assert_eq!(store.event_count(), 2);
    }

    #[tokio::test]
    async fn test_ingest_empty_batch() {
        let store = InMemoryStore::new();
        let outcome = ingest(&store, vec![]).await.unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.errors, vec![ALL_FILTERED_MESSAGE.to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_race_is_noop() {
        let store = InMemoryStore::new();
        store.hide_existing_keys(true);
        ingest(&store, vec![event(1, "claude.ai", 0)]).await.unwrap();

        // The lookup misses the stored row, so the insert itself collides.
        let outcome = ingest(&store, vec![event(1, "claude.ai", 0), event(1, "claude.ai", 1)])
            .await
            .unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.errors, vec![RACE_DUPLICATE_MESSAGE.to_string()]);
        assert_eq!(store.event_count(), 1);
    }
}
