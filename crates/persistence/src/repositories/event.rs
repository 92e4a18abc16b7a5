//! Usage event repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{EventKey, NewUsageEvent};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{EventEntity, EventKeyEntity};
use crate::metrics::QueryTimer;

const EVENT_COLUMNS: &str = "id, user_id, device_uuid, timestamp, domain, active_ms, total_ms, visits, client_version, created_at";

/// Repository for events_raw.
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the stored identity keys matching any of `keys`, in one query.
    pub async fn find_existing_keys(
        &self,
        keys: &[EventKey],
    ) -> Result<Vec<EventKeyEntity>, sqlx::Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let timer = QueryTimer::new("find_existing_event_keys");

        let user_ids: Vec<i64> = keys.iter().map(|k| k.account_id).collect();
        let domains: Vec<String> = keys.iter().map(|k| k.domain.clone()).collect();
        let timestamps: Vec<DateTime<Utc>> = keys.iter().map(|k| k.occurred_at).collect();

        let result = sqlx::query_as::<_, EventKeyEntity>(
            r#"
            SELECT e.user_id, e.domain, e.timestamp
            FROM events_raw e
            JOIN UNNEST($1::BIGINT[], $2::TEXT[], $3::TIMESTAMPTZ[]) AS k(user_id, domain, ts)
              ON e.user_id = k.user_id AND e.domain = k.domain AND e.timestamp = k.ts
            "#,
        )
        .bind(&user_ids)
        .bind(&domains)
        .bind(&timestamps)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Inserts the batch in a single statement, so a key collision rejects all rows.
    pub async fn insert_batch(&self, events: &[NewUsageEvent]) -> Result<u64, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }
        let timer = QueryTimer::new("insert_events_batch");

        let user_ids: Vec<i64> = events.iter().map(|e| e.account_id).collect();
        let device_ids: Vec<Uuid> = events.iter().map(|e| e.device_id).collect();
        let timestamps: Vec<DateTime<Utc>> = events.iter().map(|e| e.occurred_at).collect();
        let domains: Vec<String> = events.iter().map(|e| e.domain.clone()).collect();
        let active: Vec<i64> = events.iter().map(|e| e.active_ms).collect();
        let total: Vec<i64> = events.iter().map(|e| e.total_ms).collect();
        let visits: Vec<i32> = events.iter().map(|e| e.visits).collect();
        let versions: Vec<String> = events.iter().map(|e| e.client_version.clone()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO events_raw (user_id, device_uuid, timestamp, domain, active_ms, total_ms, visits, client_version)
            SELECT * FROM UNNEST(
                $1::BIGINT[], $2::UUID[], $3::TIMESTAMPTZ[], $4::TEXT[],
                $5::BIGINT[], $6::BIGINT[], $7::INTEGER[], $8::TEXT[]
            )
            "#,
        )
        .bind(&user_ids)
        .bind(&device_ids)
        .bind(&timestamps)
        .bind(&domains)
        .bind(&active)
        .bind(&total)
        .bind(&visits)
        .bind(&versions)
        .execute(&self.pool)
        .await;

        timer.record();
        Ok(result?.rows_affected())
    }

    /// Events of one account, oldest first.
    pub async fn find_by_user(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_events_by_user");

        let result = sqlx::query_as::<_, EventEntity>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events_raw
            WHERE user_id = $1 AND ($2::TIMESTAMPTZ IS NULL OR timestamp >= $2)
            ORDER BY timestamp ASC
            "#
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    pub async fn find_by_users(&self, user_ids: &[i64]) -> Result<Vec<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_events_by_users");

        let result = sqlx::query_as::<_, EventEntity>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events_raw
            WHERE user_id = ANY($1)
            "#
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Deletes events above either threshold and returns them.
    pub async fn delete_anomalous(
        &self,
        max_active_ms: i64,
        max_visits: i32,
    ) -> Result<Vec<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("delete_anomalous_events");

        let result = sqlx::query_as::<_, EventEntity>(&format!(
            r#"
            DELETE FROM events_raw
            WHERE active_ms > $1 OR visits > $2
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(max_active_ms)
        .bind(max_visits)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }
}
