//! Usage event entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the events_raw table.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: i64,
    pub user_id: i64,
    pub device_uuid: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub active_ms: i64,
    pub total_ms: i64,
    pub visits: i32,
    pub client_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EventEntity> for domain::models::UsageEvent {
    fn from(entity: EventEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_uuid,
            account_id: entity.user_id,
            occurred_at: entity.timestamp,
            domain: entity.domain,
            active_ms: entity.active_ms,
            total_ms: entity.total_ms,
            visits: entity.visits,
            client_version: entity.client_version,
            created_at: entity.created_at,
        }
    }
}

/// Identity columns of an events_raw row.
#[derive(Debug, Clone, FromRow)]
pub struct EventKeyEntity {
    pub user_id: i64,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
}

impl From<EventKeyEntity> for domain::models::EventKey {
    fn from(entity: EventKeyEntity) -> Self {
        Self {
            account_id: entity.user_id,
            domain: entity.domain,
            occurred_at: entity.timestamp,
        }
    }
}
