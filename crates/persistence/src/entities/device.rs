//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{BrowserInfo, DeviceState};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the user_devices table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: i64,
    pub user_id: i64,
    pub device_uuid: Uuid,
    pub device_name: String,
    pub browser_info: Option<serde_json::Value>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DeviceEntity> for domain::models::Device {
    fn from(entity: DeviceEntity) -> Self {
        // Rows written before user-agent parsing may hold arbitrary client JSON.
        let browser_info = entity
            .browser_info
            .and_then(|value| serde_json::from_value::<BrowserInfo>(value).ok());

        Self {
            id: entity.id,
            device_id: entity.device_uuid,
            account_id: entity.user_id,
            display_name: entity.device_name,
            browser_info,
            state: DeviceState::from_columns(
                entity.is_active,
                entity.deactivated_at,
                entity.created_at,
            ),
            last_sync_at: entity.last_sync_at,
            created_at: entity.created_at,
        }
    }
}
