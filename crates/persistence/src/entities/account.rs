//! Account entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct AccountEntity {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_image: Option<String>,
    pub subscription_tier: Option<String>,
    pub active_device_uuid: Option<Uuid>,
    pub last_extension_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AccountEntity> for domain::models::Account {
    fn from(entity: AccountEntity) -> Self {
        Self {
            id: entity.id,
            username: entity.username,
            display_name: entity.display_name,
            profile_image: entity.profile_image,
            subscription_tier: entity.subscription_tier,
            active_device_id: entity.active_device_uuid,
            last_sync_at: entity.last_extension_sync,
            created_at: entity.created_at,
        }
    }
}
