//! Account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_image: Option<String>,
    pub subscription_tier: Option<String>,
    pub active_device_id: Option<Uuid>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Username shown publicly, falling back to `User<id>`.
    pub fn public_username(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("User{}", self.id))
    }

    pub fn public_display_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("User{}", self.id))
    }
}

/// Subscription tier as shown on the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Pro,
    Premium,
    Affiliate,
}

impl SubscriptionTier {
    /// Maps a free-form stored tier onto the published set.
    ///
    /// Matching is by substring, most specific first, so `"pro_affiliate"` is an
    /// affiliate tier.
    pub fn normalize(raw: Option<&str>) -> Self {
        let value = raw.unwrap_or("FREE").to_uppercase();
        if value.contains("AFFILIATE") {
            SubscriptionTier::Affiliate
        } else if value.contains("PREMIUM") {
            SubscriptionTier::Premium
        } else if value.contains("PRO") {
            SubscriptionTier::Pro
        } else if value.contains("BASIC") {
            SubscriptionTier::Basic
        } else {
            SubscriptionTier::Free
        }
    }
}

/// Public user details returned by device verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: i64,
    pub username: Option<String>,
    pub name: Option<String>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            name: account.display_name.clone(),
        }
    }
}
