//! Leaderboard read models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::account::SubscriptionTier;

/// One of a user's most used tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTool {
    pub name: String,
    pub visits: i64,
    pub active_ms: i64,
    /// Share of the user's visits, 0-100.
    pub percent: u8,
}

/// A ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub profile_image: Option<String>,
    pub score: i64,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub tier: SubscriptionTier,
    pub top_tools: Vec<TopTool>,
}
