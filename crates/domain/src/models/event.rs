//! Usage event domain model.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client version tag stamped on events ingested through the extension sync.
pub const EXTENSION_CLIENT_VERSION: &str = "extension_v1";

/// Raw event as submitted by the browser extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub domain: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Observed duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl RawEvent {
    /// Visits counted for this event: 1 for `visit` events, 0 otherwise.
    pub fn visit_contribution(&self) -> u32 {
        if self.event_type == "visit" {
            1
        } else {
            0
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.unwrap_or(0)
    }

    pub fn timestamp_millis(&self) -> i64 {
        i64::try_from(self.timestamp).unwrap_or(i64::MAX)
    }
}

/// Identity used for deduplication: exact `(account, domain, occurred_at)` equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub account_id: i64,
    pub domain: String,
    pub occurred_at: DateTime<Utc>,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.account_id,
            self.domain,
            self.occurred_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// A validated event ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageEvent {
    pub device_id: Uuid,
    pub account_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub domain: String,
    pub active_ms: i64,
    pub total_ms: i64,
    pub visits: i32,
    pub client_version: String,
}

impl NewUsageEvent {
    /// Builds a storable event from an accepted raw event.
    ///
    /// Durations are capped at `max_active_ms`. Returns `None` when the domain is
    /// blank or the timestamp cannot be represented.
    pub fn from_raw(
        raw: &RawEvent,
        device_id: Uuid,
        account_id: i64,
        max_active_ms: u64,
    ) -> Option<Self> {
        let domain = shared::validation::normalize_domain(&raw.domain)?;
        let occurred_at = Utc.timestamp_millis_opt(raw.timestamp_millis()).single()?;
        let duration = raw.duration_ms().min(max_active_ms) as i64;

        Some(Self {
            device_id,
            account_id,
            occurred_at,
            domain,
            active_ms: duration,
            total_ms: duration,
            visits: raw.visit_contribution() as i32,
            client_version: EXTENSION_CLIENT_VERSION.to_string(),
        })
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            account_id: self.account_id,
            domain: self.domain.clone(),
            occurred_at: self.occurred_at,
        }
    }
}

/// A persisted usage event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub id: i64,
    pub device_id: Option<Uuid>,
    pub account_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub domain: String,
    pub active_ms: i64,
    pub total_ms: i64,
    pub visits: i32,
    pub client_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            account_id: self.account_id,
            domain: self.domain.clone(),
            occurred_at: self.occurred_at,
        }
    }
}
