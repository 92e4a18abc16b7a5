//! Sync request and response payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::event::RawEvent;

/// Batch submitted by the extension.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(alias = "deviceUuid")]
    pub device_id: Uuid,

    #[serde(default, alias = "userId")]
    #[validate(range(min = 1, message = "accountId must be a positive integer"))]
    pub account_id: Option<i64>,

    #[serde(default)]
    pub events: Vec<RawEvent>,

    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub batch_id: String,
}

/// Response to a sync batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub processed: u64,
    pub errors: Vec<String>,
    pub batch_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_extension_field_names() {
        let request: SyncRequest = serde_json::from_value(json!({
            "deviceUuid": "6f1c1f9e-4a55-4d2b-9b0e-6a3c1d2e7f80",
            "userId": 7,
            "batchId": "batch-1",
            "events": [{ "type": "visit", "domain": "claude.ai", "timestamp": 1736078400000u64 }]
        }))
        .unwrap();
        assert_eq!(request.account_id, Some(7));
        assert_eq!(request.events.len(), 1);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_account_is_optional() {
        let request: SyncRequest = serde_json::from_value(json!({
            "deviceId": "6f1c1f9e-4a55-4d2b-9b0e-6a3c1d2e7f80",
            "batchId": "b"
        }))
        .unwrap();
        assert_eq!(request.account_id, None);
        assert!(request.events.is_empty());
    }

    #[test]
    fn test_blank_batch_id_rejected() {
        let request: SyncRequest = serde_json::from_value(json!({
            "deviceId": "6f1c1f9e-4a55-4d2b-9b0e-6a3c1d2e7f80",
            "batchId": "  "
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
