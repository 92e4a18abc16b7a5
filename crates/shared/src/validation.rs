//! Common validation utilities.

use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use validator::ValidationError;

/// Maximum age of an event timestamp in days.
pub const MAX_TIMESTAMP_AGE_DAYS: i64 = 7;

/// Maximum allowed future timestamp tolerance in seconds (1 hour for clock skew).
pub const MAX_FUTURE_TOLERANCE_SECS: i64 = 3600;

/// Reasons a timestamp falls outside the accepted window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp cannot be represented")]
    Unrepresentable,
    #[error("timestamp is too far in the future")]
    TooFarInFuture,
    #[error("timestamp is too old")]
    TooOld,
}

/// Window of accepted timestamps relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWindow {
    pub max_age: Duration,
    pub max_future: Duration,
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self {
            max_age: Duration::days(MAX_TIMESTAMP_AGE_DAYS),
            max_future: Duration::seconds(MAX_FUTURE_TOLERANCE_SECS),
        }
    }
}

impl TimestampWindow {
    /// Checks a millisecond timestamp against `[now - max_age, now + max_future]`.
    ///
    /// Both bounds are inclusive. Returns the parsed timestamp on success.
    pub fn check_millis(
        &self,
        timestamp_millis: i64,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, TimestampError> {
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_millis)
            .single()
            .ok_or(TimestampError::Unrepresentable)?;

        if timestamp > now + self.max_future {
            return Err(TimestampError::TooFarInFuture);
        }
        if timestamp < now - self.max_age {
            return Err(TimestampError::TooOld);
        }
        Ok(timestamp)
    }
}

/// Normalizes a host string: trims whitespace and lowercases it.
///
/// Returns `None` when nothing is left.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Validates that a string contains at least one non-whitespace character.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}
