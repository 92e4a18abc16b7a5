//! Plausibility checks for extension-reported events.

use chrono::{DateTime, Duration, Utc};
use shared::validation::TimestampWindow;
use thiserror::Error;

use crate::models::RawEvent;

/// Maximum active time a single event may report (30 minutes).
pub const MAX_ACTIVE_MS: u64 = 30 * 60 * 1000;

/// Maximum visits a single raw event may contribute.
pub const MAX_VISITS_PER_EVENT: u32 = 50;

/// Why an event was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Rejected event with empty domain")]
    EmptyDomain,

    #[error("Rejected event with excessive duration: {duration_ms}ms on {domain}")]
    ExcessiveDuration { domain: String, duration_ms: u64 },

    #[error("Rejected event with excessive visits: {visits} on {domain}")]
    ExcessiveVisits { domain: String, visits: u32 },

    #[error("Rejected event with invalid timestamp: {timestamp_ms} on {domain}")]
    TimestampOutOfRange { domain: String, timestamp_ms: u64 },
}

impl Rejection {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::EmptyDomain => "empty_domain",
            Rejection::ExcessiveDuration { .. } => "excessive_duration",
            Rejection::ExcessiveVisits { .. } => "excessive_visits",
            Rejection::TimestampOutOfRange { .. } => "invalid_timestamp",
        }
    }
}

/// Result of validating a batch.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub accepted: Vec<RawEvent>,
    pub rejected: Vec<Rejection>,
}

/// Validates raw events against configurable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventValidator {
    pub max_active_ms: u64,
    pub max_visits: u32,
    pub window: TimestampWindow,
}

impl Default for EventValidator {
    fn default() -> Self {
        Self {
            max_active_ms: MAX_ACTIVE_MS,
            max_visits: MAX_VISITS_PER_EVENT,
            window: TimestampWindow::default(),
        }
    }
}

impl EventValidator {
    pub fn new(max_active_ms: u64, max_visits: u32, max_age: Duration, max_future: Duration) -> Self {
        Self {
            max_active_ms,
            max_visits,
            window: TimestampWindow {
                max_age,
                max_future,
            },
        }
    }

    /// Checks one event. Rules run in a fixed order and the first failure wins.
    pub fn validate(&self, event: &RawEvent, now: DateTime<Utc>) -> Result<(), Rejection> {
        if event.domain.trim().is_empty() {
            return Err(Rejection::EmptyDomain);
        }

        let duration_ms = event.duration_ms();
        if duration_ms > self.max_active_ms {
            return Err(Rejection::ExcessiveDuration {
                domain: event.domain.clone(),
                duration_ms,
            });
        }

        let visits = event.visit_contribution();
        if visits > self.max_visits {
            return Err(Rejection::ExcessiveVisits {
                domain: event.domain.clone(),
                visits,
            });
        }

        if self.window.check_millis(event.timestamp_millis(), now).is_err() {
            return Err(Rejection::TimestampOutOfRange {
                domain: event.domain.clone(),
                timestamp_ms: event.timestamp,
            });
        }

        Ok(())
    }

    /// Splits a batch into accepted events and rejections, logging each rejection.
    pub fn partition(&self, events: Vec<RawEvent>, now: DateTime<Utc>) -> ValidationOutcome {
        let total = events.len();
        let mut outcome = ValidationOutcome::default();

        for event in events {
            match self.validate(&event, now) {
                Ok(()) => outcome.accepted.push(event),
                Err(rejection) => {
                    log_rejection(&rejection);
                    outcome.rejected.push(rejection);
                }
            }
        }

        if !outcome.rejected.is_empty() {
            tracing::warn!(
                rejected = outcome.rejected.len(),
                total,
                "Filtered invalid events from batch"
            );
        }

        outcome
    }
}

fn log_rejection(rejection: &Rejection) {
    match rejection {
        Rejection::EmptyDomain => tracing::warn!("Rejecting event with empty domain"),
        Rejection::ExcessiveDuration {
            domain,
            duration_ms,
        } => tracing::warn!(
            domain = %domain,
            duration_ms,
            minutes = *duration_ms as f64 / 60_000.0,
            "Rejecting event with excessive duration"
        ),
        Rejection::ExcessiveVisits { domain, visits } => tracing::warn!(
            domain = %domain,
            visits,
            "Rejecting event with excessive visits"
        ),
        Rejection::TimestampOutOfRange {
            domain,
            timestamp_ms,
        } => tracing::warn!(
            domain = %domain,
            timestamp_ms,
            "Rejecting event with invalid timestamp"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    fn event_at(at: DateTime<Utc>, duration: Option<u64>) -> RawEvent {
        RawEvent {
            event_type: "visit".to_string(),
            domain: "claude.ai".to_string(),
            timestamp: at.timestamp_millis() as u64,
            duration,
            score: None,
            metadata: None,
        }
    }

    #[test]
    fn test_duration_boundary() {
        let validator = EventValidator::default();
        assert!(validator
            .validate(&event_at(now(), Some(1_800_000)), now())
            .is_ok());
        assert_eq!(
            validator.validate(&event_at(now(), Some(1_800_001)), now()),
            Err(Rejection::ExcessiveDuration {
                domain: "claude.ai".to_string(),
                duration_ms: 1_800_001
            })
        );
    }

    #[test]
    fn test_missing_duration_is_zero() {
        let validator = EventValidator::default();
        assert!(validator.validate(&event_at(now(), None), now()).is_ok());
    }

    #[test]
    fn test_timestamp_boundary() {
        let validator = EventValidator::default();
        let week = Duration::days(7);

        let inside = now() - week + Duration::seconds(1);
        assert!(validator.validate(&event_at(inside, None), now()).is_ok());

        let outside = now() - week - Duration::seconds(1);
        assert!(matches!(
            validator.validate(&event_at(outside, None), now()),
            Err(Rejection::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn test_future_skew() {
        let validator = EventValidator::default();
        let ok = now() + Duration::minutes(59);
        assert!(validator.validate(&event_at(ok, None), now()).is_ok());

        let too_far = now() + Duration::minutes(61);
        assert!(validator.validate(&event_at(too_far, None), now()).is_err());
    }

    #[test]
    fn test_empty_domain_checked_first() {
        let validator = EventValidator::default();
        let mut event = event_at(now() - Duration::days(30), Some(9_999_999));
        event.domain = "  ".to_string();
        assert_eq!(validator.validate(&event, now()), Err(Rejection::EmptyDomain));
    }

    #[test]
    fn test_duration_checked_before_timestamp() {
        let validator = EventValidator::default();
        let event = event_at(now() - Duration::days(30), Some(1_800_001));
        assert_eq!(
            validator.validate(&event, now()).unwrap_err().reason(),
            "excessive_duration"
        );
    }

    #[test]
    fn test_visit_threshold_configurable() {
        let validator = EventValidator {
            max_visits: 0,
            ..Default::default()
        };
        let rejection = validator.validate(&event_at(now(), None), now()).unwrap_err();
        assert_eq!(
            rejection.to_string(),
            "Rejected event with excessive visits: 1 on claude.ai"
        );

        let mut non_visit = event_at(now(), None);
        non_visit.event_type = "active_time".to_string();
        assert!(validator.validate(&non_visit, now()).is_ok());
    }

    #[test]
    fn test_partition_keeps_order() {
        let validator = EventValidator::default();
        let mut second = event_at(now() - Duration::minutes(1), None);
        second.domain = "chatgpt.com".to_string();

        let outcome = validator.partition(
            vec![
                event_at(now(), None),
                event_at(now(), Some(2_000_000)),
                second,
            ],
            now(),
        );

        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted[1].domain, "chatgpt.com");
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason(), "excessive_duration");
    }
}
