//! Score and activity read models.
//!
//! Everything here is derived from raw events on read. Scores are carried as
//! `f64` until presentation and rounded only when serialized.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Serialize, Serializer};

/// Weight applied to each millisecond of active time.
pub const ACTIVE_MS_WEIGHT: f64 = 0.001;

/// Points awarded per visit.
pub const VISIT_WEIGHT: f64 = 50.0;

/// Aggregation window for scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreWindow {
    /// Since the start of the current UTC calendar day.
    Today,
    /// Trailing 7 days.
    Week,
    /// Trailing 30 days.
    Month,
    Total,
}

impl ScoreWindow {
    /// Lower bound of the window, `None` for unbounded.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScoreWindow::Today => Some(shared::time::start_of_utc_day(now)),
            ScoreWindow::Week => Some(now - Duration::days(7)),
            ScoreWindow::Month => Some(now - Duration::days(30)),
            ScoreWindow::Total => None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.since(now).map_or(true, |since| at >= since)
    }
}

/// Running sums over a set of events.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivityTotals {
    pub active_ms: i64,
    pub total_ms: i64,
    pub visits: i64,
    pub events: usize,
}

impl ActivityTotals {
    /// Unrounded score.
    pub fn raw_score(&self) -> f64 {
        self.active_ms as f64 * ACTIVE_MS_WEIGHT + self.visits as f64 * VISIT_WEIGHT
    }

    /// Presentation score, rounded to the nearest integer.
    pub fn score(&self) -> i64 {
        self.raw_score().round() as i64
    }

    /// Active share of total time as a percentage, capped at 100.
    pub fn efficiency(&self) -> u8 {
        if self.total_ms <= 0 {
            return 0;
        }
        let pct = (self.active_ms as f64 / self.total_ms as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

pub(crate) fn round_score<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(score.round() as i64)
}

/// Aggregated activity for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDay {
    pub date: NaiveDate,
    #[serde(serialize_with = "round_score")]
    pub score: f64,
}

/// Summary over a daily activity series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub total_score: i64,
    pub days_with_activity: u32,
    pub average_score: i64,
    pub total_days: u32,
}

/// Daily activity series plus streak.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    pub activity: Vec<ActivityDay>,
    pub stats: ActivitySummary,
    pub streak: u32,
}

/// Statistics for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub score: i64,
    pub visits: i64,
    pub active_time: i64,
    pub total_time: i64,
    pub events: usize,
}

impl From<ActivityTotals> for WindowStats {
    fn from(totals: ActivityTotals) -> Self {
        Self {
            score: totals.score(),
            visits: totals.visits,
            active_time: totals.active_ms,
            total_time: totals.total_ms,
            events: totals.events,
        }
    }
}

/// Account statistics served to the extension and dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    pub total_score: i64,
    pub today_score: i64,
    pub week_score: i64,
    pub month_score: i64,
    pub total_visits: i64,
    pub today_visits: i64,
    pub total_time: i64,
    pub today_time: i64,
    /// Active time today.
    pub active_time: i64,
    /// Active share of today's time.
    pub efficiency: u8,
    pub streak: u32,
}
