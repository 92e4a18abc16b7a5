//! Score aggregation.
//!
//! Every read path funnels through [`aggregate`] so the formula lives in one
//! place.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;

use crate::models::{
    AccountStats, ActivityDay, ActivityReport, ActivitySummary, ActivityTotals, NewUsageEvent,
    ScoreWindow, UsageEvent,
};

/// Anything that can be folded into [`ActivityTotals`].
pub trait Scorable {
    fn occurred_at(&self) -> DateTime<Utc>;
    fn active_ms(&self) -> i64;
    fn total_ms(&self) -> i64;
    fn visits(&self) -> i64;
}

impl Scorable for UsageEvent {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
    fn active_ms(&self) -> i64 {
        self.active_ms
    }
    fn total_ms(&self) -> i64 {
        self.total_ms
    }
    fn visits(&self) -> i64 {
        i64::from(self.visits)
    }
}

impl Scorable for NewUsageEvent {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
    fn active_ms(&self) -> i64 {
        self.active_ms
    }
    fn total_ms(&self) -> i64 {
        self.total_ms
    }
    fn visits(&self) -> i64 {
        i64::from(self.visits)
    }
}

impl<T: Scorable + ?Sized> Scorable for &T {
    fn occurred_at(&self) -> DateTime<Utc> {
        (**self).occurred_at()
    }
    fn active_ms(&self) -> i64 {
        (**self).active_ms()
    }
    fn total_ms(&self) -> i64 {
        (**self).total_ms()
    }
    fn visits(&self) -> i64 {
        (**self).visits()
    }
}

/// Sums the events matching `predicate`.
pub fn aggregate<I, E, P>(events: I, mut predicate: P) -> ActivityTotals
where
    I: IntoIterator<Item = E>,
    E: Scorable,
    P: FnMut(&E) -> bool,
{
    events
        .into_iter()
        .filter(|event| predicate(event))
        .fold(ActivityTotals::default(), |mut totals, event| {
            accumulate(&mut totals, &event);
            totals
        })
}

fn accumulate<E: Scorable>(totals: &mut ActivityTotals, event: &E) {
    totals.active_ms += event.active_ms().max(0);
    totals.total_ms += event.total_ms().max(0);
    totals.visits += event.visits().max(0);
    totals.events += 1;
}

pub fn aggregate_window<I, E>(events: I, window: ScoreWindow, now: DateTime<Utc>) -> ActivityTotals
where
    I: IntoIterator<Item = E>,
    E: Scorable,
{
    aggregate(events, |event| window.contains(event.occurred_at(), now))
}

/// One entry per UTC day for the trailing `days` days ending at `today`,
/// ascending, with zero-filled gaps.
pub fn daily_activity<I, E>(events: I, days: u32, today: NaiveDate) -> ActivityReport
where
    I: IntoIterator<Item = E>,
    E: Scorable,
{
    let per_day = totals_by_day(events);
    let activity: Vec<ActivityDay> = shared::time::trailing_days(today, days)
        .into_iter()
        .map(|date| ActivityDay {
            date,
            score: per_day.get(&date).map_or(0.0, ActivityTotals::raw_score),
        })
        .collect();

    let total: f64 = activity.iter().map(|day| day.score).sum();
    let days_with_activity = activity.iter().filter(|day| day.score > 0.0).count() as u32;
    let average = if days_with_activity == 0 {
        0.0
    } else {
        total / f64::from(days_with_activity)
    };

    let streak = calculate_streak(&activity, today);
    ActivityReport {
        stats: ActivitySummary {
            total_score: total.round() as i64,
            days_with_activity,
            average_score: average.round() as i64,
            total_days: activity.len() as u32,
        },
        activity,
        streak,
    }
}

/// Consecutive days ending at `today` with a positive score.
///
/// Days absent from `days` count as zero.
pub fn calculate_streak(days: &[ActivityDay], today: NaiveDate) -> u32 {
    let scores: HashMap<NaiveDate, f64> = days.iter().map(|day| (day.date, day.score)).collect();

    let mut streak = 0;
    let mut cursor = today;
    while scores.get(&cursor).copied().unwrap_or(0.0) > 0.0 {
        streak += 1;
        match cursor.checked_sub_signed(Duration::days(1)) {
            Some(previous) => cursor = previous,
            None => break,
        }
    }
    streak
}

/// Statistics for the GET sync and profile reads.
pub fn account_stats(events: &[UsageEvent], now: DateTime<Utc>) -> AccountStats {
    let today = aggregate_window(events, ScoreWindow::Today, now);
    let week = aggregate_window(events, ScoreWindow::Week, now);
    let month = aggregate_window(events, ScoreWindow::Month, now);
    let total = aggregate_window(events, ScoreWindow::Total, now);

    let today_date = shared::time::utc_day(now);
    let days: Vec<ActivityDay> = totals_by_day(events)
        .into_iter()
        .map(|(date, totals)| ActivityDay {
            date,
            score: totals.raw_score(),
        })
        .collect();

    AccountStats {
        total_score: total.score(),
        today_score: today.score(),
        week_score: week.score(),
        month_score: month.score(),
        total_visits: total.visits,
        today_visits: today.visits,
        total_time: total.total_ms,
        today_time: today.total_ms,
        active_time: today.active_ms,
        efficiency: today.efficiency(),
        streak: calculate_streak(&days, today_date),
    }
}

fn totals_by_day<I, E>(events: I) -> HashMap<NaiveDate, ActivityTotals>
where
    I: IntoIterator<Item = E>,
    E: Scorable,
{
    let mut per_day: HashMap<NaiveDate, ActivityTotals> = HashMap::new();
    for event in events {
        let day = shared::time::utc_day(event.occurred_at());
        accumulate(per_day.entry(day).or_default(), &event);
    }
    per_day
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn usage(at: DateTime<Utc>, active_ms: i64, visits: i32) -> UsageEvent {
        UsageEvent {
            id: 0,
            device_id: None,
            account_id: 1,
            occurred_at: at,
            domain: "claude.ai".to_string(),
            active_ms,
            total_ms: active_ms,
            visits,
            client_version: Some("extension_v1".to_string()),
            created_at: at,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn day(d: u32, score: f64) -> ActivityDay {
        ActivityDay {
            date: date(d),
            score,
        }
    }

    #[test]
    fn test_aggregate_formula() {
        let at = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let events = vec![
            usage(at, 60_000, 1),
            usage(at, 60_000, 1),
            usage(at, 0, 1),
            usage(at, 0, 0),
        ];
        let totals = aggregate(&events, |_| true);
        assert_eq!(totals.active_ms, 120_000);
        assert_eq!(totals.visits, 3);
        assert_eq!(totals.events, 4);
        assert_eq!(totals.score(), 270);
    }

    #[test]
    fn test_aggregate_predicate() {
        let at = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let events = vec![usage(at, 1_000, 1), usage(at, 2_000, 0)];
        let totals = aggregate(&events, |event| event.visits > 0);
        assert_eq!(totals.active_ms, 1_000);
        assert_eq!(totals.events, 1);
    }

    #[test]
    fn test_today_window_uses_calendar_day() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 1, 0, 0).unwrap();
        let events = vec![
            usage(Utc.with_ymd_and_hms(2025, 1, 5, 0, 30, 0).unwrap(), 0, 1),
            usage(Utc.with_ymd_and_hms(2025, 1, 4, 23, 30, 0).unwrap(), 0, 1),
        ];
        assert_eq!(aggregate_window(&events, ScoreWindow::Today, now).visits, 1);
        assert_eq!(aggregate_window(&events, ScoreWindow::Week, now).visits, 2);
    }

    #[test]
    fn test_streak_consecutive() {
        let days = vec![day(3, 10.0), day(4, 5.0), day(5, 2.0)];
        assert_eq!(calculate_streak(&days, date(5)), 3);
    }

    #[test]
    fn test_streak_stops_at_gap() {
        let days = vec![day(1, 10.0), day(4, 5.0), day(5, 2.0)];
        assert_eq!(calculate_streak(&days, date(5)), 2);
    }

    #[test]
    fn test_streak_stops_at_zero() {
        let days = vec![day(3, 10.0), day(4, 5.0), day(5, 2.0), day(2, 0.0)];
        assert_eq!(calculate_streak(&days, date(5)), 3);

        let zero_mid = vec![day(3, 10.0), day(4, 0.0), day(5, 2.0)];
        assert_eq!(calculate_streak(&zero_mid, date(5)), 1);
    }

    #[test]
    fn test_streak_zero_when_today_empty() {
        let days = vec![day(3, 10.0), day(4, 5.0)];
        assert_eq!(calculate_streak(&days, date(5)), 0);
    }

    #[test]
    fn test_daily_activity_zero_fills() {
        let events = vec![
            usage(Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap(), 0, 1),
            usage(Utc.with_ymd_and_hms(2025, 1, 5, 9, 0, 0).unwrap(), 1_000, 0),
            usage(Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap(), 0, 1),
        ];
        let report = daily_activity(&events, 4, date(5));

        let dates: Vec<_> = report.activity.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date(2), date(3), date(4), date(5)]);
        assert_eq!(report.activity[0].score, 0.0);
        assert_eq!(report.activity[1].score, 50.0);
        assert_eq!(report.activity[3].score, 51.0);
        assert_eq!(report.stats.total_score, 101);
        assert_eq!(report.stats.days_with_activity, 2);
        assert_eq!(report.stats.average_score, 51);
        assert_eq!(report.stats.total_days, 4);
        assert_eq!(report.streak, 1);
    }

    #[test]
    fn test_account_stats() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let events = vec![
            usage(now - Duration::hours(1), 120_000, 1),
            usage(now - Duration::days(1), 0, 1),
            usage(now - Duration::days(10), 0, 1),
            usage(now - Duration::days(40), 0, 1),
        ];
        let stats = account_stats(&events, now);
        assert_eq!(stats.today_score, 170);
        assert_eq!(stats.week_score, 220);
        assert_eq!(stats.month_score, 270);
        assert_eq!(stats.total_score, 320);
        assert_eq!(stats.total_visits, 4);
        assert_eq!(stats.today_visits, 1);
        assert_eq!(stats.active_time, 120_000);
        assert_eq!(stats.efficiency, 100);
        assert_eq!(stats.streak, 2);
    }

    #[test]
    fn test_account_stats_no_events() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let stats = account_stats(&[], now);
        assert_eq!(stats.total_score, 0);
        assert_eq!(stats.efficiency, 0);
        assert_eq!(stats.streak, 0);
    }
}
