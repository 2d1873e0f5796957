//! Statistics engine.
//!
//! Reduces a list of [`RawCalendarEvent`]s to a [`StatisticsSummary`]. The
//! reduction is pure: the same events, `now` and timezone always produce the
//! same summary.
//!
//! Events without any start (`dateTime` or `date`) are dropped entirely.
//! All-day events count toward the totals, the guest and recurrence
//! partitions and the upcoming count, but not toward any timed statistic.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::RawCalendarEvent;
use crate::time::{WEEK, weekday_abbrev, weekday_name};

/// Working hours assumed available in the analysis window (30 days × 8 hours).
///
/// Fixed and independent of the actual window length.
pub const ASSUMED_WORKING_HOURS: i64 = 30 * 8;

/// Timed events by local start hour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDayDistribution {
    /// Starts in `[06:00, 12:00)`.
    pub morning: usize,
    /// Starts in `[12:00, 18:00)`.
    pub afternoon: usize,
    /// Starts in `[18:00, 23:00)`.
    pub evening: usize,
}

/// Number of timed event starts on one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayCount {
    /// Three-letter weekday, `Mon` through `Sun`.
    pub weekday: String,
    pub count: usize,
}

/// Split of all events by membership in a recurring series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSplit {
    pub recurring: usize,
    pub one_time: usize,
}

/// Descriptive statistics over a window of calendar events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    pub total_events: usize,
    pub meetings_with_guests: usize,
    pub personal_events: usize,
    /// Mean duration of timed events, rounded half-up. Zero without timed events.
    pub average_duration_minutes: i64,
    /// Full weekday name with the most timed starts, or empty.
    pub busiest_weekday: String,
    pub time_of_day_distribution: TimeOfDayDistribution,
    /// Always seven entries, Monday first.
    pub weekday_distribution: Vec<WeekdayCount>,
    pub recurring_vs_one_time: RecurringSplit,
    pub upcoming_event_count: usize,
    /// Assumed working hours minus whole meeting hours, never negative.
    pub meeting_free_hours: i64,
}

impl StatisticsSummary {
    /// The summary of an empty event list.
    pub fn empty() -> Self {
        Self {
            total_events: 0,
            meetings_with_guests: 0,
            personal_events: 0,
            average_duration_minutes: 0,
            busiest_weekday: String::new(),
            time_of_day_distribution: TimeOfDayDistribution::default(),
            weekday_distribution: weekday_distribution(&[0; 7]),
            recurring_vs_one_time: RecurringSplit::default(),
            upcoming_event_count: 0,
            meeting_free_hours: ASSUMED_WORKING_HOURS,
        }
    }
}

impl Default for StatisticsSummary {
    fn default() -> Self {
        Self::empty()
    }
}

/// Analyzes events relative to `now`, bucketing hours and weekdays in `tz`.
pub fn analyze_events<Tz: TimeZone>(
    events: &[RawCalendarEvent],
    now: DateTime<Utc>,
    tz: &Tz,
) -> StatisticsSummary {
    let mut summary = StatisticsSummary::empty();
    let mut weekday_counts = [0usize; 7];
    let mut timed_minutes: i64 = 0;
    let mut timed_count: i64 = 0;

    for event in events.iter().filter(|e| e.has_start()) {
        summary.total_events += 1;

        if event.has_guests() {
            summary.meetings_with_guests += 1;
        }
        if event.is_recurring() {
            summary.recurring_vs_one_time.recurring += 1;
        }
        if event.start_instant().is_some_and(|start| start > now) {
            summary.upcoming_event_count += 1;
        }

        if let Some(minutes) = event.duration_minutes() {
            timed_minutes += minutes;
            timed_count += 1;
        }

        if let Some(start) = event.timed_start() {
            let local = start.with_timezone(tz);
            weekday_counts[local.weekday().num_days_from_monday() as usize] += 1;
            match local.hour() {
                6..=11 => summary.time_of_day_distribution.morning += 1,
                12..=17 => summary.time_of_day_distribution.afternoon += 1,
                18..=22 => summary.time_of_day_distribution.evening += 1,
                _ => {}
            }
        }
    }

    summary.personal_events = summary.total_events - summary.meetings_with_guests;
    summary.recurring_vs_one_time.one_time =
        summary.total_events - summary.recurring_vs_one_time.recurring;
    summary.average_duration_minutes = rounded_mean(timed_minutes, timed_count);
    summary.busiest_weekday = busiest_weekday(&weekday_counts);
    summary.weekday_distribution = weekday_distribution(&weekday_counts);
    summary.meeting_free_hours = meeting_free_hours(timed_minutes);

    debug!(
        input = events.len(),
        analyzed = summary.total_events,
        timed = timed_count,
        "computed calendar statistics"
    );

    summary
}

/// Mean rounded half-up (toward positive infinity on `.5`).
fn rounded_mean(sum: i64, count: i64) -> i64 {
    if count == 0 {
        return 0;
    }
    (2 * sum + count).div_euclid(2 * count)
}

/// First weekday in Monday→Sunday order holding the strictly largest count.
fn busiest_weekday(counts: &[usize; 7]) -> String {
    let mut best: Option<(usize, usize)> = None;
    for (idx, &count) in counts.iter().enumerate() {
        if count > best.map_or(0, |(_, c)| c) {
            best = Some((idx, count));
        }
    }
    best.map(|(idx, _)| weekday_name(WEEK[idx]).to_string())
        .unwrap_or_default()
}

fn weekday_distribution(counts: &[usize; 7]) -> Vec<WeekdayCount> {
    WEEK.iter()
        .zip(counts)
        .map(|(day, &count)| WeekdayCount {
            weekday: weekday_abbrev(*day).to_string(),
            count,
        })
        .collect()
}

fn meeting_free_hours(timed_minutes: i64) -> i64 {
    let meeting_hours = timed_minutes.div_euclid(60);
    (ASSUMED_WORKING_HOURS - meeting_hours).max(0)
}
