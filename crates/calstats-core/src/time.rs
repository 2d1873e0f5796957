//! Time windows and weekday naming.
//!
//! [`TimeWindow`] describes the range of events requested from the provider.
//! The analysis window is fixed policy: [`LOOKBACK_DAYS`] before now through
//! [`LOOKAHEAD_DAYS`] after it.

use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Days of history included in the fetch window.
pub const LOOKBACK_DAYS: i64 = 30;

/// Days of upcoming events included in the fetch window.
pub const LOOKAHEAD_DAYS: i64 = 7;

/// Weekdays in the order statistics are reported.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// A half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The window statistics are computed over: 30 days back, 7 days ahead.
    pub fn analysis_window(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(LOOKBACK_DAYS),
            end: now + Duration::days(LOOKAHEAD_DAYS),
        }
    }
}

/// Full English name of a weekday, e.g. `Wednesday`.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Three-letter abbreviation of a weekday, e.g. `Wed`.
pub fn weekday_abbrev(day: Weekday) -> &'static str {
    &weekday_name(day)[..3]
}
