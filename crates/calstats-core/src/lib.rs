//! Core types: raw events, fetch window, statistics engine, rendering

pub mod event;
pub mod format;
pub mod stats;
pub mod time;
pub mod tracing;

pub use event::{Attendee, EventDateTime, Person, RawCalendarEvent};
pub use format::{OutputFormat, format_json, format_text, render};
pub use stats::{
    ASSUMED_WORKING_HOURS, RecurringSplit, StatisticsSummary, TimeOfDayDistribution, WeekdayCount,
    analyze_events,
};
pub use time::{LOOKAHEAD_DAYS, LOOKBACK_DAYS, TimeWindow};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
