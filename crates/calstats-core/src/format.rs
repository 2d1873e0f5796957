//! Output formatting for statistics summaries.
//!
//! - **Text**: aligned human-readable report with a weekday histogram
//! - **JSON**: the summary serialized verbatim (camelCase) for other frontends

use serde::{Deserialize, Serialize};

use crate::stats::StatisticsSummary;

const LABEL_WIDTH: usize = 20;
const MAX_BAR: usize = 40;

/// The output format for a statistics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable terminal output.
    #[default]
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Renders a summary in the requested format.
pub fn render(
    summary: &StatisticsSummary,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(format_text(summary)),
        OutputFormat::Json => format_json(summary),
    }
}

/// Renders the summary as pretty-printed JSON.
pub fn format_json(summary: &StatisticsSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

/// Renders the summary as a plain-text report.
pub fn format_text(summary: &StatisticsSummary) -> String {
    let busiest = if summary.busiest_weekday.is_empty() {
        "-"
    } else {
        summary.busiest_weekday.as_str()
    };
    let tod = &summary.time_of_day_distribution;
    let split = &summary.recurring_vs_one_time;

    let mut lines = vec![
        row(
            "Events:",
            format!(
                "{} ({} with guests, {} personal)",
                summary.total_events, summary.meetings_with_guests, summary.personal_events
            ),
        ),
        row("Upcoming:", summary.upcoming_event_count.to_string()),
        row(
            "Average duration:",
            format!("{} min", summary.average_duration_minutes),
        ),
        row("Busiest weekday:", busiest.to_string()),
        row("Meeting-free hours:", summary.meeting_free_hours.to_string()),
        row(
            "Series:",
            format!("{} recurring, {} one-time", split.recurring, split.one_time),
        ),
        row(
            "Time of day:",
            format!(
                "{} morning, {} afternoon, {} evening",
                tod.morning, tod.afternoon, tod.evening
            ),
        ),
        String::new(),
    ];

    for day in &summary.weekday_distribution {
        let bar = "#".repeat(day.count.min(MAX_BAR));
        lines.push(
            format!("{} {:>3} {}", day.weekday, day.count, bar)
                .trim_end()
                .to_string(),
        );
    }

    lines.join("\n")
}

fn row(label: &str, value: String) -> String {
    format!("{label:<LABEL_WIDTH$}{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawCalendarEvent;
    use crate::stats::analyze_events;
    use chrono::{TimeZone, Utc};

    #[test]
    fn text_empty_summary() {
        let output = format_text(&StatisticsSummary::empty());
        insta::assert_snapshot!(output, @r"
        Events:             0 (0 with guests, 0 personal)
        Upcoming:           0
        Average duration:   0 min
        Busiest weekday:    -
        Meeting-free hours: 240
        Series:             0 recurring, 0 one-time
        Time of day:        0 morning, 0 afternoon, 0 evening

        Mon   0
        Tue   0
        Wed   0
        Thu   0
        Fri   0
        Sat   0
        Sun   0
        ");
    }

    #[test]
    fn text_single_event() {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let events = vec![RawCalendarEvent::timed(
            "2024-03-13T09:00:00Z",
            "2024-03-13T10:00:00Z",
        )];
        let output = format_text(&analyze_events(&events, now, &Utc));
        insta::assert_snapshot!(output, @r"
        Events:             1 (0 with guests, 1 personal)
        Upcoming:           0
        Average duration:   60 min
        Busiest weekday:    Wednesday
        Meeting-free hours: 239
        Series:             0 recurring, 1 one-time
        Time of day:        1 morning, 0 afternoon, 0 evening

        Mon   0
        Tue   0
        Wed   1 #
        Thu   0
        Fri   0
        Sat   0
        Sun   0
        ");
    }

    #[test]
    fn histogram_bar_is_capped() {
        let mut summary = StatisticsSummary::empty();
        summary.weekday_distribution[0].count = 100;
        let output = format_text(&summary);
        let monday = output.lines().find(|l| l.starts_with("Mon")).unwrap();
        assert_eq!(monday.matches('#').count(), MAX_BAR);
        assert!(monday.starts_with("Mon 100 #"));
    }

    #[test]
    fn json_output_is_camel_case() {
        let output = render(&StatisticsSummary::empty(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["totalEvents"], 0);
        assert_eq!(value["busiestWeekday"], "");
        assert_eq!(value["timeOfDayDistribution"]["morning"], 0);
    }

    #[test]
    fn output_format_from_config_string() {
        let format: OutputFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }
}
