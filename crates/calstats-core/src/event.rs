//! Raw calendar event records.
//!
//! [`RawCalendarEvent`] mirrors the shape of an event as returned by the
//! Google Calendar events API. Every field is optional: events are loosely
//! shaped and the statistics engine excludes what it cannot use instead of
//! failing on it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Start or end of a calendar event.
///
/// Exactly one of `date_time` (timed event) or `date` (all-day event) is
/// expected to be set. When both are missing the time is unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// RFC 3339 datetime with offset, e.g. `2024-03-13T09:00:00+01:00`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// Calendar date for all-day events, e.g. `2024-03-13`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// IANA timezone name the event was created in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    /// A timed value.
    pub fn timed(date_time: impl Into<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            ..Default::default()
        }
    }

    /// An all-day value.
    pub fn all_day(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Default::default()
        }
    }

    /// Returns true if either `date_time` or `date` is populated.
    pub fn is_present(&self) -> bool {
        self.date_time.is_some() || self.date.is_some()
    }

    /// Parses `date_time` as RFC 3339.
    ///
    /// Returns `None` for all-day values and for strings that do not parse.
    pub fn parse_date_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.date_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Parses `date` as `YYYY-MM-DD`.
    pub fn parse_date(&self) -> Option<NaiveDate> {
        let raw = self.date.as_deref()?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    /// The instant this value denotes.
    ///
    /// `date_time` wins over `date`. All-day dates are midnight UTC.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        if self.date_time.is_some() {
            return self.parse_date_time();
        }
        self.parse_date()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

/// An attendee listed on an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// `accepted`, `declined`, `tentative` or `needsAction`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

impl Attendee {
    /// Creates an attendee with the given email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }
}

/// Creator or organizer of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A calendar event exactly as the provider returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    /// Guests on the event. A `null` in the payload reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<Person>,
    /// Series identifier, set on every occurrence of a recurring event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Attendee>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Attendee>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawCalendarEvent {
    /// Creates a timed event between two RFC 3339 datetimes.
    pub fn timed(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(EventDateTime::timed(start)),
            end: Some(EventDateTime::timed(end)),
            ..Default::default()
        }
    }

    /// Creates an all-day event spanning `[start, end)` dates.
    pub fn all_day(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(EventDateTime::all_day(start)),
            end: Some(EventDateTime::all_day(end)),
            ..Default::default()
        }
    }

    /// Builder method to add an attendee.
    pub fn with_attendee(mut self, attendee: Attendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    /// Builder method to mark this as an occurrence of a recurring series.
    pub fn with_recurring_event_id(mut self, id: impl Into<String>) -> Self {
        self.recurring_event_id = Some(id.into());
        self
    }

    /// Returns true if the event has a start usable for analysis.
    pub fn has_start(&self) -> bool {
        self.start.as_ref().is_some_and(EventDateTime::is_present)
    }

    /// Returns true if the event has at least one attendee.
    pub fn has_guests(&self) -> bool {
        !self.attendees.is_empty()
    }

    /// Returns true if this occurrence belongs to a recurring series.
    pub fn is_recurring(&self) -> bool {
        self.recurring_event_id.is_some()
    }

    /// The instant the event starts, timed or all-day.
    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(EventDateTime::instant)
    }

    /// The parsed timed start, if any.
    pub fn timed_start(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(EventDateTime::parse_date_time)
    }

    /// Whole minutes between timed start and end, truncated toward zero.
    ///
    /// `None` unless both ends are timed and parse.
    pub fn duration_minutes(&self) -> Option<i64> {
        let start = self.timed_start()?;
        let end = self.end.as_ref().and_then(EventDateTime::parse_date_time)?;
        Some((end - start).num_minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn deserialize_google_payload() {
        let json = r#"{
            "id": "evt1",
            "summary": "Standup",
            "status": "confirmed",
            "start": {"dateTime": "2024-03-13T09:00:00+01:00", "timeZone": "Europe/Paris"},
            "end": {"dateTime": "2024-03-13T09:15:00+01:00"},
            "attendees": [{"email": "a@example.com", "responseStatus": "accepted"}],
            "organizer": {"email": "boss@example.com", "displayName": "Boss"},
            "recurringEventId": "series1"
        }"#;

        let event: RawCalendarEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id.as_deref(), Some("evt1"));
        assert!(event.has_guests());
        assert!(event.is_recurring());
        assert_eq!(
            event.attendees[0].response_status.as_deref(),
            Some("accepted")
        );
        assert_eq!(event.duration_minutes(), Some(15));
        assert_eq!(
            event.start_instant(),
            Some(Utc.with_ymd_and_hms(2024, 3, 13, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn deserialize_sparse_payload() {
        let event: RawCalendarEvent = serde_json::from_str(r#"{"attendees": null}"#).unwrap();
        assert!(!event.has_start());
        assert!(!event.has_guests());
        assert_eq!(event.start_instant(), None);
        assert_eq!(event.duration_minutes(), None);
    }

    #[test]
    fn all_day_instant_is_midnight_utc() {
        let event = RawCalendarEvent::all_day("2024-03-15", "2024-03-16");
        assert!(event.has_start());
        assert_eq!(
            event.start_instant(),
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(event.timed_start(), None);
        assert_eq!(event.duration_minutes(), None);
    }

    #[test]
    fn unparseable_datetime_is_present_but_unusable() {
        let event = RawCalendarEvent::timed("not a date", "2024-03-13T10:00:00Z");
        assert!(event.has_start());
        assert_eq!(event.start_instant(), None);
        assert_eq!(event.duration_minutes(), None);
    }

    #[test]
    fn duration_truncates_partial_minutes() {
        let event = RawCalendarEvent::timed("2024-03-13T09:00:00Z", "2024-03-13T09:30:59Z");
        assert_eq!(event.duration_minutes(), Some(30));
    }

    #[test]
    fn timed_end_missing_has_no_duration() {
        let mut event = RawCalendarEvent::timed("2024-03-13T09:00:00Z", "x");
        event.end = Some(EventDateTime::all_day("2024-03-14"));
        assert_eq!(event.duration_minutes(), None);
    }
}
