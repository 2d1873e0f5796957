//! The calendar event source abstraction.
//!
//! An [`EventSource`] lists raw events for a signed-in account given an access
//! token. Sources do not refresh tokens themselves; they report rejection of
//! the credential as an authentication failure and leave recovery to
//! [`crate::fetch::fetch_events`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use calstats_core::{RawCalendarEvent, TimeWindow};
use chrono::{DateTime, Utc};

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Calendar queried when none is configured.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Upper bound on events requested per page.
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Parameters for listing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub calendar_id: String,
    pub window: TimeWindow,
    pub max_results: usize,
    /// Expand recurring series into individual instances.
    pub single_events: bool,
    pub order_by: String,
}

impl EventQuery {
    /// Query for the primary calendar over the given window.
    pub fn new(window: TimeWindow) -> Self {
        Self {
            calendar_id: PRIMARY_CALENDAR.to_string(),
            window,
            max_results: DEFAULT_MAX_RESULTS,
            single_events: true,
            order_by: "startTime".to_string(),
        }
    }

    /// Query over the statistics window around `now`.
    pub fn analysis_window(now: DateTime<Utc>) -> Self {
        Self::new(TimeWindow::analysis_window(now))
    }

    pub fn with_calendar_id(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Lists calendar events using a bearer access token.
pub trait EventSource: Send + Sync {
    /// Returns every event matching the query, following pagination.
    ///
    /// # Errors
    ///
    /// A rejected token must surface as
    /// [`ProviderErrorCode::AuthenticationFailed`](crate::ProviderErrorCode::AuthenticationFailed).
    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        query: &'a EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawCalendarEvent>>>;
}

impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        query: &'a EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawCalendarEvent>>> {
        (**self).list_events(access_token, query)
    }
}
