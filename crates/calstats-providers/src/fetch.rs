//! Fetching events with a managed credential.
//!
//! [`fetch_events`] is the single place where an upstream authentication
//! failure is turned into a refresh and a retry. The rule is governed by
//! [`RetryPolicy`]:
//!
//! - a token that was already valid when acquired may be refreshed and the
//!   request retried, up to `max_auth_retries` times;
//! - a token minted during acquisition is not retried, its rejection is final;
//! - any other upstream error is surfaced as is, without retry.

use calstats_core::{RawCalendarEvent, StatisticsSummary, analyze_events};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialManager, TokenBundle, TokenRefresher};
use crate::error::{ProviderError, ReauthRequired};
use crate::source::{EventQuery, EventSource};

/// How many times an authentication failure may be recovered by refreshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_auth_retries: usize,
}

impl RetryPolicy {
    /// Never refresh on an upstream authentication failure.
    pub const NO_RETRY: Self = Self {
        max_auth_retries: 0,
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_auth_retries: 1,
        }
    }
}

/// Why events could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The session must be re-established by signing in.
    #[error(transparent)]
    ReauthRequired(#[from] ReauthRequired),

    /// The calendar provider failed for a reason other than the credential.
    #[error("calendar provider unavailable: {0}")]
    UpstreamUnavailable(#[source] ProviderError),
}

impl FetchError {
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, Self::ReauthRequired(_))
    }
}

/// Lists events from `source`, keeping `bundle` valid along the way.
///
/// The bundle is updated in place whenever a refresh happens, including a
/// failed one; callers persist it regardless of the outcome.
pub async fn fetch_events<R, S>(
    manager: &CredentialManager<R>,
    source: &S,
    bundle: &mut TokenBundle,
    query: &EventQuery,
    policy: RetryPolicy,
) -> Result<Vec<RawCalendarEvent>, FetchError>
where
    R: TokenRefresher,
    S: EventSource + ?Sized,
{
    let mut token = manager.get_valid_token(bundle).await?;
    let mut retries = 0;

    loop {
        debug!(
            calendar = %query.calendar_id,
            time_min = %query.window.start,
            time_max = %query.window.end,
            attempt = retries + 1,
            "listing events"
        );
        match source.list_events(token.as_str(), query).await {
            Ok(events) => {
                info!(count = events.len(), "fetched calendar events");
                return Ok(events);
            }
            Err(e) if e.is_auth_failure() => {
                if (retries == 0 && token.was_refreshed()) || retries >= policy.max_auth_retries {
                    warn!(
                        retries,
                        fresh = token.was_refreshed(),
                        "provider rejected access token, sign-in required"
                    );
                    return Err(ReauthRequired.into());
                }
                retries += 1;
                info!(retries, "provider rejected access token, refreshing and retrying");
                token = manager.refresh(bundle).await?;
            }
            Err(e) => {
                warn!(code = %e.code(), "calendar request failed: {}", e.message());
                return Err(FetchError::UpstreamUnavailable(e));
            }
        }
    }
}

/// Fetches events and computes their statistics.
pub async fn collect_statistics<R, S, Tz>(
    manager: &CredentialManager<R>,
    source: &S,
    bundle: &mut TokenBundle,
    query: &EventQuery,
    policy: RetryPolicy,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<StatisticsSummary, FetchError>
where
    R: TokenRefresher,
    S: EventSource + ?Sized,
    Tz: TimeZone,
{
    let events = fetch_events(manager, source, bundle, query, policy).await?;
    Ok(analyze_events(&events, now, tz))
}
