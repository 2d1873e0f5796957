//! Credential management and calendar fetching for calstats.
//!
//! - [`CredentialManager`] - keeps a [`TokenBundle`] usable, refreshing it when needed
//! - [`EventSource`] - lists raw events with an access token
//! - [`fetch_events`] / [`collect_statistics`] - fetch with the refresh-and-retry rule
//! - [`SessionStore`] - persistence of bundles per account
//! - [`google`] - Google OAuth and Calendar implementations
//!
//! # Flow
//!
//! ```text
//! SessionStore ──load──▶ TokenBundle ──get_valid_token──▶ AccessToken
//!      ▲                      │                               │
//!      └────────save──────────┘                               ▼
//!                                                  EventSource::list_events
//!                                                             │
//!                                                             ▼
//!                                                  analyze_events ─▶ StatisticsSummary
//! ```

pub mod credentials;
pub mod error;
pub mod fetch;
#[cfg(feature = "google")]
pub mod google;
pub mod session;
pub mod source;

pub use credentials::{
    AccessToken, AccountGrant, Clock, CredentialManager, DEFAULT_SKEW_BUFFER, RefreshedToken,
    SystemClock, TokenBundle, TokenErrorState, TokenRefresher,
};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult, ReauthRequired};
pub use fetch::{FetchError, RetryPolicy, collect_statistics, fetch_events};
pub use session::{
    DEFAULT_ACCOUNT, FileSessionStore, MemorySessionStore, SessionGuard, SessionLocks,
    SessionStore, validate_account_name,
};
pub use source::{BoxFuture, DEFAULT_MAX_RESULTS, EventQuery, EventSource, PRIMARY_CALENDAR};
