//! Google collaborators: OAuth sign-in and refresh, and the Calendar events API.
//!
//! # Sign-in
//!
//! 1. The user registers their own OAuth client (ID and secret) with Google
//! 2. [`GoogleOAuth::authorize`] runs the PKCE flow over a loopback redirect
//! 3. The returned grant becomes a [`TokenBundle`](crate::TokenBundle)
//! 4. The bundle is persisted through a [`SessionStore`](crate::SessionStore)
//!
//! # Example
//!
//! ```ignore
//! use calstats_providers::google::{GoogleCalendarClient, GoogleConfig, GoogleOAuth, OAuthCredentials};
//! use calstats_providers::{CredentialManager, EventQuery, RetryPolicy, fetch_events};
//!
//! let config = GoogleConfig::new(OAuthCredentials::new(client_id, client_secret));
//! let manager = CredentialManager::new(GoogleOAuth::new(&config)?);
//! let source = GoogleCalendarClient::new(&config)?;
//!
//! let query = EventQuery::analysis_window(Utc::now());
//! let events = fetch_events(&manager, &source, &mut bundle, &query, RetryPolicy::default()).await?;
//! ```

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{GoogleOAuth, PkceFlow};
