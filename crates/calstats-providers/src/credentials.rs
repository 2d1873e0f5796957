//! Access-token lifecycle.
//!
//! A [`TokenBundle`] holds the delegated credential for one signed-in account.
//! It is created from an interactive sign-in with [`TokenBundle::initialize`]
//! and afterwards changed only by [`CredentialManager::refresh`].
//!
//! [`CredentialManager::get_valid_token`] hands out an access token that is
//! valid for at least the skew buffer, refreshing at most once per call, or
//! [`ReauthRequired`] when only a new sign-in can help. Refresh failures never
//! escape as errors: they mark the bundle [`TokenErrorState::RefreshFailed`]
//! and every later call answers `ReauthRequired` without touching the network.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{ProviderResult, ReauthRequired};
use crate::source::BoxFuture;

/// Default margin before expiry at which a token is refreshed proactively.
pub const DEFAULT_SKEW_BUFFER: Duration = Duration::minutes(5);

/// Why a bundle can no longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenErrorState {
    /// A refresh attempt failed; only a fresh sign-in clears this.
    RefreshFailed,
}

/// Tokens granted by a completed interactive sign-in.
#[derive(Clone)]
pub struct AccountGrant {
    pub access_token: String,
    /// Absent when the provider withheld it.
    pub refresh_token: Option<String>,
    /// Provider-reported access token lifetime.
    pub expires_in_secs: i64,
    pub scopes: Vec<String>,
}

impl fmt::Debug for AccountGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in_secs", &self.expires_in_secs)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Result of a successful call to the token endpoint.
#[derive(Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in_secs: i64,
    /// Set only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("expires_in_secs", &self.expires_in_secs)
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// The credential state of one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub access_token: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub error_state: Option<TokenErrorState>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_refresh: DateTime<Utc>,
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("has_access_token", &self.access_token.is_some())
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("error_state", &self.error_state)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl TokenBundle {
    /// Builds the bundle for a freshly completed sign-in.
    ///
    /// A grant with an unusable lifetime yields a bundle already marked
    /// [`TokenErrorState::RefreshFailed`].
    pub fn initialize(grant: AccountGrant, now: DateTime<Utc>) -> Self {
        if grant.refresh_token.is_none() {
            warn!("sign-in returned no refresh token; the session will need a new sign-in once the access token expires");
        }
        let expires_at = expiry_after(now, grant.expires_in_secs);
        if expires_at.is_none() {
            error!(
                expires_in_secs = grant.expires_in_secs,
                "sign-in returned an unusable token lifetime"
            );
        }
        Self {
            access_token: Some(grant.access_token),
            access_token_expires_at: expires_at.unwrap_or(now),
            refresh_token: grant.refresh_token,
            error_state: expires_at.is_none().then_some(TokenErrorState::RefreshFailed),
            scopes: grant.scopes,
            last_refresh: now,
        }
    }

    /// Returns true once a refresh has failed.
    pub fn has_failed(&self) -> bool {
        self.error_state.is_some()
    }

    /// Returns true if neither token is present.
    pub fn is_terminal(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// Returns true if the bundle could still yield a token without a sign-in.
    pub fn is_recoverable(&self) -> bool {
        !self.has_failed() && !self.is_terminal()
    }

    /// The access token, if it stays valid beyond `now + skew`.
    pub fn current_token(&self, now: DateTime<Utc>, skew: Duration) -> Option<&str> {
        if self.has_failed() {
            return None;
        }
        let token = self.access_token.as_deref()?;
        (now < self.access_token_expires_at - skew).then_some(token)
    }

    /// Time left until the access token expires (negative once expired).
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.access_token_expires_at - now
    }

    fn apply_refresh(
        &mut self,
        refreshed: RefreshedToken,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.access_token = Some(refreshed.access_token);
        self.access_token_expires_at = expires_at;
        if let Some(rotated) = refreshed.refresh_token {
            self.refresh_token = Some(rotated);
        }
        self.error_state = None;
        self.last_refresh = now;
    }
}

/// Expiry of a token issued at `now` with a provider-reported lifetime.
///
/// `None` unless the lifetime is positive and the instant is representable.
fn expiry_after(now: DateTime<Utc>, expires_in_secs: i64) -> Option<DateTime<Utc>> {
    if expires_in_secs <= 0 {
        return None;
    }
    now.checked_add_signed(Duration::try_seconds(expires_in_secs)?)
}

/// An access token handed out by [`CredentialManager`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    refreshed: bool,
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns true if the token was minted during the call that returned it.
    pub fn was_refreshed(&self) -> bool {
        self.refreshed
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("refreshed", &self.refreshed)
            .finish_non_exhaustive()
    }
}

/// Exchanges a refresh token for a new access token.
pub trait TokenRefresher: Send + Sync {
    /// Performs one call to the token endpoint.
    fn refresh_access_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>>;
}

impl<T: TokenRefresher + ?Sized> TokenRefresher for Arc<T> {
    fn refresh_access_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        (**self).refresh_access_token(refresh_token)
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Keeps token bundles usable.
pub struct CredentialManager<R> {
    refresher: R,
    clock: Arc<dyn Clock>,
    skew: Duration,
}

impl<R: TokenRefresher> CredentialManager<R> {
    /// Creates a manager using the system clock and the default skew buffer.
    pub fn new(refresher: R) -> Self {
        Self {
            refresher,
            clock: Arc::new(SystemClock),
            skew: DEFAULT_SKEW_BUFFER,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn skew(&self) -> Duration {
        self.skew
    }

    pub fn refresher(&self) -> &R {
        &self.refresher
    }

    /// Builds a bundle from a completed sign-in at the current instant.
    pub fn initialize(&self, grant: AccountGrant) -> TokenBundle {
        TokenBundle::initialize(grant, self.clock.now())
    }

    /// Returns a token valid beyond the skew buffer, refreshing at most once.
    pub async fn get_valid_token(
        &self,
        bundle: &mut TokenBundle,
    ) -> Result<AccessToken, ReauthRequired> {
        if bundle.has_failed() {
            debug!("token bundle is in error state, sign-in required");
            return Err(ReauthRequired);
        }
        if bundle.is_terminal() {
            debug!("token bundle holds no tokens, sign-in required");
            return Err(ReauthRequired);
        }

        let now = self.clock.now();
        if let Some(token) = bundle.current_token(now, self.skew) {
            debug!(
                minutes_left = bundle.time_until_expiry(now).num_minutes(),
                "access token still valid"
            );
            return Ok(AccessToken {
                value: token.to_string(),
                refreshed: false,
            });
        }

        info!("access token missing, expired or expiring soon, refreshing");
        self.refresh(bundle).await
    }

    /// Mints a new access token from the bundle's refresh token.
    ///
    /// On any failure the bundle is marked [`TokenErrorState::RefreshFailed`].
    pub async fn refresh(&self, bundle: &mut TokenBundle) -> Result<AccessToken, ReauthRequired> {
        if bundle.has_failed() {
            debug!("refresh skipped, bundle already failed");
            return Err(ReauthRequired);
        }
        let Some(refresh_token) = bundle.refresh_token.clone() else {
            warn!("no refresh token available, sign-in required");
            bundle.error_state = Some(TokenErrorState::RefreshFailed);
            return Err(ReauthRequired);
        };

        let now = self.clock.now();
        match self.refresher.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => {
                let Some(expires_at) = expiry_after(now, refreshed.expires_in_secs) else {
                    error!(
                        expires_in_secs = refreshed.expires_in_secs,
                        "token refresh returned an unusable lifetime"
                    );
                    bundle.error_state = Some(TokenErrorState::RefreshFailed);
                    return Err(ReauthRequired);
                };
                info!(
                    expires_in_secs = refreshed.expires_in_secs,
                    rotated = refreshed.refresh_token.is_some(),
                    "refreshed access token"
                );
                bundle.apply_refresh(refreshed, expires_at, now);
                let value = bundle.access_token.clone().unwrap_or_default();
                Ok(AccessToken {
                    value,
                    refreshed: true,
                })
            }
            Err(e) => {
                error!(code = %e.code(), "token refresh failed: {}", e.message());
                bundle.error_state = Some(TokenErrorState::RefreshFailed);
                Err(ReauthRequired)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::ProviderError;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    fn manager(refresher: Arc<ScriptedRefresher>) -> CredentialManager<Arc<ScriptedRefresher>> {
        CredentialManager::new(refresher).with_clock(Arc::new(FixedClock(now())))
    }

    #[test]
    fn initialize_computes_expiry_from_lifetime() {
        let grant = AccountGrant {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_in_secs: 3599,
            scopes: vec!["calendar.readonly".to_string()],
        };
        let bundle = TokenBundle::initialize(grant, now());

        assert_eq!(bundle.access_token.as_deref(), Some("at"));
        assert_eq!(bundle.refresh_token.as_deref(), Some("rt"));
        assert_eq!(bundle.access_token_expires_at, now() + Duration::seconds(3599));
        assert!(bundle.error_state.is_none());
        assert!(bundle.is_recoverable());
    }

    #[test]
    fn initialize_rejects_unusable_lifetime() {
        for expires_in_secs in [0, -3600, i64::MAX] {
            let grant = AccountGrant {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_in_secs,
                scopes: vec![],
            };
            let bundle = TokenBundle::initialize(grant, now());
            assert_eq!(bundle.error_state, Some(TokenErrorState::RefreshFailed));
            assert_eq!(bundle.current_token(now(), DEFAULT_SKEW_BUFFER), None);
        }
    }

    #[tokio::test]
    async fn valid_token_is_returned_unchanged() {
        let refresher = ScriptedRefresher::new();
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("at"), now() + Duration::minutes(30), Some("rt"));
        let before = b.clone();

        let token = manager.get_valid_token(&mut b).await.unwrap();
        assert_eq!(token.as_str(), "at");
        assert!(!token.was_refreshed());
        assert_eq!(refresher.calls(), 0);
        assert_eq!(b, before);
    }

    #[tokio::test]
    async fn token_inside_skew_buffer_is_refreshed() {
        let refresher = ScriptedRefresher::new();
        refresher.push_ok("new-at", None);
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("at"), now() + Duration::minutes(4), Some("rt"));

        let token = manager.get_valid_token(&mut b).await.unwrap();
        assert_eq!(token.as_str(), "new-at");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_token_triggers_exactly_one_refresh() {
        let refresher = ScriptedRefresher::new();
        refresher.push_ok("fresh", None);
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("stale"), now() - Duration::minutes(6), Some("rt"));

        let token = manager.get_valid_token(&mut b).await.unwrap();
        assert_eq!(token.as_str(), "fresh");
        assert!(token.was_refreshed());
        assert_eq!(refresher.calls(), 1);
        assert_eq!(refresher.seen(), vec!["rt".to_string()]);
        assert_eq!(b.access_token.as_deref(), Some("fresh"));
        assert_eq!(b.access_token_expires_at, now() + Duration::seconds(3600));
        assert_eq!(b.last_refresh, now());

        // The refreshed token is now served from the bundle.
        let again = manager.get_valid_token(&mut b).await.unwrap();
        assert_eq!(again.as_str(), "fresh");
        assert!(!again.was_refreshed());
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn missing_access_token_is_minted() {
        let refresher = ScriptedRefresher::new();
        refresher.push_ok("minted", None);
        let manager = manager(refresher.clone());
        let mut b = bundle(None, now() + Duration::hours(1), Some("rt"));

        let token = manager.get_valid_token(&mut b).await.unwrap();
        assert_eq!(token.as_str(), "minted");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_needs_reauth_offline() {
        let refresher = ScriptedRefresher::new();
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("stale"), now() - Duration::minutes(6), None);

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(refresher.calls(), 0);
        assert_eq!(b.error_state, Some(TokenErrorState::RefreshFailed));
    }

    #[tokio::test]
    async fn terminal_bundle_needs_reauth() {
        let refresher = ScriptedRefresher::new();
        let manager = manager(refresher.clone());
        let mut b = bundle(None, now() + Duration::hours(1), None);

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_marks_bundle_and_stays_offline() {
        let refresher = ScriptedRefresher::new();
        refresher.push_err(ProviderError::authentication("invalid_grant").with_status(400));
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("stale"), now() - Duration::minutes(1), Some("rt"));

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(b.error_state, Some(TokenErrorState::RefreshFailed));
        assert_eq!(refresher.calls(), 1);

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(manager.refresh(&mut b).await, Err(ReauthRequired));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn out_of_range_lifetime_fails_refresh() {
        let refresher = ScriptedRefresher::new();
        refresher.push_lifetime("huge", i64::MAX);
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("stale"), now() - Duration::minutes(6), Some("rt"));

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(b.error_state, Some(TokenErrorState::RefreshFailed));
        assert_eq!(b.access_token.as_deref(), Some("stale"));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn negative_lifetime_is_never_handed_out() {
        let refresher = ScriptedRefresher::new();
        refresher.push_lifetime("already-expired", -60);
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("stale"), now() - Duration::minutes(6), Some("rt"));

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(b.error_state, Some(TokenErrorState::RefreshFailed));

        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn failed_bundle_never_trusts_present_token() {
        let refresher = ScriptedRefresher::new();
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("at"), now() + Duration::hours(1), Some("rt"));
        b.error_state = Some(TokenErrorState::RefreshFailed);

        assert_eq!(b.current_token(now(), DEFAULT_SKEW_BUFFER), None);
        assert_eq!(manager.get_valid_token(&mut b).await, Err(ReauthRequired));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_unless_rotated() {
        let refresher = ScriptedRefresher::new();
        refresher.push_ok("at-2", None);
        refresher.push_ok("at-3", Some("rt-rotated"));
        let manager = manager(refresher.clone());
        let mut b = bundle(Some("at-1"), now() + Duration::hours(1), Some("rt"));

        manager.refresh(&mut b).await.unwrap();
        assert_eq!(b.refresh_token.as_deref(), Some("rt"));

        manager.refresh(&mut b).await.unwrap();
        assert_eq!(b.access_token.as_deref(), Some("at-3"));
        assert_eq!(b.refresh_token.as_deref(), Some("rt-rotated"));
        assert_eq!(refresher.seen(), vec!["rt".to_string(), "rt".to_string()]);
    }

    #[tokio::test]
    async fn custom_skew_changes_refresh_point() {
        let refresher = ScriptedRefresher::new();
        let manager = manager(refresher.clone()).with_skew(Duration::zero());
        let mut b = bundle(Some("at"), now() + Duration::minutes(1), Some("rt"));

        let token = manager.get_valid_token(&mut b).await.unwrap();
        assert_eq!(token.as_str(), "at");
        assert_eq!(refresher.calls(), 0);
    }

    #[test]
    fn bundle_serializes_expiry_as_millis() {
        let b = bundle(
            Some("at"),
            Utc.timestamp_millis_opt(1_710_331_200_000).unwrap(),
            Some("rt"),
        );
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["accessTokenExpiresAt"], 1_710_331_200_000_i64);
        assert!(json["errorState"].is_null());

        let mut failed = b.clone();
        failed.error_state = Some(TokenErrorState::RefreshFailed);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["errorState"], "REFRESH_FAILED");
        let back: TokenBundle = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);
    }

    #[test]
    fn debug_output_hides_tokens() {
        let b = bundle(Some("secret-access"), now(), Some("secret-refresh"));
        let rendered = format!("{:?}", b);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("has_refresh_token: true"));
    }
}
