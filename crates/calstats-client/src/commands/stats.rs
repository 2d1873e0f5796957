//! The statistics command.

use calstats_core::{OutputFormat, StatisticsSummary, render};
use calstats_providers::google::{GoogleCalendarClient, GoogleOAuth};
use calstats_providers::{
    CredentialManager, EventQuery, EventSource, ReauthRequired, RetryPolicy, SessionLocks,
    SessionStore, TokenRefresher, collect_statistics,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, warn};

use crate::cli::StatsArgs;
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Fetches the configured calendar and prints its statistics.
pub async fn run(args: StatsArgs, config: &ClientConfig) -> ClientResult<()> {
    let mut google = config.google();
    if let Some(account) = args.account {
        google.account = Some(account);
    }
    if let Some(calendar) = args.calendar {
        google.calendar_id = Some(calendar);
    }

    let provider_config = google.to_provider_config()?;
    let manager = CredentialManager::new(GoogleOAuth::new(&provider_config)?);
    let source = GoogleCalendarClient::new(&provider_config)?;
    let store = config.session_store();
    let locks = SessionLocks::new();

    let summary = compute(
        &manager,
        &source,
        &store,
        &locks,
        google.account(),
        google.calendar_id(),
        Utc::now(),
        &Local,
    )
    .await?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        config.display.format
    };
    println!("{}", render(&summary, format)?);
    Ok(())
}

/// Loads the account's session, fetches and analyzes, then persists the session.
///
/// The session is written back whenever it changed, including when a refresh
/// failed, so the failure is remembered by later runs.
#[allow(clippy::too_many_arguments)]
pub async fn compute<R, S, St, Tz>(
    manager: &CredentialManager<R>,
    source: &S,
    store: &St,
    locks: &SessionLocks,
    account: &str,
    calendar_id: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> ClientResult<StatisticsSummary>
where
    R: TokenRefresher,
    S: EventSource + ?Sized,
    St: SessionStore + ?Sized,
    Tz: TimeZone,
{
    let _guard = locks.acquire(account).await;

    let Some(mut bundle) = store.load(account)? else {
        warn!(account, "no stored session");
        return Err(ReauthRequired.into());
    };
    let before = bundle.clone();

    let query = EventQuery::analysis_window(now).with_calendar_id(calendar_id);
    let result = collect_statistics(
        manager,
        source,
        &mut bundle,
        &query,
        RetryPolicy::default(),
        now,
        tz,
    )
    .await;

    if bundle != before {
        debug!(account, "session changed, saving");
        store.save(account, &bundle)?;
    }

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use calstats_core::RawCalendarEvent;
    use calstats_providers::{
        BoxFuture, Clock, MemorySessionStore, ProviderError, ProviderResult, RefreshedToken,
        TokenBundle, TokenErrorState,
    };
    use chrono::Duration;

    use crate::error::ClientError;

    struct FakeRefresher {
        ok: bool,
        calls: AtomicUsize,
    }

    impl FakeRefresher {
        fn new(ok: bool) -> Self {
            Self {
                ok,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TokenRefresher for FakeRefresher {
        fn refresh_access_token<'a>(
            &'a self,
            _refresh_token: &'a str,
        ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.ok;
            Box::pin(async move {
                if ok {
                    Ok(RefreshedToken {
                        access_token: "fresh".to_string(),
                        expires_in_secs: 3600,
                        refresh_token: None,
                    })
                } else {
                    Err(ProviderError::authentication("invalid_grant").with_status(400))
                }
            })
        }
    }

    /// Accepts only the listed access tokens.
    struct FakeSource {
        accepted: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn accepting(accepted: Vec<&'static str>) -> Self {
            Self {
                accepted,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl EventSource for FakeSource {
        fn list_events<'a>(
            &'a self,
            access_token: &'a str,
            _query: &'a EventQuery,
        ) -> BoxFuture<'a, ProviderResult<Vec<RawCalendarEvent>>> {
            self.seen.lock().unwrap().push(access_token.to_string());
            let result = if self.accepted.iter().any(|t| *t == access_token) {
                Ok(vec![RawCalendarEvent::timed(
                    "2024-03-13T09:00:00Z",
                    "2024-03-13T10:00:00Z",
                )])
            } else {
                Err(ProviderError::authentication("invalid credentials").with_status(401))
            };
            Box::pin(async move { result })
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    fn manager(ok: bool) -> CredentialManager<FakeRefresher> {
        CredentialManager::new(FakeRefresher::new(ok)).with_clock(Arc::new(FixedClock(now())))
    }

    fn stored(expires_in: Duration, refresh: Option<&str>) -> TokenBundle {
        TokenBundle {
            access_token: Some("stored".to_string()),
            access_token_expires_at: now() + expires_in,
            refresh_token: refresh.map(str::to_string),
            error_state: None,
            scopes: vec![],
            last_refresh: now() - Duration::hours(1),
        }
    }

    async fn run_compute(
        manager: &CredentialManager<FakeRefresher>,
        source: &FakeSource,
        store: &MemorySessionStore,
    ) -> ClientResult<StatisticsSummary> {
        compute(
            manager,
            source,
            store,
            &SessionLocks::new(),
            "default",
            "primary",
            now(),
            &Utc,
        )
        .await
    }

    #[tokio::test]
    async fn valid_session_is_used_and_not_rewritten() {
        let store = MemorySessionStore::new();
        let bundle = stored(Duration::hours(1), Some("rt"));
        store.save("default", &bundle).unwrap();
        let manager = manager(true);
        let source = FakeSource::accepting(vec!["stored"]);

        let summary = run_compute(&manager, &source, &store).await.unwrap();
        assert_eq!(summary.total_events, 1);
        assert_eq!(summary.busiest_weekday, "Wednesday");
        assert_eq!(store.load("default").unwrap(), Some(bundle));
    }

    #[tokio::test]
    async fn refreshed_session_is_persisted() {
        let store = MemorySessionStore::new();
        store
            .save("default", &stored(-Duration::minutes(6), Some("rt")))
            .unwrap();
        let manager = manager(true);
        let source = FakeSource::accepting(vec!["fresh"]);

        run_compute(&manager, &source, &store).await.unwrap();

        let saved = store.load("default").unwrap().unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("fresh"));
        assert_eq!(saved.refresh_token.as_deref(), Some("rt"));
        assert_eq!(*source.seen.lock().unwrap(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_and_retried() {
        let store = MemorySessionStore::new();
        store
            .save("default", &stored(Duration::hours(1), Some("rt")))
            .unwrap();
        let manager = manager(true);
        let source = FakeSource::accepting(vec!["fresh"]);

        let summary = run_compute(&manager, &source, &store).await.unwrap();
        assert_eq!(summary.total_events, 1);
        assert_eq!(
            *source.seen.lock().unwrap(),
            vec!["stored".to_string(), "fresh".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_refresh_is_remembered() {
        let store = MemorySessionStore::new();
        store
            .save("default", &stored(-Duration::minutes(6), Some("rt")))
            .unwrap();
        let manager = manager(false);
        let source = FakeSource::accepting(vec![]);

        let err = run_compute(&manager, &source, &store).await.unwrap_err();
        assert!(err.is_reauth_required());
        assert_eq!(err.exit_code(), 2);

        let saved = store.load("default").unwrap().unwrap();
        assert_eq!(saved.error_state, Some(TokenErrorState::RefreshFailed));

        // A later run does not call the token endpoint again.
        let err = run_compute(&manager, &source, &store).await.unwrap_err();
        assert!(err.is_reauth_required());
        assert_eq!(manager_calls(&manager), 1);
    }

    #[tokio::test]
    async fn missing_session_requires_sign_in() {
        let store = MemorySessionStore::new();
        let source = FakeSource::accepting(vec!["stored"]);

        let err = run_compute(&manager(true), &source, &store).await.unwrap_err();
        assert!(matches!(err, ClientError::ReauthRequired(_)));
        assert!(source.seen.lock().unwrap().is_empty());
    }

    fn manager_calls(manager: &CredentialManager<FakeRefresher>) -> usize {
        manager.refresher().calls.load(Ordering::SeqCst)
    }
}
