//! Session status.

use calstats_providers::{DEFAULT_SKEW_BUFFER, SessionStore, TokenBundle};
use chrono::{DateTime, Utc};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Prints what the stored session for an account can still do.
pub fn run(account: Option<String>, config: &ClientConfig) -> ClientResult<()> {
    let settings = config.google();
    let account = account.as_deref().unwrap_or(settings.account());
    let store = config.session_store();
    let bundle = store.load(account)?;

    println!("account: {}", account);
    println!("session: {}", store.session_path(account)?.display());
    println!("state:   {}", describe(bundle.as_ref(), Utc::now()));
    Ok(())
}

/// One-line description of a session's state.
pub fn describe(bundle: Option<&TokenBundle>, now: DateTime<Utc>) -> String {
    let Some(bundle) = bundle else {
        return "not signed in".to_string();
    };
    if bundle.has_failed() {
        return "sign-in required (last refresh failed)".to_string();
    }
    if bundle.is_terminal() {
        return "sign-in required (no tokens)".to_string();
    }
    if bundle.current_token(now, DEFAULT_SKEW_BUFFER).is_some() {
        return format!(
            "signed in, access token valid for {} min",
            bundle.time_until_expiry(now).num_minutes()
        );
    }
    if bundle.refresh_token.is_some() {
        "signed in, access token will be refreshed on next use".to_string()
    } else {
        "sign-in required (access token expired, no refresh token)".to_string()
    }
}
