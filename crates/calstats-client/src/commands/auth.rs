//! Sign-in and sign-out.

use std::path::PathBuf;

use calstats_providers::google::{GoogleOAuth, OAuthCredentials};
use calstats_providers::{CredentialManager, SessionStore};
use tracing::info;

use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};

/// Credential inputs given on the command line.
#[derive(Debug, Default)]
pub struct CredentialArgs {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub credentials_file: Option<PathBuf>,
}

/// Runs the Google sign-in and stores the new session.
pub async fn google(
    credentials: CredentialArgs,
    account: Option<String>,
    force: bool,
    config: &ClientConfig,
) -> ClientResult<()> {
    let mut settings = config.google();
    if let Some(account) = account {
        settings.account = Some(account);
    }
    let account = settings.account().to_string();
    let store = config.session_store();

    if !force
        && let Some(existing) = store.load(&account)?
        && existing.is_recoverable()
    {
        println!("Already signed in to Google as account '{}'.", account);
        println!("Use --force to sign in again.");
        return Ok(());
    }

    let creds = resolve_google_credentials(credentials, &settings)?;
    let provider_config = settings.provider_config(creds)?;
    let oauth = GoogleOAuth::new(&provider_config)?;

    println!("Starting Google sign-in...");
    println!();
    println!("A browser window will open for you to grant read access to your calendar.");
    println!("If it doesn't, open the URL printed below.");
    println!();

    let grant = oauth.authorize().await?;
    let has_refresh_token = grant.refresh_token.is_some();
    let manager = CredentialManager::new(oauth);
    let bundle = manager.initialize(grant);
    store.save(&account, &bundle)?;

    info!(account, "Google sign-in successful");
    println!("Signed in. Session saved for account '{}'.", account);
    if !has_refresh_token {
        println!("Google did not issue a refresh token; you will have to sign in again in about an hour.");
    }
    Ok(())
}

/// Deletes the stored session.
pub fn logout(account: Option<String>, config: &ClientConfig) -> ClientResult<()> {
    let settings = config.google();
    let account = account.as_deref().unwrap_or(settings.account());
    if config.session_store().remove(account)? {
        println!("Signed out of account '{}'.", account);
    } else {
        println!("No session stored for account '{}'.", account);
    }
    Ok(())
}

/// Picks the OAuth client credentials.
///
/// Priority (highest to lowest):
/// 1. `--client-id` + `--client-secret`
/// 2. `--credentials-file`
/// 3. the `[google]` section of `config.toml`
fn resolve_google_credentials(
    args: CredentialArgs,
    settings: &GoogleSettings,
) -> ClientResult<OAuthCredentials> {
    if let (Some(id), Some(secret)) = (&args.client_id, &args.client_secret) {
        return Ok(OAuthCredentials::new(id.clone(), secret.clone()));
    }

    if args.client_id.is_some() || args.client_secret.is_some() {
        return Err(ClientError::Config(
            "both --client-id and --client-secret are required when providing credentials directly"
                .to_string(),
        ));
    }

    if let Some(ref path) = args.credentials_file {
        return OAuthCredentials::from_file(path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {}",
                path.display(),
                e.message()
            ))
        });
    }

    settings.resolve_credentials()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_pair_wins() {
        let args = CredentialArgs {
            client_id: Some("cli-id.apps.googleusercontent.com".to_string()),
            client_secret: Some("cli-secret".to_string()),
            credentials_file: Some(PathBuf::from("/nonexistent.json")),
        };
        let settings = GoogleSettings {
            client_id: Some("cfg-id.apps.googleusercontent.com".to_string()),
            client_secret: Some("cfg-secret".to_string()),
            ..Default::default()
        };
        let creds = resolve_google_credentials(args, &settings).unwrap();
        assert_eq!(creds.client_id, "cli-id.apps.googleusercontent.com");
    }

    #[test]
    fn partial_cli_pair_errors() {
        let args = CredentialArgs {
            client_id: Some("cli-id.apps.googleusercontent.com".to_string()),
            ..Default::default()
        };
        let err = resolve_google_credentials(args, &GoogleSettings::default()).unwrap_err();
        assert!(err.to_string().contains("--client-secret"));
    }

    #[test]
    fn credentials_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"web":{"client_id":"web-id.apps.googleusercontent.com","client_secret":"web-secret"}}"#,
        )
        .unwrap();

        let args = CredentialArgs {
            credentials_file: Some(path),
            ..Default::default()
        };
        let creds = resolve_google_credentials(args, &GoogleSettings::default()).unwrap();
        assert_eq!(creds.client_id, "web-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "web-secret");
    }

    #[test]
    fn missing_credentials_file_errors() {
        let args = CredentialArgs {
            credentials_file: Some(PathBuf::from("/nonexistent/calstats/client.json")),
            ..Default::default()
        };
        let err = resolve_google_credentials(args, &GoogleSettings::default()).unwrap_err();
        assert!(err.to_string().contains("failed to load credentials"));
    }

    #[test]
    fn falls_back_to_config() {
        let settings = GoogleSettings {
            client_id: Some("cfg-id.apps.googleusercontent.com".to_string()),
            client_secret: Some("cfg-secret".to_string()),
            ..Default::default()
        };
        let creds = resolve_google_credentials(CredentialArgs::default(), &settings).unwrap();
        assert_eq!(creds.client_secret, "cfg-secret");
    }

    #[test]
    fn logout_removes_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::parse(&format!(
            "[session]\ndir = {:?}\n",
            dir.path().display().to_string()
        ))
        .unwrap();
        let store = config.session_store();
        let bundle = calstats_providers::TokenBundle::initialize(
            calstats_providers::AccountGrant {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_in_secs: 3600,
                scopes: vec![],
            },
            chrono::Utc::now(),
        );
        store.save("default", &bundle).unwrap();

        logout(None, &config).unwrap();
        assert!(store.load("default").unwrap().is_none());
        logout(None, &config).unwrap();
    }
}
