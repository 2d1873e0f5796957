//! Client configuration.
//!
//! All settings live in `~/.config/calstats/config.toml` by default:
//!
//! ```toml
//! debug = false
//!
//! [google]
//! client_id = "YOUR_ID.apps.googleusercontent.com"
//! client_secret = "env::GOOGLE_CLIENT_SECRET"
//! account = "default"
//! calendar_id = "primary"
//!
//! [display]
//! format = "text"
//!
//! [session]
//! dir = "/somewhere/else"
//! ```
//!
//! `client_id` and `client_secret` accept secret references (see [`crate::secret`]).
//! When absent, `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET` are used.

use std::path::{Path, PathBuf};

use calstats_core::OutputFormat;
use calstats_providers::google::{GoogleConfig, OAuthCredentials};
use calstats_providers::{DEFAULT_ACCOUNT, FileSessionStore, PRIMARY_CALENDAR};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the calstats client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub debug: bool,
    pub google: Option<GoogleSettings>,
    pub display: DisplaySettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub format: OutputFormat,
}

/// Where token bundles are stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Overrides the platform data directory.
    pub dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads the default file, or defaults if it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::Config(format!("{} in {}", e, path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calstats")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calstats")
    }

    /// Directory holding session files.
    pub fn session_dir(&self) -> PathBuf {
        self.session
            .dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    pub fn session_store(&self) -> FileSessionStore {
        FileSessionStore::new(self.session_dir())
    }

    /// The `[google]` section, or an empty one.
    pub fn google(&self) -> GoogleSettings {
        self.google.clone().unwrap_or_default()
    }
}

/// The `[google]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,
    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,
    /// Google Cloud Console credentials JSON, used when the fields above are unset.
    pub credentials_file: Option<PathBuf>,
    /// Session name for this Google account.
    pub account: Option<String>,
    pub calendar_id: Option<String>,
}

impl GoogleSettings {
    pub fn account(&self) -> &str {
        self.account.as_deref().unwrap_or(DEFAULT_ACCOUNT)
    }

    pub fn calendar_id(&self) -> &str {
        self.calendar_id.as_deref().unwrap_or(PRIMARY_CALENDAR)
    }

    /// Returns true if some credential source is configured.
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() || self.client_secret.is_some() || self.credentials_file.is_some()
    }

    /// Resolves the OAuth client credentials.
    ///
    /// Inline values win over the credentials file; missing inline values fall
    /// back to `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`.
    pub fn resolve_credentials(&self) -> ClientResult<OAuthCredentials> {
        let raw_id = self
            .client_id
            .clone()
            .or_else(|| std::env::var("GOOGLE_CLIENT_ID").ok());
        let raw_secret = self
            .client_secret
            .clone()
            .or_else(|| std::env::var("GOOGLE_CLIENT_SECRET").ok());

        match (raw_id, raw_secret, &self.credentials_file) {
            (Some(id), Some(secret), _) => Ok(OAuthCredentials::new(
                crate::secret::resolve(&id)?,
                crate::secret::resolve(&secret)?,
            )),
            (None, None, Some(path)) => Ok(OAuthCredentials::from_file(path)?),
            (Some(_), None, _) => Err(ClientError::Config(
                "client_secret is missing from the [google] section".to_string(),
            )),
            (None, Some(_), _) => Err(ClientError::Config(
                "client_id is missing from the [google] section".to_string(),
            )),
            (None, None, None) => Err(ClientError::Config(format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"\n\n  \
                 or set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
                ClientConfig::default_path().display()
            ))),
        }
    }

    /// Builds the provider configuration from already resolved credentials.
    pub fn provider_config(&self, credentials: OAuthCredentials) -> ClientResult<GoogleConfig> {
        credentials.validate().map_err(|e| {
            ClientError::Config(format!("invalid Google credentials: {}", e))
        })?;
        Ok(GoogleConfig::new(credentials)
            .with_account_name(self.account())
            .with_calendar_id(self.calendar_id()))
    }

    /// Resolves credentials and builds the provider configuration.
    pub fn to_provider_config(&self) -> ClientResult<GoogleConfig> {
        self.provider_config(self.resolve_credentials()?)
    }
}
