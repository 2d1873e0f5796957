//! Persistence of token bundles between runs.
//!
//! Bundles are stored per account name. [`FileSessionStore`] keeps one JSON
//! file per account; [`MemorySessionStore`] holds them in process.
//! [`SessionLocks`] serializes work on one account's bundle so a refresh is
//! never raced by another refresh of the same session.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::credentials::TokenBundle;
use crate::error::{ProviderError, ProviderResult};

/// Account name used when none is configured.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Storage for token bundles keyed by account name.
pub trait SessionStore: Send + Sync {
    /// Returns the stored bundle, or `None` if the account has no session.
    fn load(&self, account: &str) -> ProviderResult<Option<TokenBundle>>;

    /// Stores the bundle, replacing any previous one.
    fn save(&self, account: &str, bundle: &TokenBundle) -> ProviderResult<()>;

    /// Deletes the session. Returns true if one existed.
    fn remove(&self, account: &str) -> ProviderResult<bool>;
}

/// Checks that an account name is usable as a file name component.
pub fn validate_account_name(account: &str) -> ProviderResult<()> {
    if account.is_empty() {
        return Err(ProviderError::configuration("account name cannot be empty"));
    }
    if !account
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        || account.starts_with('.')
    {
        return Err(ProviderError::configuration(format!(
            "invalid account name '{}': use letters, digits, '-', '_', '.', '@'",
            account
        )));
    }
    Ok(())
}

/// Stores each session as `google-session-{account}.json` in a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the session file for an account.
    pub fn session_path(&self, account: &str) -> ProviderResult<PathBuf> {
        validate_account_name(account)?;
        Ok(self.dir.join(format!("google-session-{}.json", account)))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, account: &str) -> ProviderResult<Option<TokenBundle>> {
        let path = self.session_path(account)?;
        if !path.exists() {
            debug!("no session file at {:?}", path);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            ProviderError::internal(format!("failed to read session file: {}", e)).with_source(e)
        })?;
        let bundle: TokenBundle = serde_json::from_str(&content).map_err(|e| {
            ProviderError::internal(format!("failed to parse session file {:?}: {}", path, e))
        })?;

        debug!(account, "loaded session from {:?}", path);
        Ok(Some(bundle))
    }

    fn save(&self, account: &str, bundle: &TokenBundle) -> ProviderResult<()> {
        let path = self.session_path(account)?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            ProviderError::internal(format!("failed to create session directory: {}", e))
                .with_source(e)
        })?;

        let content = serde_json::to_string_pretty(bundle)
            .map_err(|e| ProviderError::internal(format!("failed to serialize session: {}", e)))?;

        // Write to a temp file first, then rename over the old session.
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::internal(format!("failed to write session file: {}", e)).with_source(e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                ProviderError::internal(format!("failed to restrict session file: {}", e))
                    .with_source(e)
            })?;
        }

        fs::rename(&temp_path, &path).map_err(|e| {
            ProviderError::internal(format!("failed to rename session file: {}", e))
                .with_source(e)
        })?;

        debug!(account, "saved session to {:?}", path);
        Ok(())
    }

    fn remove(&self, account: &str) -> ProviderResult<bool> {
        let path = self.session_path(account)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| {
            ProviderError::internal(format!("failed to remove session file: {}", e)).with_source(e)
        })?;
        info!(account, "removed session {:?}", path);
        Ok(true)
    }
}

/// In-process session storage.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, TokenBundle>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, account: &str) -> ProviderResult<Option<TokenBundle>> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(account).cloned())
    }

    fn save(&self, account: &str, bundle: &TokenBundle) -> ProviderResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(account.to_string(), bundle.clone());
        Ok(())
    }

    fn remove(&self, account: &str) -> ProviderResult<bool> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.remove(account).is_some())
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn load(&self, account: &str) -> ProviderResult<Option<TokenBundle>> {
        (**self).load(account)
    }

    fn save(&self, account: &str, bundle: &TokenBundle) -> ProviderResult<()> {
        (**self).save(account, bundle)
    }

    fn remove(&self, account: &str) -> ProviderResult<bool> {
        (**self).remove(account)
    }
}

/// One async lock per account.
#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive access to one account's session, released on drop.
pub type SessionGuard = OwnedMutexGuard<()>;

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, account: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits until the account's session is free.
    pub async fn acquire(&self, account: &str) -> SessionGuard {
        self.lock_for(account).lock_owned().await
    }

    /// Takes the account's session if nobody else holds it.
    pub fn try_acquire(&self, account: &str) -> Option<SessionGuard> {
        self.lock_for(account).try_lock_owned().ok()
    }
}
