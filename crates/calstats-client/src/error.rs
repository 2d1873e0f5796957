//! Client error types.

use calstats_providers::{FetchError, ProviderError, ReauthRequired};
use thiserror::Error;

use crate::secret::SecretError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Exit status when the session has to be re-established.
pub const EXIT_REAUTH: u8 = 2;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    /// The stored session cannot be used; sign in again.
    #[error(transparent)]
    ReauthRequired(#[from] ReauthRequired),

    #[error("calendar provider unavailable: {0}")]
    Upstream(#[source] ProviderError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for ClientError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::ReauthRequired(r) => Self::ReauthRequired(r),
            FetchError::UpstreamUnavailable(e) => Self::Upstream(e),
        }
    }
}

impl ClientError {
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, Self::ReauthRequired(_))
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_reauth_required() {
            EXIT_REAUTH
        } else {
            1
        }
    }
}
