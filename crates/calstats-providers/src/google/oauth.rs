//! Google OAuth 2.0: interactive sign-in and token refresh.
//!
//! Sign-in uses the authorization-code flow with PKCE (RFC 7636) and a
//! loopback redirect:
//!
//! 1. Generate a code verifier, its S256 challenge and a random state
//! 2. Bind a listener on `127.0.0.1` within the configured port range
//! 3. Open the browser on the consent page (`access_type=offline`, `prompt=consent`)
//! 4. Read the redirect, check the state, exchange the code for tokens
//!
//! The resulting [`AccountGrant`] is turned into a bundle by
//! [`TokenBundle::initialize`](crate::TokenBundle::initialize). Later refreshes
//! go through the [`TokenRefresher`] implementation.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::{AccountGrant, RefreshedToken, TokenRefresher};
use crate::error::{ProviderError, ProviderResult};
use crate::source::BoxFuture;

use super::config::{GoogleConfig, OAuthCredentials};

/// Code verifier entropy in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest access token lifetime accepted from the token endpoint.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

const CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Signed in to calstats</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Sign-in failed</h1>\
    <p>You can close this window.</p></body></html>";

/// Google's OAuth endpoints for one client registration.
pub struct GoogleOAuth {
    credentials: OAuthCredentials,
    auth_url: String,
    token_url: String,
    scopes: Vec<String>,
    port_range: (u16, u16),
    http_client: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        Ok(Self {
            credentials: config.credentials.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            scopes: config.scopes.clone(),
            port_range: config.loopback_port_range,
            http_client: config.http_client()?,
        })
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Runs the interactive sign-in and returns the granted tokens.
    ///
    /// # Errors
    ///
    /// Fails if no loopback port is free, the user denies access, the state
    /// does not match, the callback times out or the code exchange fails.
    pub async fn authorize(&self) -> ProviderResult<AccountGrant> {
        let pkce = PkceFlow::new();
        let (listener, port) = bind_loopback(self.port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);
        let auth_url = pkce.build_auth_url(
            &self.auth_url,
            &self.credentials.client_id,
            &redirect_uri,
            &self.scopes,
        )?;

        info!("starting Google sign-in, opening browser");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!("failed to open browser: {}", e);
            eprintln!("\nOpen this URL in your browser to sign in:\n\n{}\n", auth_url);
        }

        let callback = tokio::time::timeout(CALLBACK_TIMEOUT, wait_for_callback(&listener))
            .await
            .map_err(|_| ProviderError::authentication("timed out waiting for sign-in"))??;

        if callback.state != pkce.state {
            return Err(ProviderError::authentication(
                "sign-in state mismatch, possible forged redirect",
            ));
        }

        info!("received authorization code, exchanging for tokens");
        self.exchange_code(&callback.code, &pkce.verifier, &redirect_uri)
            .await
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<AccountGrant> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        let token = self.post_token_form(&params, "token exchange").await?;

        let scopes = match token.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => self.scopes.clone(),
        };
        info!(
            has_refresh_token = token.refresh_token.is_some(),
            "signed in to Google"
        );
        Ok(AccountGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in_secs: token.expires_in,
            scopes,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let token = self.post_token_form(&params, "token refresh").await?;
        Ok(RefreshedToken {
            access_token: token.access_token,
            expires_in_secs: token.expires_in,
            refresh_token: token.refresh_token,
        })
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        debug!(url = %self.token_url, "{} request", what);
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{} request failed: {}", what, e)).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read {} response: {}", what, e))
                .with_source(e)
        })?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.describe())
                .unwrap_or_else(|_| "unexpected response".to_string());
            return Err(ProviderError::authentication(format!("{} rejected: {}", what, reason))
                .with_status(status.as_u16()));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid {} response: {}", what, e))
        })?;
        if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&token.expires_in) {
            return Err(ProviderError::invalid_response(format!(
                "{} returned out-of-range expires_in: {}",
                what, token.expires_in
            )));
        }
        Ok(token)
    }
}

impl TokenRefresher for GoogleOAuth {
    fn refresh_access_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(self.refresh(refresh_token))
    }
}

/// Successful token endpoint payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Error payload of the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{} ({})", self.error, desc),
            None => self.error.clone(),
        }
    }
}

/// PKCE verifier, challenge and anti-forgery state for one sign-in.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    /// base64url(SHA-256(verifier)).
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_urlsafe(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_urlsafe(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent page URL.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<Url> {
        let scope = scopes.join(" ");
        Url::parse_with_params(
            auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("code_challenge", self.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", self.state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| {
            ProviderError::configuration(format!("invalid authorization URL '{}': {}", auth_url, e))
        })
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Code and state carried by the sign-in redirect.
#[derive(Debug, PartialEq, Eq)]
struct Callback {
    code: String,
    state: String,
}

async fn bind_loopback(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            debug!("sign-in listener bound on port {}", port);
            return Ok((listener, port));
        }
    }
    Err(ProviderError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

async fn wait_for_callback(listener: &TcpListener) -> ProviderResult<Callback> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| {
            ProviderError::internal(format!("failed to accept sign-in redirect: {}", e))
                .with_source(e)
        })?;
        debug!(%peer, "sign-in listener connection");
        if let Some(result) = handle_connection(stream).await {
            return result;
        }
    }
}

/// Answers one browser request. Returns `None` for unrelated requests.
async fn handle_connection(stream: TcpStream) -> Option<ProviderResult<Callback>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;

    let result = parse_callback(&request_line)?;
    let page = if result.is_ok() {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };
    let mut stream = reader.into_inner();
    let _ = stream.write_all(page.as_bytes()).await;
    let _ = stream.shutdown().await;
    Some(result)
}

/// Extracts the redirect parameters from an HTTP request line such as
/// `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback(request_line: &str) -> Option<ProviderResult<Callback>> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let url = Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
    if url.path() != CALLBACK_PATH {
        return None;
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Some(Err(ProviderError::authentication(format!(
                    "authorization denied: {}",
                    value
                ))));
            }
            _ => {}
        }
    }

    Some(match code {
        Some(code) => Ok(Callback {
            code,
            state: state.unwrap_or_default(),
        }),
        None => Err(ProviderError::authentication(
            "missing authorization code in redirect",
        )),
    })
}
