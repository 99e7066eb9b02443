//! Strava OAuth2 token management
//!
//! Implements the OAuth2 authorization code flow against Strava, persisting
//! the token through a [`CredentialStore`]. A stored, unexpired token is
//! reused without any network call; an expired one is refreshed when it has
//! a refresh token, and otherwise the operator is sent through the browser
//! flow again.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::api::TokenResponse;
use super::callback::CallbackListener;
use super::client::{StravaClient, http_agent};
use crate::config::StravaCredentials;
use crate::storage::CredentialStore;

/// Name under which the Strava token is stored
pub const CREDENTIAL_NAME: &str = "strava";

/// Fatal failures of the authorization flow
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0} is not configured - you can define it in a .env file")]
    MissingConfig(&'static str),

    #[error("invalid OAuth state, got '{actual}' expected '{expected}' (possible CSRF)")]
    StateMismatch { expected: String, actual: String },

    #[error("Strava authorization was denied: {0}")]
    Denied(String),

    #[error("OAuth callback listener stopped before receiving a code")]
    ListenerClosed,

    #[error("Timed out waiting for the OAuth callback")]
    CallbackTimeout,
}

/// OAuth client settings and provider endpoints
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    /// Strava wants its scopes as a single comma-separated string
    pub scope: String,
    /// Fixed anti-forgery value echoed back on the callback
    pub state: String,
    pub callback_addr: String,
    pub callback_path: String,
    /// `None` waits for the operator forever
    pub callback_timeout: Option<std::time::Duration>,
}

impl OAuthConfig {
    pub const AUTHORIZE_URL: &'static str = "https://www.strava.com/oauth/authorize";
    pub const TOKEN_URL: &'static str = "https://www.strava.com/oauth/token";
    pub const SCOPE: &'static str = "read_all,activity:read_all,profile:read_all";
    pub const STATE: &'static str = "stride-oauth-state";
    pub const CALLBACK_ADDR: &'static str = "127.0.0.1:8080";
    pub const CALLBACK_PATH: &'static str = "/strava_oauth";

    /// Config for the real Strava endpoints
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: Self::AUTHORIZE_URL.to_string(),
            token_url: Self::TOKEN_URL.to_string(),
            api_base_url: StravaClient::BASE_URL.to_string(),
            scope: Self::SCOPE.to_string(),
            state: Self::STATE.to_string(),
            callback_addr: Self::CALLBACK_ADDR.to_string(),
            callback_path: Self::CALLBACK_PATH.to_string(),
            callback_timeout: None,
        }
    }

    pub fn from_credentials(credentials: &StravaCredentials) -> Self {
        Self::new(&credentials.client_id, &credentials.client_secret)
    }

    /// Client id and secret are required for any token endpoint call
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::MissingConfig("STRAVA_CLIENT_ID"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::MissingConfig("STRAVA_CLIENT_SECRET"));
        }
        Ok(())
    }

    /// Build the provider's authorization URL for a redirect URI
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&approval_prompt=auto",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.scope),
            urlencoding::encode(&self.state),
        )
    }
}

/// Presents the authorization URL to the operator
pub trait AuthorizationPrompt {
    fn present(&self, auth_url: &str);
}

/// Print the URL and try to open it in the default browser
pub struct BrowserPrompt;

impl AuthorizationPrompt for BrowserPrompt {
    fn present(&self, auth_url: &str) {
        println!("\n=== Strava Authorization Required ===");
        println!("Opening browser for authorization...");
        println!("If the browser doesn't open, visit:\n  {}", auth_url);

        if let Err(e) = open::that(auth_url) {
            log::warn!("Failed to open browser: {}. Please open the URL manually.", e);
        }
        println!("Waiting for authorization...");
    }
}

/// Only print the URL (headless machines)
pub struct PrintPrompt;

impl AuthorizationPrompt for PrintPrompt {
    fn present(&self, auth_url: &str) {
        println!("Visit this URL to connect to Strava:\n  {}", auth_url);
    }
}

/// Token data as serialized into the credential blob
///
/// Only this module reads or writes the blob's structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix seconds
    expires_at: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// Strava access tokens live for six hours
    const DEFAULT_LIFETIME_SECS: i64 = 6 * 60 * 60;

    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_at
            .or_else(|| response.expires_in.map(|secs| now.timestamp() + secs))
            .unwrap_or(now.timestamp() + Self::DEFAULT_LIFETIME_SECS);

        Self {
            access_token: response.access_token,
            token_type: response
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
            refresh_token: response.refresh_token,
            expires_at,
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Short prefix of the access token for log lines
    fn redacted(&self) -> String {
        let prefix: String = self.access_token.chars().take(6).collect();
        format!("{}...", prefix)
    }
}

/// What the credential store holds for Strava
enum StoredLookup {
    Usable(StoredToken),
    Expired(StoredToken),
    Missing,
}

/// Token manager: turns stored credentials into an authenticated client
pub struct StravaAuth<'a> {
    config: OAuthConfig,
    store: &'a dyn CredentialStore,
    prompt: Box<dyn AuthorizationPrompt + 'a>,
    agent: ureq::Agent,
}

impl<'a> StravaAuth<'a> {
    /// Create a token manager that prompts through the browser
    pub fn new(config: OAuthConfig, store: &'a dyn CredentialStore) -> Self {
        Self {
            config,
            store,
            prompt: Box::new(BrowserPrompt),
            agent: http_agent(),
        }
    }

    /// Replace the way the authorization URL is presented
    pub fn with_prompt(mut self, prompt: impl AuthorizationPrompt + 'a) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Get an authenticated client, acquiring a token if needed
    ///
    /// A usable stored token is wrapped without touching the network.
    /// Otherwise the token endpoint is called exactly once (refresh or code
    /// exchange) and the result is persisted before the client is returned.
    pub fn obtain_client(&self) -> Result<StravaClient> {
        let expired = match self.lookup()? {
            StoredLookup::Usable(token) => {
                let remaining = token.expiry() - Utc::now();
                log::info!(
                    "retrieved strava token {} expiring in {}m",
                    token.redacted(),
                    remaining.num_minutes()
                );
                return Ok(self.client_for(&token));
            }
            StoredLookup::Expired(token) => Some(token),
            StoredLookup::Missing => None,
        };

        self.config.validate()?;

        if let Some(refresh_token) = expired.and_then(|t| t.refresh_token) {
            match self.refresh_access_token(&refresh_token) {
                Ok(token) => {
                    self.save_token(&token)?;
                    log::info!("refreshed strava token {}", token.redacted());
                    return Ok(self.client_for(&token));
                }
                Err(e) => log::warn!("Token refresh failed, re-authorizing: {:#}", e),
            }
        }

        let token = self.authorization_code_auth()?;
        self.save_token(&token)?;
        Ok(self.client_for(&token))
    }

    /// Whether a usable token is stored; never touches the network
    pub fn is_authenticated(&self) -> bool {
        matches!(self.lookup(), Ok(StoredLookup::Usable(_)))
    }

    /// Read and classify the stored credential
    ///
    /// Missing records, empty or unparseable blobs are all "missing".
    fn lookup(&self) -> Result<StoredLookup> {
        let Some(credential) = self.store.get_credential(CREDENTIAL_NAME)? else {
            log::info!("no stored {} credentials", CREDENTIAL_NAME);
            return Ok(StoredLookup::Missing);
        };

        if credential.blob.is_empty() {
            log::warn!("stored {} credentials are empty", CREDENTIAL_NAME);
            return Ok(StoredLookup::Missing);
        }

        let token: StoredToken = match serde_json::from_slice(&credential.blob) {
            Ok(token) => token,
            Err(e) => {
                log::warn!("stored {} credentials are unreadable: {}", CREDENTIAL_NAME, e);
                return Ok(StoredLookup::Missing);
            }
        };

        if credential.is_expired_at(Utc::now()) {
            log::info!(
                "existing {} credentials expired on {}",
                CREDENTIAL_NAME,
                credential.expires_at
            );
            return Ok(StoredLookup::Expired(token));
        }

        Ok(StoredLookup::Usable(token))
    }

    fn client_for(&self, token: &StoredToken) -> StravaClient {
        StravaClient::with_token_type(
            &token.token_type,
            &token.access_token,
            &self.config.api_base_url,
        )
    }

    /// Perform the authorization code flow
    fn authorization_code_auth(&self) -> Result<StoredToken> {
        // Step 1: Start local listener to receive the redirect
        let listener = CallbackListener::bind(
            &self.config.callback_addr,
            &self.config.callback_path,
            &self.config.state,
        )?;
        let redirect_uri = listener.redirect_uri();
        let handle = listener.spawn()?;

        // Step 2: Send the operator to the authorization page
        let auth_url = self.config.authorization_url(&redirect_uri);
        self.prompt.present(&auth_url);

        // Step 3: Wait for the code; the listener stops once it has delivered
        let code = match self.config.callback_timeout {
            Some(timeout) => handle.wait_timeout(timeout)?,
            None => handle.wait()?,
        };

        // Step 4: Exchange code for a token
        log::info!("Exchanging authorization code for a token...");
        self.request_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .context("Failed to exchange authorization code")
    }

    /// Refresh an access token using a refresh token
    fn refresh_access_token(&self, refresh_token: &str) -> Result<StoredToken> {
        let mut token = self
            .request_token(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        // Preserve the refresh token if not returned
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token)
    }

    /// POST a form to the token endpoint
    fn request_token(&self, form: &[(&str, &str)]) -> Result<StoredToken> {
        let mut response = self
            .agent
            .post(&self.config.token_url)
            .send_form(form.iter().copied())
            .context("Failed to reach the token endpoint")?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            anyhow::bail!("Token endpoint returned {}: {}", status, body);
        }

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        Ok(StoredToken::from_response(token, Utc::now()))
    }

    /// Persist a token, overwriting any previous record
    fn save_token(&self, token: &StoredToken) -> Result<()> {
        let blob = serde_json::to_vec(token)?;
        self.store
            .put_credential(CREDENTIAL_NAME, &blob, token.expiry())
            .with_context(|| format!("Failed to save {} credentials", CREDENTIAL_NAME))?;
        log::info!(
            "saved {} credentials {} expiring {}",
            CREDENTIAL_NAME,
            token.redacted(),
            token.expiry()
        );
        Ok(())
    }
}
