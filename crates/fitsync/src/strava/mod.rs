//! Strava API integration
//!
//! This module provides:
//! - OAuth2 token management with a local callback listener
//! - An authenticated API client with status classification and rate-limit logging
//! - Normalization of activity payloads to domain models

mod auth;
mod callback;
mod client;
mod normalize;

pub use auth::{
    AuthError, AuthorizationPrompt, BrowserPrompt, CREDENTIAL_NAME, OAuthConfig, PrintPrompt,
    StravaAuth,
};
pub use callback::{CallbackHandle, CallbackListener};
pub use client::{ApiError, RateLimit, StravaClient, classify_status};
pub use normalize::normalize_activity;

/// Strava API response types
pub mod api {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    /// The subset of a summary activity the store indexes
    ///
    /// The full payload is kept separately as raw JSON.
    #[derive(Debug, Deserialize)]
    pub struct SummaryActivity {
        pub id: u64,
        #[serde(default)]
        pub external_id: Option<String>,
        #[serde(default)]
        pub name: String,
        #[serde(rename = "type", default)]
        pub activity_type: Option<String>,
        #[serde(default)]
        pub sport_type: Option<String>,
        pub start_date: DateTime<Utc>,
    }

    /// Response from the token endpoint (authorization code or refresh grant)
    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        #[serde(default)]
        pub token_type: Option<String>,
        #[serde(default)]
        pub refresh_token: Option<String>,
        /// Absolute expiry (unix seconds); Strava sends this
        #[serde(default)]
        pub expires_at: Option<i64>,
        /// Relative expiry in seconds; the OAuth2 standard field
        #[serde(default)]
        pub expires_in: Option<i64>,
    }
}
