//! Strava API HTTP client
//!
//! Executes authenticated requests, classifies response statuses and logs
//! the rate-limit headers on every response.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use ureq::http::HeaderMap;

use crate::sync::ActivitySource;

/// Failure outcomes of a single API request
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(
        "Strava response=401 Unauthorized - check STRAVA_CLIENT_ID and STRAVA_CLIENT_SECRET and re-authorize"
    )]
    Unauthorized,

    #[error(
        "Strava response=429 Too Many Requests - hit the Strava rate limit: http://developers.strava.com/docs/rate-limits/"
    )]
    RateLimited,

    #[error("Strava response={0}")]
    UnexpectedStatus(u16),

    #[error("Request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: ureq::Error,
    },
}

/// Classify an HTTP status from the Strava API
///
/// Only 200 is success. 401 and 429 get their own outcomes; anything else is
/// an unexpected status carrying the code.
pub fn classify_status(status: u16) -> Result<(), ApiError> {
    match status {
        200 => Ok(()),
        401 => Err(ApiError::Unauthorized),
        429 => Err(ApiError::RateLimited),
        other => Err(ApiError::UnexpectedStatus(other)),
    }
}

/// Strava's request quotas as reported by the rate-limit headers
///
/// Each header carries two comma-separated integers: the 15-minute window
/// and the daily window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub short_used: u32,
    pub short_limit: u32,
    pub daily_used: u32,
    pub daily_limit: u32,
}

impl RateLimit {
    pub const LIMIT_HEADER: &'static str = "x-ratelimit-limit";
    pub const USAGE_HEADER: &'static str = "x-ratelimit-usage";

    /// Parse the usage and limit header values; `None` if either is missing or malformed
    pub fn parse(usage: Option<&str>, limit: Option<&str>) -> Option<Self> {
        let (short_used, daily_used) = parse_pair(usage?)?;
        let (short_limit, daily_limit) = parse_pair(limit?)?;
        Some(Self {
            short_used,
            short_limit,
            daily_used,
            daily_limit,
        })
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        Self::parse(value(Self::USAGE_HEADER), value(Self::LIMIT_HEADER))
    }
}

fn parse_pair(value: &str) -> Option<(u32, u32)> {
    let (first, second) = value.split_once(',')?;
    Some((first.trim().parse().ok()?, second.trim().parse().ok()?))
}

fn log_rate_limit(headers: &HeaderMap) {
    match RateLimit::from_headers(headers) {
        Some(rl) => log::info!(
            "Strava API rate limits    15mins: {}/{} used     daily: {}/{} used",
            rl.short_used,
            rl.short_limit,
            rl.daily_used,
            rl.daily_limit
        ),
        None => log::debug!("Unable to parse the rate limit headers"),
    }
}

/// Build the HTTP agent shared by the token manager and the API client
///
/// Status codes are returned as responses rather than errors so that every
/// response can be classified and its headers inspected.
pub(crate) fn http_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(60)))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Authenticated Strava API client
///
/// Obtained from [`StravaAuth::obtain_client`](super::StravaAuth::obtain_client).
/// Holds the token for its lifetime; no re-authentication happens mid-request.
pub struct StravaClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl fmt::Debug for StravaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StravaClient")
            .field("base_url", &self.base_url)
            .field("authorization", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl StravaClient {
    /// Strava API base URL
    pub const BASE_URL: &'static str = "https://www.strava.com/api/v3";

    /// Maximum page size accepted by the activities endpoint
    pub const MAX_PER_PAGE: u32 = 200;

    /// Create a client from an access token
    pub fn new(access_token: &str, base_url: impl Into<String>) -> Self {
        Self::with_token_type("Bearer", access_token, base_url)
    }

    pub(crate) fn with_token_type(
        token_type: &str,
        access_token: &str,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            agent: http_agent(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization: format!("{} {}", token_type, access_token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute one authenticated GET and return the raw body
    ///
    /// Exactly one request is made; there are no retries.
    pub fn fetch(&self, endpoint: &str) -> Result<Vec<u8>, ApiError> {
        log::info!("fetching {}", endpoint);
        let transport = |source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };

        let mut response = self
            .agent
            .get(endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", &self.authorization)
            .call()
            .map_err(transport)?;

        log_rate_limit(response.headers());
        classify_status(response.status().as_u16())?;

        response.body_mut().read_to_vec().map_err(transport)
    }

    /// List activities that started strictly after `after` (unix seconds)
    pub fn list_activities(&self, after: i64, per_page: u32) -> Result<Vec<serde_json::Value>> {
        let endpoint = format!(
            "{}/athlete/activities?after={}&per_page={}",
            self.base_url,
            after,
            per_page.clamp(1, Self::MAX_PER_PAGE)
        );

        let body = self.fetch(&endpoint)?;
        let activities: Vec<serde_json::Value> =
            serde_json::from_slice(&body).context("Failed to parse activities response")?;

        log::info!("received {} activities", activities.len());
        Ok(activities)
    }

    /// Fetch the authenticated athlete's profile as raw JSON
    pub fn get_athlete(&self) -> Result<Vec<u8>> {
        let endpoint = format!("{}/athlete", self.base_url);
        Ok(self.fetch(&endpoint)?)
    }
}

impl ActivitySource for StravaClient {
    fn list_activities_after(
        &self,
        after: DateTime<Utc>,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>> {
        self.list_activities(after.timestamp(), per_page)
    }

    fn fetch_athlete(&self) -> Result<Vec<u8>> {
        self.get_athlete()
    }
}
