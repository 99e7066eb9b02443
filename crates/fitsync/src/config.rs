//! Configuration loading for Strava sync
//!
//! Supports loading OAuth client credentials from (in order of priority):
//! 1. Compile-time embedded credentials (for release builds)
//! 2. JSON file (~/.config/stride/strava-credentials.json)
//! 3. Runtime environment variables, including a `.env` file (fallback)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Credentials filename in the Stride config directory
const CREDENTIALS_FILE: &str = "strava-credentials.json";

/// Database filename in the Stride data directory
const DATABASE_FILE: &str = "database.db";

/// Snapshot directory name in the Stride data directory
const SNAPSHOT_DIR: &str = "strava";

const CLIENT_ID_VAR: &str = "STRAVA_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "STRAVA_CLIENT_SECRET";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

/// OAuth client credentials for the Strava API
#[derive(Debug, Clone, Deserialize)]
pub struct StravaCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl StravaCredentials {
    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials
    /// 2. JSON file (~/.config/stride/strava-credentials.json)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            log::debug!("using compile-time Strava credentials");
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            log::debug!("loading Strava credentials from {}", CREDENTIALS_FILE);
            let creds: StravaCredentials = config::load_json(CREDENTIALS_FILE)?;
            return Ok(creds);
        }

        Ok(Self::from_env()?)
    }

    /// Load credentials embedded at compile time.
    /// Build with: STRAVA_CLIENT_ID=xxx STRAVA_CLIENT_SECRET=yyy cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("STRAVA_CLIENT_ID")?;
        let client_secret = option_env!("STRAVA_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credentials JSON")
    }

    /// Load credentials from environment variables, reading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            client_id: required(CLIENT_ID_VAR)?,
            client_secret: required(CLIENT_SECRET_VAR)?,
        })
    }

    /// Get the default credentials file path (~/.config/stride/strava-credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (compile-time, file, or env vars)
    pub fn is_available() -> bool {
        if Self::from_compile_time().is_some() {
            return true;
        }
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        Self::from_env().is_ok()
    }
}

/// Default SQLite database path (~/.local/share/stride/database.db)
pub fn default_database_path() -> Option<PathBuf> {
    config::data_path(DATABASE_FILE)
}

/// Default activity snapshot directory (~/.local/share/stride/strava/)
pub fn default_snapshot_dir() -> Option<PathBuf> {
    config::data_path(SNAPSHOT_DIR)
}
