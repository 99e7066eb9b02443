//! Fitsync crate - Business logic for syncing fitness activities
//!
//! This crate provides the platform-independent core of Stride:
//! - Domain models (Activity, Credential, Milestone)
//! - Strava OAuth2 token management and API client
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Incremental, idempotent sync engine
//! - Query API for reports and the status endpoint

pub mod config;
pub mod models;
pub mod query;
pub mod storage;
pub mod strava;
pub mod sync;

pub use config::{ConfigError, StravaCredentials, default_database_path, default_snapshot_dir};
pub use models::{Activity, ActivityTypeCount, Credential, Milestone, RemoteId, StoredActivity};
pub use query::{
    ActivityTotals, RECENT_ACTIVITY_LIMIT, RecentActivity, activity_type_counts, activity_types,
    list_milestones, recent_activities, record_milestone,
};
pub use storage::{
    ActivityStore, CredentialStore, InMemoryStore, MilestoneStore, SnapshotDir, SqliteStore,
};
pub use strava::{
    ApiError, AuthError, AuthorizationPrompt, BrowserPrompt, OAuthConfig, PrintPrompt, RateLimit,
    StravaAuth, StravaClient,
};
pub use sync::{
    ActivitySource, SyncOptions, SyncStats, high_water_mark, maybe_save_athlete, sync_activities,
    sync_strava, sync_until_caught_up,
};
