//! Sync engine for fetching and storing activities
//!
//! Sync is incremental and idempotent: it resumes after the latest stored
//! start time and upserts by remote id, so it can be safely retried.

mod activities;

pub use activities::{
    ActivitySource, SyncOptions, SyncStats, high_water_mark, maybe_save_athlete, sync_activities,
    sync_strava, sync_until_caught_up,
};
