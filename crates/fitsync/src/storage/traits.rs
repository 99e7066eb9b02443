//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Activity, ActivityTypeCount, Credential, Milestone, RemoteId, StoredActivity};

/// Persistence for named credentials
///
/// Blobs are stored and returned verbatim. At most one record exists per
/// name; `put_credential` overwrites unconditionally.
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the credential for `name`, stamping `updated_at`
    fn put_credential(&self, name: &str, blob: &[u8], expires_at: DateTime<Utc>) -> Result<()>;

    /// Get the credential for `name`, expired or not
    fn get_credential(&self, name: &str) -> Result<Option<Credential>>;
}

/// Persistence for synced activities, keyed by remote identifier
pub trait ActivityStore: Send + Sync {
    /// Latest `started_on` across all activities, `None` when empty
    fn max_started_on(&self) -> Result<Option<DateTime<Utc>>>;

    /// Insert or update an activity
    ///
    /// On conflict the payload, start time, descriptive fields and
    /// `updated_at` are overwritten; `created_at` is preserved.
    fn upsert_activity(&self, activity: &Activity) -> Result<()>;

    /// Get an activity with its bookkeeping timestamps
    fn get_activity(&self, id: RemoteId) -> Result<Option<StoredActivity>>;

    /// Count all activities
    fn count_activities(&self) -> Result<usize>;

    /// List activities ordered by `started_on` descending
    fn list_recent_activities(&self, limit: usize) -> Result<Vec<Activity>>;

    /// Count activities per type, ordered by type
    fn count_by_type(&self) -> Result<Vec<ActivityTypeCount>>;

    /// Distinct activity types, ascending
    fn list_activity_types(&self) -> Result<Vec<String>>;
}

/// Append-only persistence for milestones
pub trait MilestoneStore: Send + Sync {
    fn record_milestone(&self, milestone: &Milestone) -> Result<()>;

    /// List milestones ordered by `started_on` ascending
    fn list_milestones(&self) -> Result<Vec<Milestone>>;
}
