//! Activity query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Activity, ActivityTypeCount};
use crate::storage::ActivityStore;

/// Number of activities served by the status endpoint
pub const RECENT_ACTIVITY_LIMIT: usize = 50;

/// Summary information for displaying an activity in a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub name: String,
    pub activity_type: String,
    pub started_on: DateTime<Utc>,
}

impl From<Activity> for RecentActivity {
    fn from(activity: Activity) -> Self {
        Self {
            name: activity.name,
            activity_type: activity.activity_type,
            started_on: activity.started_on,
        }
    }
}

/// Per-type activity counts with their sum
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityTotals {
    /// Ordered by activity type
    pub by_type: Vec<ActivityTypeCount>,
    pub total: u64,
}

/// List the most recent activities, newest first
pub fn recent_activities(store: &dyn ActivityStore, limit: usize) -> Result<Vec<RecentActivity>> {
    let activities = store.list_recent_activities(limit)?;
    Ok(activities.into_iter().map(RecentActivity::from).collect())
}

/// Count activities per type
pub fn activity_type_counts(store: &dyn ActivityStore) -> Result<ActivityTotals> {
    let by_type = store.count_by_type()?;
    let total = by_type.iter().map(|c| c.count).sum();
    Ok(ActivityTotals { by_type, total })
}

/// Distinct activity types, ascending
pub fn activity_types(store: &dyn ActivityStore) -> Result<Vec<String>> {
    store.list_activity_types()
}
