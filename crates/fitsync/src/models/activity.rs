//! Activity model representing a synced Strava activity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to an activity by Strava; the upsert key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId(pub u64);

impl RemoteId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RemoteId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An activity as fetched from the provider, ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub remote_id: RemoteId,
    /// Client-supplied identifier (e.g. the uploaded file name); often absent
    pub external_id: Option<String>,
    pub name: String,
    /// Category such as "Run" or "Ride"
    pub activity_type: String,
    /// Start time; the incremental sync high-water mark and the sort key
    pub started_on: DateTime<Utc>,
    /// Full JSON payload exactly as received
    pub data: String,
}

impl Activity {
    /// Parse the stored payload back into JSON
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.data)
    }
}

/// An activity together with its storage bookkeeping timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct StoredActivity {
    pub activity: Activity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of stored activities of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityTypeCount {
    pub activity_type: String,
    pub count: u64,
}
