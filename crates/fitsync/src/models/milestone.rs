//! Manually recorded milestones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-entered milestone. Append-only; there is no natural key, so two
/// identical entries are two milestones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    pub activity_type: String,
    pub description: String,
    pub started_on: DateTime<Utc>,
}

impl Milestone {
    /// Create a milestone dated now
    pub fn new(
        name: impl Into<String>,
        activity_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            activity_type: activity_type.into(),
            description: description.into(),
            started_on: Utc::now(),
        }
    }
}
