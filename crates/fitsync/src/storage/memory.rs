//! In-memory storage implementation
//!
//! Used by tests and as a throwaway store when no database is wanted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{ActivityStore, CredentialStore, MilestoneStore};
use crate::models::{Activity, ActivityTypeCount, Credential, Milestone, RemoteId, StoredActivity};

/// In-memory implementation of all storage traits
///
/// Uses maps protected by RwLocks for thread-safe access.
pub struct InMemoryStore {
    credentials: RwLock<HashMap<String, Credential>>,
    activities: RwLock<HashMap<RemoteId, StoredActivity>>,
    milestones: RwLock<Vec<Milestone>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            activities: RwLock::new(HashMap::new()),
            milestones: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for InMemoryStore {
    fn put_credential(&self, name: &str, blob: &[u8], expires_at: DateTime<Utc>) -> Result<()> {
        let mut credentials = self.credentials.write().unwrap();
        credentials.insert(
            name.to_string(),
            Credential {
                name: name.to_string(),
                blob: blob.to_vec(),
                expires_at,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn get_credential(&self, name: &str) -> Result<Option<Credential>> {
        let credentials = self.credentials.read().unwrap();
        Ok(credentials.get(name).cloned())
    }
}

impl ActivityStore for InMemoryStore {
    fn max_started_on(&self) -> Result<Option<DateTime<Utc>>> {
        let activities = self.activities.read().unwrap();
        Ok(activities.values().map(|a| a.activity.started_on).max())
    }

    fn upsert_activity(&self, activity: &Activity) -> Result<()> {
        let now = Utc::now();
        let mut activities = self.activities.write().unwrap();

        let created_at = activities
            .get(&activity.remote_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        activities.insert(
            activity.remote_id,
            StoredActivity {
                activity: activity.clone(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    fn get_activity(&self, id: RemoteId) -> Result<Option<StoredActivity>> {
        let activities = self.activities.read().unwrap();
        Ok(activities.get(&id).cloned())
    }

    fn count_activities(&self) -> Result<usize> {
        Ok(self.activities.read().unwrap().len())
    }

    fn list_recent_activities(&self, limit: usize) -> Result<Vec<Activity>> {
        let activities = self.activities.read().unwrap();
        let mut list: Vec<Activity> = activities.values().map(|a| a.activity.clone()).collect();

        // Newest first, ties broken by id for a stable order
        list.sort_by(|a, b| {
            b.started_on
                .cmp(&a.started_on)
                .then_with(|| b.remote_id.cmp(&a.remote_id))
        });
        list.truncate(limit);
        Ok(list)
    }

    fn count_by_type(&self) -> Result<Vec<ActivityTypeCount>> {
        let activities = self.activities.read().unwrap();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for stored in activities.values() {
            *counts.entry(stored.activity.activity_type.clone()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(activity_type, count)| ActivityTypeCount {
                activity_type,
                count,
            })
            .collect())
    }

    fn list_activity_types(&self) -> Result<Vec<String>> {
        Ok(self
            .count_by_type()?
            .into_iter()
            .map(|c| c.activity_type)
            .collect())
    }
}

impl MilestoneStore for InMemoryStore {
    fn record_milestone(&self, milestone: &Milestone) -> Result<()> {
        self.milestones.write().unwrap().push(milestone.clone());
        Ok(())
    }

    fn list_milestones(&self) -> Result<Vec<Milestone>> {
        let mut milestones = self.milestones.read().unwrap().clone();
        milestones.sort_by_key(|m| m.started_on);
        Ok(milestones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_activity(id: u64, activity_type: &str, started_on: DateTime<Utc>) -> Activity {
        Activity {
            remote_id: RemoteId::new(id),
            external_id: None,
            name: format!("Activity {}", id),
            activity_type: activity_type.to_string(),
            started_on,
            data: format!(r#"{{"id":{}}}"#, id),
        }
    }

    #[test]
    fn test_empty_store_has_no_high_water_mark() {
        let store = InMemoryStore::new();
        assert_eq!(store.max_started_on().unwrap(), None);
    }

    #[test]
    fn test_upsert_preserves_created_at() {
        let store = InMemoryStore::new();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();

        store.upsert_activity(&make_activity(1, "Run", t)).unwrap();
        let first = store.get_activity(RemoteId::new(1)).unwrap().unwrap();

        let mut changed = make_activity(1, "Run", t + chrono::Duration::hours(1));
        changed.name = "Renamed".to_string();
        store.upsert_activity(&changed).unwrap();
        let second = store.get_activity(RemoteId::new(1)).unwrap().unwrap();

        assert_eq!(store.count_activities().unwrap(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.activity.name, "Renamed");
        assert_eq!(store.max_started_on().unwrap(), Some(t + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_count_by_type_sorted() {
        let store = InMemoryStore::new();
        let t = Utc::now();
        store.upsert_activity(&make_activity(1, "Run", t)).unwrap();
        store.upsert_activity(&make_activity(2, "Ride", t)).unwrap();
        store.upsert_activity(&make_activity(3, "Run", t)).unwrap();

        let counts = store.count_by_type().unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].activity_type, "Ride");
        assert_eq!(counts[1].count, 2);
        assert_eq!(store.list_activity_types().unwrap(), vec!["Ride", "Run"]);
    }
}
