//! Per-activity JSON snapshot files
//!
//! A debugging and durability artifact next to the database: each activity is
//! written as `activity-<start unix ts>.json`, and the athlete profile as
//! `athlete.json`. Nothing in the sync path reads these back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::Activity;

const ACTIVITY_PREFIX: &str = "activity-";
const ACTIVITY_SUFFIX: &str = ".json";
const ATHLETE_FILE: &str = "athlete.json";

/// A directory of activity snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    /// Use `root` as the snapshot directory, creating it if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        config::ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file for an activity
    pub fn activity_path(&self, activity: &Activity) -> PathBuf {
        self.root.join(format!(
            "{}{}{}",
            ACTIVITY_PREFIX,
            activity.started_on.timestamp(),
            ACTIVITY_SUFFIX
        ))
    }

    pub fn athlete_path(&self) -> PathBuf {
        self.root.join(ATHLETE_FILE)
    }

    /// Write an activity's payload as pretty JSON, replacing any previous file
    pub fn write_activity(&self, activity: &Activity) -> Result<PathBuf> {
        let path = self.activity_path(activity);
        let payload = activity
            .payload()
            .with_context(|| format!("Activity {} has an invalid payload", activity.remote_id))?;
        config::save_json_file(&path, &payload)?;
        Ok(path)
    }

    /// Write the raw athlete profile body
    pub fn write_athlete(&self, body: &[u8]) -> Result<PathBuf> {
        let path = self.athlete_path();
        fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Latest start time among snapshot file names, or the epoch if none
    ///
    /// Files that don't match `activity-<digits>.json` are skipped.
    pub fn latest_timestamp(&self) -> Result<DateTime<Utc>> {
        let mut latest = 0i64;

        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?;
        for entry in entries {
            let name = entry?.file_name();
            let Some(timestamp) = name.to_str().and_then(parse_activity_file_name) else {
                log::debug!("skipping file {:?}", name);
                continue;
            };
            latest = latest.max(timestamp);
        }

        Ok(DateTime::from_timestamp(latest, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }
}

fn parse_activity_file_name(name: &str) -> Option<i64> {
    let digits = name
        .strip_prefix(ACTIVITY_PREFIX)?
        .strip_suffix(ACTIVITY_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
