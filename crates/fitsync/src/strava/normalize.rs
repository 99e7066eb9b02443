//! Normalize Strava activity payloads to domain models

use anyhow::{Context, Result};

use super::api::SummaryActivity;
use crate::models::{Activity, RemoteId};

/// Convert a raw activity payload into an [`Activity`]
///
/// The indexed fields are extracted from the payload; the payload itself is
/// kept verbatim as the activity's `data`.
pub fn normalize_activity(payload: serde_json::Value) -> Result<Activity> {
    let summary: SummaryActivity =
        serde_json::from_value(payload.clone()).context("Failed to parse activity payload")?;

    let activity_type = summary
        .activity_type
        .filter(|t| !t.is_empty())
        .or(summary.sport_type)
        .unwrap_or_else(|| "Unknown".to_string());

    let external_id = summary.external_id.filter(|id| !id.is_empty());

    let data = serde_json::to_string(&payload).context("Failed to serialize activity payload")?;

    Ok(Activity {
        remote_id: RemoteId::new(summary.id),
        external_id,
        name: summary.name,
        activity_type,
        started_on: summary.start_date,
        data,
    })
}
