//! Milestone query and recording functions

use anyhow::{Context, Result};

use crate::models::Milestone;
use crate::storage::MilestoneStore;

/// List milestones, oldest first
pub fn list_milestones(store: &dyn MilestoneStore) -> Result<Vec<Milestone>> {
    store.list_milestones()
}

/// Record a milestone dated now
pub fn record_milestone(
    store: &dyn MilestoneStore,
    name: &str,
    activity_type: &str,
    description: &str,
) -> Result<Milestone> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Milestone title must not be empty");
    }

    let milestone = Milestone::new(name, activity_type.trim(), description.trim());
    store
        .record_milestone(&milestone)
        .with_context(|| format!("Failed to record milestone '{}'", milestone.name))?;
    log::info!("recorded milestone '{}'", milestone.name);
    Ok(milestone)
}
