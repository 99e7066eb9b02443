//! Query API for the CLI reports and the status endpoint
//!
//! Provides high-level query functions that return data formatted
//! for display.

mod activities;
mod milestones;

pub use activities::{
    ActivityTotals, RECENT_ACTIVITY_LIMIT, RecentActivity, activity_type_counts, activity_types,
    recent_activities,
};
pub use milestones::{list_milestones, record_milestone};
