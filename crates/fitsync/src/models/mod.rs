//! Domain models for synced activities, stored credentials and milestones

mod activity;
mod credential;
mod milestone;

pub use activity::{Activity, ActivityTypeCount, RemoteId, StoredActivity};
pub use credential::Credential;
pub use milestone::Milestone;
