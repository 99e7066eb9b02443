//! Incremental activity sync implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Instant;

use crate::models::Activity;
use crate::storage::{ActivityStore, SnapshotDir};
use crate::strava::{StravaAuth, StravaClient, normalize_activity};

/// A provider of activity pages
///
/// Implemented by [`StravaClient`]; the sync engine only needs these two calls.
pub trait ActivitySource {
    /// One page of raw activity payloads that started strictly after `after`
    ///
    /// The order of activities within the page is unspecified.
    fn list_activities_after(
        &self,
        after: DateTime<Utc>,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>>;

    /// The authenticated athlete's profile as raw JSON
    fn fetch_athlete(&self) -> Result<Vec<u8>>;
}

/// Options controlling a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Page size requested from the provider
    pub per_page: u32,
    /// Keep fetching pages until caught up instead of stopping after one
    pub drain_backlog: bool,
    /// Upper bound on pages fetched when draining
    pub max_pages: usize,
    /// Also write every stored activity (and the athlete profile) here
    pub snapshot_dir: Option<SnapshotDir>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            per_page: 100,
            drain_backlog: false,
            max_pages: 50,
            snapshot_dir: None,
        }
    }
}

impl SyncOptions {
    fn page_size(&self) -> u32 {
        self.per_page.clamp(1, StravaClient::MAX_PER_PAGE)
    }
}

/// Statistics from a sync operation
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Number of pages requested from the provider
    pub pages_fetched: usize,
    /// Number of activities returned by the provider
    pub activities_fetched: usize,
    /// Number of activities upserted
    pub activities_stored: usize,
    /// High-water mark the run resumed from
    pub previous_high_water_mark: DateTime<Utc>,
    /// High-water mark after the run, read back from the store
    pub high_water_mark: DateTime<Utc>,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

impl SyncStats {
    fn starting_at(after: DateTime<Utc>) -> Self {
        Self {
            previous_high_water_mark: after,
            high_water_mark: after,
            ..Default::default()
        }
    }

    /// Whether the run moved the high-water mark forward
    pub fn advanced(&self) -> bool {
        self.high_water_mark > self.previous_high_water_mark
    }
}

/// Latest stored start time, or the epoch when nothing has been synced yet
pub fn high_water_mark(store: &dyn ActivityStore) -> Result<DateTime<Utc>> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    Ok(store
        .max_started_on()
        .context("Failed to read the latest activity start time")?
        .map_or(epoch, |latest| latest.max(epoch)))
}

/// Sync one page of new activities from `source` into `store`
///
/// Resumes strictly after the stored high-water mark. A failure part way
/// through leaves the already-upserted activities in place; rerunning is safe
/// because activities are upserted by remote id.
pub fn sync_activities(
    source: &dyn ActivitySource,
    store: &dyn ActivityStore,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let after = high_water_mark(store)?;
    sync_page(source, store, options, after)
}

/// Sync pages until the provider has nothing newer
///
/// Stops when a page comes back short, when the high-water mark stops
/// advancing, or after `max_pages` pages.
pub fn sync_until_caught_up(
    source: &dyn ActivitySource,
    store: &dyn ActivityStore,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let after = high_water_mark(store)?;
    drain(source, store, options, after)
}

/// Sync Strava activities, authenticating first
///
/// The high-water mark is read before any authentication so that an
/// unreadable store fails fast. The token manager may run the browser flow.
pub fn sync_strava(
    auth: &StravaAuth<'_>,
    store: &dyn ActivityStore,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let after = high_water_mark(store)?;
    log::info!("resuming Strava sync after {}", after);

    let client = auth.obtain_client()?;

    if let Some(dir) = &options.snapshot_dir {
        maybe_save_athlete(&client, dir)?;
    }

    if options.drain_backlog {
        drain(&client, store, options, after)
    } else {
        sync_page(&client, store, options, after)
    }
}

/// Save the athlete profile into the snapshot directory unless already present
///
/// Returns whether the profile was fetched and written.
pub fn maybe_save_athlete(source: &dyn ActivitySource, dir: &SnapshotDir) -> Result<bool> {
    let path = dir.athlete_path();
    if path.exists() {
        log::debug!("{} already exists, skipping athlete fetch", path.display());
        return Ok(false);
    }

    let body = source.fetch_athlete().context("Failed to fetch athlete profile")?;
    let path = dir.write_athlete(&body)?;
    log::info!("saved athlete profile to {}", path.display());
    Ok(true)
}

fn sync_page(
    source: &dyn ActivitySource,
    store: &dyn ActivityStore,
    options: &SyncOptions,
    after: DateTime<Utc>,
) -> Result<SyncStats> {
    let start = Instant::now();
    let mut stats = SyncStats::starting_at(after);

    // 1. Fetch one page strictly after the high-water mark
    log::info!("downloading activities after={}", after.timestamp());
    let page = source.list_activities_after(after, options.page_size())?;
    stats.pages_fetched = 1;
    stats.activities_fetched = page.len();

    // 2. Upsert each record; the page order is not trusted
    let mut newest: Option<DateTime<Utc>> = None;
    for payload in page {
        let activity = normalize_activity(payload)?;
        store_activity(store, options, &activity)?;
        stats.activities_stored += 1;
        newest = newest.max(Some(activity.started_on));
    }

    // 3. Read the mark back from what was actually persisted
    stats.high_water_mark = high_water_mark(store)?;
    if let Some(newest) = newest
        && newest > stats.high_water_mark
    {
        log::warn!(
            "store reports high-water mark {} behind newest synced activity {}",
            stats.high_water_mark,
            newest
        );
    }

    stats.duration_ms = start.elapsed().as_millis() as u64;
    log::info!(
        "stored {} of {} activities, high-water mark {}",
        stats.activities_stored,
        stats.activities_fetched,
        stats.high_water_mark
    );
    Ok(stats)
}

fn store_activity(
    store: &dyn ActivityStore,
    options: &SyncOptions,
    activity: &Activity,
) -> Result<()> {
    store
        .upsert_activity(activity)
        .with_context(|| format!("Failed to store activity {}", activity.remote_id))?;

    if let Some(dir) = &options.snapshot_dir {
        dir.write_activity(activity)?;
    }
    Ok(())
}

fn drain(
    source: &dyn ActivitySource,
    store: &dyn ActivityStore,
    options: &SyncOptions,
    mut after: DateTime<Utc>,
) -> Result<SyncStats> {
    let start = Instant::now();
    let mut total = SyncStats::starting_at(after);

    for _ in 0..options.max_pages.max(1) {
        let page = sync_page(source, store, options, after)?;
        total.pages_fetched += page.pages_fetched;
        total.activities_fetched += page.activities_fetched;
        total.activities_stored += page.activities_stored;
        total.high_water_mark = page.high_water_mark;

        if page.activities_fetched < options.page_size() as usize || !page.advanced() {
            break;
        }
        after = page.high_water_mark;
    }

    total.duration_ms = start.elapsed().as_millis() as u64;
    Ok(total)
}
