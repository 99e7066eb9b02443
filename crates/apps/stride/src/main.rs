//! Stride - Strava activity sync
//!
//! Command line entry point: syncs activities into a local SQLite database,
//! renders reports, records milestones and serves a small status endpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use fitsync::{
    OAuthConfig, SnapshotDir, SqliteStore, StravaAuth, StravaCredentials, SyncOptions, SyncStats,
};

mod milestone;
mod report;
mod server;

/// Sync Strava activities into a local database.
#[derive(Parser, Debug)]
#[command(name = "stride", version, about = "Sync Strava activities into a local database")]
struct Cli {
    /// Path to the SQLite database (defaults to the Stride data directory).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download activities newer than the latest stored one.
    Sync {
        /// Activities requested per page (max 200).
        #[arg(long, default_value_t = 100)]
        per_page: u32,

        /// Keep paging until caught up instead of fetching a single page.
        #[arg(long)]
        all: bool,

        /// Also write a JSON snapshot of every activity and the athlete profile.
        #[arg(long)]
        snapshots: bool,

        /// Snapshot directory (implies --snapshots).
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Show activity counts and milestones.
    Stats,

    /// Record a milestone interactively.
    Milestone,

    /// Serve the status endpoint.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind.
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },

    /// Make sure a valid Strava token is stored, authorizing if needed.
    Auth,
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Bootstrap config and data directories
    config::init().context("Failed to initialize Stride directories")?;

    let db_path = match cli.database {
        Some(path) => path,
        None => fitsync::default_database_path().context("Could not determine data directory")?,
    };
    let store = SqliteStore::open(&db_path)?;

    match cli.command {
        Command::Sync {
            per_page,
            all,
            snapshots,
            snapshot_dir,
        } => {
            let snapshot_dir = match (snapshot_dir, snapshots) {
                (Some(dir), _) => Some(SnapshotDir::create(dir)?),
                (None, true) => {
                    let dir = fitsync::default_snapshot_dir()
                        .context("Could not determine data directory")?;
                    Some(SnapshotDir::create(dir)?)
                }
                (None, false) => None,
            };
            let options = SyncOptions {
                per_page,
                drain_backlog: all,
                snapshot_dir,
                ..Default::default()
            };
            sync(&store, &options)
        }
        Command::Stats => report::print_stats(&store),
        Command::Milestone => {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            milestone::prompt(&store, &mut stdin.lock(), &mut stdout)?;
            Ok(())
        }
        Command::Serve { host, port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(Arc::new(store), &host, port))
        }
        Command::Auth => {
            let auth = StravaAuth::new(oauth_config()?, &store);
            if auth.is_authenticated() {
                info!("Strava token is valid");
                return Ok(());
            }
            auth.obtain_client()?;
            println!("Connected to Strava");
            Ok(())
        }
    }
}

/// Load OAuth settings, pointing at the credential file when nothing is configured
fn oauth_config() -> Result<OAuthConfig> {
    if !StravaCredentials::is_available() {
        if let Some(path) = StravaCredentials::default_credentials_path() {
            warn!(
                "To configure Strava access, either:\n\
                 1. Place your Strava API credentials at: {}\n\
                 2. Or set STRAVA_CLIENT_ID and STRAVA_CLIENT_SECRET (a .env file works)",
                path.display()
            );
        }
    }

    let creds = StravaCredentials::load()?;
    Ok(OAuthConfig::from_credentials(&creds))
}

fn sync(store: &SqliteStore, options: &SyncOptions) -> Result<()> {
    let auth = StravaAuth::new(oauth_config()?, store);
    let stats = fitsync::sync_strava(&auth, store, options)?;
    print_sync_stats(&stats);
    Ok(())
}

fn print_sync_stats(stats: &SyncStats) {
    println!("== sync ==");
    println!("pages fetched:       {}", stats.pages_fetched);
    println!("activities fetched:  {}", stats.activities_fetched);
    println!("activities stored:   {}", stats.activities_stored);
    println!(
        "latest activity:     {} (was {})",
        stats.high_water_mark, stats.previous_high_water_mark
    );
    println!("took:                {}ms", stats.duration_ms);
}
