//! SQLite-based storage for credentials, activities and milestones

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::{ActivityStore, CredentialStore, MilestoneStore};
use crate::models::{Activity, ActivityTypeCount, Credential, Milestone, RemoteId, StoredActivity};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- OAuth tokens, one row per credential name
            CREATE TABLE credentials (
                name TEXT PRIMARY KEY NOT NULL,
                data BLOB NOT NULL,
                expires_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Activities as fetched from Strava
            CREATE TABLE strava_activities (
                remote_id INTEGER PRIMARY KEY NOT NULL,
                external_id TEXT,
                name TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                data TEXT NOT NULL,
                started_on TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX idx_strava_activities_started_on
                ON strava_activities(started_on DESC);
            "#,
        ),
        // Migration 2: Manually recorded milestones
        M::up(
            r#"
            CREATE TABLE milestones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                description TEXT NOT NULL,
                started_on TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        ),
    ])
}

/// Format a timestamp for storage
///
/// Fixed-width UTC RFC 3339 so that text ordering (and `MAX`) matches
/// chronological ordering.
fn to_sql_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_sql_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

/// Read a timestamp column inside a row mapper
fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    parse_sql_time(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map the leading activity columns of a row
///
/// Expects: remote_id, external_id, name, activity_type, started_on, data
fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        remote_id: RemoteId::new(row.get(0)?),
        external_id: row.get(1)?,
        name: row.get(2)?,
        activity_type: row.get(3)?,
        started_on: get_time(row, 4)?,
        data: row.get(5)?,
    })
}

/// SQLite-backed store implementing every storage trait
///
/// All access goes through a single connection; writes are serialized by the
/// mutex and each upsert is a single statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and migrate it
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            config::ensure_dir(parent)?;
        }

        let exists = db_path.exists();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        if exists {
            log::info!("opened database {}", db_path.display());
        } else {
            log::info!("created database {}", db_path.display());
        }

        // WAL keeps readers (the status endpoint) unblocked during a sync
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CredentialStore for SqliteStore {
    fn put_credential(&self, name: &str, blob: &[u8], expires_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO credentials (name, data, expires_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                data = excluded.data,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![name, blob, to_sql_time(expires_at), to_sql_time(Utc::now())],
        )
        .with_context(|| format!("Failed to save {} credentials", name))?;

        log::debug!("saved {} credentials expiring {}", name, expires_at);
        Ok(())
    }

    fn get_credential(&self, name: &str) -> Result<Option<Credential>> {
        let conn = self.conn.lock().unwrap();
        let credential = conn
            .query_row(
                "SELECT name, data, expires_at, updated_at FROM credentials WHERE name = ?",
                [name],
                |row| {
                    Ok(Credential {
                        name: row.get(0)?,
                        blob: row.get(1)?,
                        expires_at: get_time(row, 2)?,
                        updated_at: get_time(row, 3)?,
                    })
                },
            )
            .optional()?;

        Ok(credential)
    }
}

impl ActivityStore for SqliteStore {
    fn max_started_on(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<String> =
            conn.query_row("SELECT MAX(started_on) FROM strava_activities", [], |row| {
                row.get(0)
            })?;

        latest
            .map(|value| {
                parse_sql_time(&value)
                    .with_context(|| format!("Invalid started_on in database: {}", value))
            })
            .transpose()
    }

    fn upsert_activity(&self, activity: &Activity) -> Result<()> {
        let now = to_sql_time(Utc::now());
        let conn = self.conn.lock().unwrap();

        // ON CONFLICT DO UPDATE keeps the original created_at
        conn.execute(
            "INSERT INTO strava_activities
             (remote_id, external_id, name, activity_type, data, started_on, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(remote_id) DO UPDATE SET
                external_id = excluded.external_id,
                name = excluded.name,
                activity_type = excluded.activity_type,
                data = excluded.data,
                started_on = excluded.started_on,
                updated_at = excluded.updated_at",
            params![
                activity.remote_id.get(),
                activity.external_id,
                activity.name,
                activity.activity_type,
                activity.data,
                to_sql_time(activity.started_on),
                now,
                now,
            ],
        )
        .with_context(|| format!("Failed to upsert activity {}", activity.remote_id))?;

        Ok(())
    }

    fn get_activity(&self, id: RemoteId) -> Result<Option<StoredActivity>> {
        let conn = self.conn.lock().unwrap();
        let stored = conn
            .query_row(
                "SELECT remote_id, external_id, name, activity_type, started_on, data,
                        created_at, updated_at
                 FROM strava_activities WHERE remote_id = ?",
                [id.get()],
                |row| {
                    Ok(StoredActivity {
                        activity: activity_from_row(row)?,
                        created_at: get_time(row, 6)?,
                        updated_at: get_time(row, 7)?,
                    })
                },
            )
            .optional()?;

        Ok(stored)
    }

    fn count_activities(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM strava_activities", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_recent_activities(&self, limit: usize) -> Result<Vec<Activity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT remote_id, external_id, name, activity_type, started_on, data
             FROM strava_activities
             ORDER BY started_on DESC, remote_id DESC
             LIMIT ?",
        )?;

        let activities = stmt
            .query_map([limit as i64], activity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(activities)
    }

    fn count_by_type(&self) -> Result<Vec<ActivityTypeCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT activity_type, COUNT(*) FROM strava_activities
             GROUP BY activity_type
             ORDER BY activity_type ASC",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok(ActivityTypeCount {
                    activity_type: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    fn list_activity_types(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT activity_type FROM strava_activities ORDER BY activity_type ASC",
        )?;

        let types = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(types)
    }
}

impl MilestoneStore for SqliteStore {
    fn record_milestone(&self, milestone: &Milestone) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO milestones (name, activity_type, description, started_on)
             VALUES (?, ?, ?, ?)",
            params![
                milestone.name,
                milestone.activity_type,
                milestone.description,
                to_sql_time(milestone.started_on),
            ],
        )
        .context("Failed to record milestone")?;
        Ok(())
    }

    fn list_milestones(&self) -> Result<Vec<Milestone>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, activity_type, description, started_on FROM milestones
             ORDER BY started_on ASC, id ASC",
        )?;

        let milestones = stmt
            .query_map([], |row| {
                Ok(Milestone {
                    name: row.get(0)?,
                    activity_type: row.get(1)?,
                    description: row.get(2)?,
                    started_on: get_time(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(milestones)
    }
}
