//! Status command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::config::{CrawlConfig, resolve_db_path};
use crate::error::{Error, Result};
use crate::identity::IdentityCache;
use crate::persist::{Persister, TrackerOverview};
use crate::storage::SqliteStore;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    db_path: String,
    trackers: Vec<TrackerStatus>,
}

#[derive(Serialize)]
struct TrackerStatus {
    /// Configured name, when the stored tracker matches a configured one.
    name: Option<String>,
    backend: String,
    url: String,
    version: Option<String>,
    issues: usize,
    identities: usize,
    watermark: Option<DateTime<Utc>>,
    last_synced_at: Option<DateTime<Utc>>,
    /// True if the last run stopped mid-window.
    resuming: bool,
}

impl TrackerStatus {
    fn new(overview: TrackerOverview, config: Option<&CrawlConfig>) -> Self {
        let tracker = overview.tracker;
        let name = config.and_then(|c| {
            c.trackers
                .iter()
                .find(|t| {
                    t.backend.as_str() == tracker.backend_name
                        && t.parsed_url().is_ok_and(|u| u.as_str() == tracker.url)
                })
                .map(|t| t.name.clone())
        });
        Self {
            name,
            resuming: tracker.checkpoint.is_resuming(),
            watermark: tracker.checkpoint.watermark,
            backend: tracker.backend_name,
            url: tracker.url,
            version: tracker.backend_version,
            issues: overview.issues,
            identities: overview.identities,
            last_synced_at: tracker.last_synced_at,
        }
    }
}

/// Execute status command.
///
/// The configuration is optional here; it only supplies tracker names and
/// a configured database path.
pub fn execute(db_path: Option<&PathBuf>, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = super::load_config(config_path).ok();
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path), config.as_ref())
        .ok_or_else(|| Error::Config("cannot determine the database path; pass --db".into()))?;

    if !db_path.exists() {
        return Err(Error::NotInitialized { path: db_path });
    }

    let store = Arc::new(SqliteStore::open(&db_path)?);
    let persister = Persister::new(store, Arc::new(IdentityCache::new()));
    let trackers: Vec<TrackerStatus> = persister
        .tracker_overview()?
        .into_iter()
        .map(|o| TrackerStatus::new(o, config.as_ref()))
        .collect();

    if json {
        let output = StatusOutput {
            db_path: db_path.display().to_string(),
            trackers,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} {}", "Database:".bold(), db_path.display());
    if trackers.is_empty() {
        println!("{}", "No trackers crawled yet.".dimmed());
        return Ok(());
    }

    for t in &trackers {
        let label = t.name.clone().unwrap_or_else(|| t.url.clone());
        println!();
        println!("{} {}", label.cyan().bold(), format!("[{}]", t.backend).dimmed());
        if t.name.is_some() {
            println!("  url:          {}", t.url);
        }
        if let Some(version) = &t.version {
            println!("  version:      {version}");
        }
        println!("  issues:       {}", t.issues);
        println!("  identities:   {}", t.identities);
        println!("  watermark:    {}", format_time(t.watermark));
        println!("  last synced:  {}", format_time(t.last_synced_at));
        if t.resuming {
            println!("  {}", "interrupted window will resume on next crawl".yellow());
        }
    }
    Ok(())
}

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}
