//! Check-config command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use crate::backends;
use crate::config::resolve_db_path;
use crate::error::Result;
use crate::http::{HttpTransport, ReqwestTransport};

#[derive(Serialize)]
struct CheckOutput {
    db_path: Option<String>,
    trackers: Vec<TrackerCheck>,
}

#[derive(Serialize)]
struct TrackerCheck {
    name: String,
    backend: String,
    url: String,
    page_size: usize,
    delay_ms: u128,
    has_token: bool,
}

/// Validate the configuration and build every backend without network access.
///
/// # Errors
///
/// Returns `Error::Config` for the first invalid setting.
pub fn execute(db_path: Option<&PathBuf>, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::with_timeout(config.timeout())
            .map_err(|e| crate::Error::Other(e.to_string()))?,
    );

    let mut trackers = Vec::with_capacity(config.trackers.len());
    for tracker in &config.trackers {
        backends::build(tracker, Arc::clone(&transport))?;
        trackers.push(TrackerCheck {
            name: tracker.name.clone(),
            backend: tracker.backend.to_string(),
            url: tracker.parsed_url()?.to_string(),
            page_size: config.page_size_for(tracker),
            delay_ms: config.delay_for(tracker).as_millis(),
            has_token: tracker.resolved_token().is_some(),
        });
    }

    let output = CheckOutput {
        db_path: resolve_db_path(db_path.map(PathBuf::as_path), Some(&config))
            .map(|p| p.display().to_string()),
        trackers,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} configuration is valid", "✓".green());
    if let Some(db) = &output.db_path {
        println!("  database: {db}");
    }
    for t in &output.trackers {
        let auth = if t.has_token { "token" } else { "anonymous" };
        println!(
            "  {} {} {} {}",
            t.name.cyan(),
            format!("[{}]", t.backend).dimmed(),
            t.url,
            format!("(page {}, delay {}ms, {auth})", t.page_size, t.delay_ms).dimmed()
        );
    }
    Ok(())
}
