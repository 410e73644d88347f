//! Crawl command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::backends;
use crate::config::{CrawlConfig, resolve_db_path};
use crate::error::{Error, Result};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::identity::IdentityCache;
use crate::persist::Persister;
use crate::storage::SqliteStore;
use crate::sync::{
    Orchestrator, ParseContext, RunSummary, SyncSettings, TrackerJob, TrackerReport, WorkerStatus,
};

/// Build one job per selected tracker.
fn jobs(config: &CrawlConfig, names: &[String]) -> Result<Vec<TrackerJob>> {
    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::with_timeout(config.timeout()).map_err(|e| Error::Other(e.to_string()))?,
    );

    config
        .select(names)?
        .into_iter()
        .map(|tracker| {
            let backend = backends::build(tracker, Arc::clone(&transport))?;
            Ok(TrackerJob {
                name: tracker.name.clone(),
                adapter: backend.adapter,
                parser: backend.parser,
                page_size: config.page_size_for(tracker),
                delay: config.delay_for(tracker),
            })
        })
        .collect()
}

/// Execute the crawl command.
///
/// Returns the process exit code for a run that completed; a run stopped by
/// a fatal error returns that error after printing the summary.
///
/// # Errors
///
/// Returns an error if the configuration or database cannot be opened, or
/// the run hit a fatal tracker error.
pub fn execute(
    trackers: &[String],
    db_path: Option<&PathBuf>,
    config_path: Option<&PathBuf>,
    json: bool,
    quiet: bool,
) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let jobs = jobs(&config, trackers)?;

    let db_path = resolve_db_path(db_path.map(PathBuf::as_path), Some(&config))
        .ok_or_else(|| Error::Config("cannot determine the database path; pass --db".into()))?;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    tracing::info!(db = %db_path.display(), "Opening database");
    let store = Arc::new(SqliteStore::open(&db_path)?);
    let persister = Arc::new(Persister::new(store, Arc::new(IdentityCache::new())));

    let settings = SyncSettings {
        retry: config.retry_policy(),
        parse: ParseContext {
            terminal: config.terminal(),
        },
    };
    let orchestrator = Arc::new(Orchestrator::new(persister, settings));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(async {
        let cancel = orchestrator.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; stopping after the current issue");
                cancel.cancel();
            }
        });
        orchestrator.run_all(jobs).await
    });

    if json {
        println!("{}", serde_json::to_string(&outcome.summary)?);
    } else if !quiet {
        print_summary(&outcome.summary);
    }

    let code = outcome.exit_code();
    match outcome.fatal {
        Some(err) => Err(err),
        None => Ok(code),
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {}",
        "Crawl".bold(),
        format!("run {}", summary.run_id).dimmed()
    );
    for report in &summary.trackers {
        print_report(report);
    }
    println!();
    println!(
        "{} processed, {} skipped",
        summary.processed().to_string().bold(),
        summary.skipped().to_string().bold()
    );
}

fn print_report(report: &TrackerReport) {
    let status = match report.status {
        WorkerStatus::Completed => "completed".green(),
        WorkerStatus::Cancelled => "cancelled".yellow(),
        WorkerStatus::Failed => "failed".red(),
    };
    println!();
    println!(
        "{} {} {status}",
        report.tracker.cyan().bold(),
        format!("[{}]", report.backend).dimmed()
    );
    println!(
        "  issues:      {} processed ({} new), {} unchanged",
        report.processed, report.created, report.unchanged
    );
    println!(
        "  comments:    +{}  attachments: +{}  changes: +{}  watchers: +{}",
        report.comments.inserted,
        report.attachments.inserted,
        report.changes.inserted,
        report.watchers.inserted
    );
    if report.warnings > 0 {
        println!("  {}", format!("{} change entries dropped", report.warnings).yellow());
    }
    match report.watermark {
        Some(w) => println!("  watermark:   {}", w.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  watermark:   {}", "none".dimmed()),
    }
    if !report.skipped.is_empty() {
        println!("  {}", format!("skipped {}:", report.skipped.len()).yellow());
        for skip in &report.skipped {
            println!("    #{} {}", skip.issue_id, skip.reason.dimmed());
        }
    }
    if let Some(error) = &report.error {
        println!("  {} {error}", "error:".red());
    }
}
