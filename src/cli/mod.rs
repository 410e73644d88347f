//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// issuecrawl - Incremental issue-tracker history crawler
#[derive(Parser, Debug)]
#[command(name = "issuecrawl", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.issuecrawl/data/issuecrawl.db)
    #[arg(long, global = true, env = "ISSUECRAWL_DB")]
    pub db: Option<PathBuf>,

    /// Configuration file (default: ~/.issuecrawl/config.json)
    #[arg(long, global = true, env = "ISSUECRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the configured trackers and store new history
    Crawl {
        /// Only crawl the named tracker (repeatable)
        #[arg(short, long = "tracker", value_name = "NAME")]
        trackers: Vec<String>,
    },

    /// Show stored trackers, watermarks and counts
    Status,

    /// Validate the configuration file without contacting any tracker
    CheckConfig,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
