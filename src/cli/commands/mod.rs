//! Command implementations.

pub mod check_config;
pub mod completions;
pub mod crawl;
pub mod status;
pub mod version;

use std::path::PathBuf;

use crate::config::{CrawlConfig, resolve_config_path};
use crate::error::{Error, Result};

/// Locate and load the crawl configuration.
///
/// # Errors
///
/// Returns `Error::Config` if no file can be located or it is invalid.
pub fn load_config(explicit: Option<&PathBuf>) -> Result<CrawlConfig> {
    let path = resolve_config_path(explicit.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("cannot determine the configuration path; pass --config".into()))?;
    if !path.exists() {
        return Err(Error::Config(format!(
            "configuration file {} does not exist",
            path.display()
        )));
    }
    CrawlConfig::load(&path)
}
