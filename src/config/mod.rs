//! Configuration management.
//!
//! A crawl is driven by one [`CrawlConfig`] loaded from a JSON file and
//! passed explicitly to the orchestrator and every backend.
//!
//! # Path resolution
//!
//! Both the configuration file and the database are resolved the same way:
//! 1. an explicit path from the command line
//! 2. `ISSUECRAWL_CONFIG` / `ISSUECRAWL_DB`
//! 3. the global location under `~/.issuecrawl/`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::backends::BackendKind;
use crate::changelog::{DEFAULT_TERMINAL_STATUSES, TerminalStatuses};
use crate::error::{Error, Result};
use crate::sync::retry::{
    DEFAULT_BACKOFF_CEILING_MS, DEFAULT_FIRST_BACKOFF_MS, DEFAULT_RATE_LIMIT_WAITS, DEFAULT_RETRIES,
};
use crate::sync::{Backoff, RetryPolicy};

/// Default inter-issue delay.
pub const DEFAULT_DELAY_MS: u64 = 1_000;
/// Default listing page size.
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Default HTTP/ssh timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_terminal_statuses() -> Vec<String> {
    DEFAULT_TERMINAL_STATUSES.iter().map(|s| (*s).to_string()).collect()
}

/// Retry settings as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub attempts: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub rate_limit_waits: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRIES,
            min_backoff_ms: DEFAULT_FIRST_BACKOFF_MS,
            max_backoff_ms: DEFAULT_BACKOFF_CEILING_MS,
            rate_limit_waits: DEFAULT_RATE_LIMIT_WAITS,
        }
    }
}

/// One tracker to crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Unique name used on the command line and in reports.
    pub name: String,
    pub backend: BackendKind,
    pub url: String,
    /// Product, project or tool path, depending on the backend.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the token; wins over `token`.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Filled in from the crawl-wide setting at load time.
    #[serde(skip)]
    timeout_secs: u64,
}

impl TrackerConfig {
    /// The tracker URL with a trailing slash so relative joins stay below it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the URL does not parse.
    pub fn parsed_url(&self) -> Result<Url> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| {
            Error::Config(format!("tracker '{}': invalid url '{}': {e}", self.name, self.url))
        })
    }

    /// The API token, read from `token_env` when set.
    #[must_use]
    pub fn resolved_token(&self) -> Option<String> {
        if let Some(var) = &self.token_env {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    return Some(value);
                }
            }
        }
        self.token.clone().filter(|t| !t.trim().is_empty())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(if self.timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            self.timeout_secs
        })
    }
}

/// The whole crawl configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlConfig {
    /// Database path; the command line and `ISSUECRAWL_DB` take precedence.
    #[serde(default)]
    pub db: Option<PathBuf>,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_terminal_statuses")]
    pub terminal_statuses: Vec<String>,
    pub trackers: Vec<TrackerConfig>,
}

impl CrawlConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is missing, malformed or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), config_message(e))))
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text is malformed or invalid.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        for tracker in &mut config.trackers {
            tracker.timeout_secs = config.timeout_secs;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the rules serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.trackers.is_empty() {
            return Err(Error::Config("no trackers configured".into()));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be greater than 0".into()));
        }

        let mut names = HashSet::new();
        for tracker in &self.trackers {
            if tracker.name.trim().is_empty() {
                return Err(Error::Config("tracker with an empty name".into()));
            }
            if !names.insert(tracker.name.as_str()) {
                return Err(Error::Config(format!("duplicate tracker name '{}'", tracker.name)));
            }
            tracker.parsed_url()?;
            if tracker.page_size == Some(0) {
                return Err(Error::Config(format!(
                    "tracker '{}': page_size must be greater than 0",
                    tracker.name
                )));
            }
            if tracker.backend.requires_project() && tracker.project.is_none() {
                return Err(Error::Config(format!(
                    "tracker '{}': backend {} needs a `project`",
                    tracker.name, tracker.backend
                )));
            }
        }
        Ok(())
    }

    /// Trackers selected by name; all of them when `names` is empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a name that is not configured.
    pub fn select(&self, names: &[String]) -> Result<Vec<&TrackerConfig>> {
        if names.is_empty() {
            return Ok(self.trackers.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.trackers
                    .iter()
                    .find(|t| &t.name == name)
                    .ok_or_else(|| Error::InvalidArgument(format!("no tracker named '{name}'")))
            })
            .collect()
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            transient: Backoff {
                first: Duration::from_millis(self.retry.min_backoff_ms),
                ceiling: Duration::from_millis(self.retry.max_backoff_ms),
                retries: self.retry.attempts,
            },
            rate_limit_waits: self.retry.rate_limit_waits,
        }
    }

    #[must_use]
    pub fn terminal(&self) -> TerminalStatuses {
        TerminalStatuses::new(&self.terminal_statuses)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Page size for a tracker, falling back to the crawl-wide value.
    #[must_use]
    pub fn page_size_for(&self, tracker: &TrackerConfig) -> usize {
        tracker.page_size.unwrap_or(self.page_size)
    }

    /// Inter-issue delay for a tracker, falling back to the crawl-wide value.
    #[must_use]
    pub fn delay_for(&self, tracker: &TrackerConfig) -> Duration {
        Duration::from_millis(tracker.delay_ms.unwrap_or(self.delay_ms))
    }
}

fn config_message(err: Error) -> String {
    match err {
        Error::Config(message) => message,
        other => other.to_string(),
    }
}

/// Get the global issuecrawl directory location (`~/.issuecrawl/`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".issuecrawl"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the configuration file path.
///
/// Priority: explicit flag, `ISSUECRAWL_CONFIG`, `~/.issuecrawl/config.json`.
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    env_path("ISSUECRAWL_CONFIG").or_else(|| global_dir().map(|dir| dir.join("config.json")))
}

/// Resolve the database path.
///
/// Priority: explicit flag, `ISSUECRAWL_DB`, the `db` setting of the loaded
/// configuration, `~/.issuecrawl/data/issuecrawl.db`.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, config: Option<&CrawlConfig>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    env_path("ISSUECRAWL_DB")
        .or_else(|| config.and_then(|c| c.db.clone()))
        .or_else(|| global_dir().map(|dir| dir.join("data").join("issuecrawl.db")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "trackers": [
            {"name": "moz", "backend": "bugzilla", "url": "https://bugzilla.example.org", "project": "Core"},
            {"name": "review", "backend": "gerrit", "url": "ssh://review.example.org:29418", "project": "core",
             "page_size": 25, "delay_ms": 0}
        ]
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = CrawlConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.delay_ms, DEFAULT_DELAY_MS);
        assert!(config.terminal().contains("RESOLVED"));
        assert_eq!(config.retry_policy(), RetryPolicy::default());

        let review = &config.trackers[1];
        assert_eq!(config.page_size_for(review), 25);
        assert_eq!(config.delay_for(review), Duration::ZERO);
        assert_eq!(review.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_parsed_url_gets_trailing_slash() {
        let config = CrawlConfig::from_json(MINIMAL).unwrap();
        let url = config.trackers[0].parsed_url().unwrap();
        assert_eq!(url.as_str(), "https://bugzilla.example.org/");
    }

    #[test]
    fn test_retry_settings_map_to_policy() {
        let config = CrawlConfig::from_json(
            r#"{"retry": {"attempts": 2, "min_backoff_ms": 50, "max_backoff_ms": 400, "rate_limit_waits": 0},
                "trackers": [{"name": "a", "backend": "redmine", "url": "https://r.example.org"}]}"#,
        )
        .unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.transient.retries, 2);
        assert_eq!(policy.transient.first, Duration::from_millis(50));
        assert_eq!(policy.transient.ceiling, Duration::from_millis(400));
        assert_eq!(policy.rate_limit_waits, 0);
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let text = r#"{"trackers": [
            {"name": "a", "backend": "redmine", "url": "https://r.example.org"},
            {"name": "a", "backend": "redmine", "url": "https://r2.example.org"}]}"#;
        let err = CrawlConfig::from_json(text).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_unknown_backend_and_bad_url() {
        let unknown = r#"{"trackers": [{"name": "a", "backend": "trac", "url": "https://t.example.org"}]}"#;
        assert!(matches!(CrawlConfig::from_json(unknown), Err(Error::Config(_))));

        let bad_url = r#"{"trackers": [{"name": "a", "backend": "redmine", "url": "not a url"}]}"#;
        assert!(matches!(CrawlConfig::from_json(bad_url), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_empty_and_missing_project() {
        assert!(CrawlConfig::from_json(r#"{"trackers": []}"#).is_err());
        let no_project = r#"{"trackers": [{"name": "a", "backend": "allura", "url": "https://forge.example.org"}]}"#;
        let err = CrawlConfig::from_json(no_project).unwrap_err();
        assert!(err.to_string().contains("project"));
    }

    #[test]
    fn test_select_by_name() {
        let config = CrawlConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.select(&[]).unwrap().len(), 2);
        assert_eq!(config.select(&["review".into()]).unwrap()[0].name, "review");
        assert!(matches!(
            config.select(&["nope".into()]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_paths_with_explicit() {
        let explicit = PathBuf::from("/custom/crawl.db");
        assert_eq!(resolve_db_path(Some(&explicit), None), Some(explicit));
        let config = PathBuf::from("/custom/config.json");
        assert_eq!(resolve_config_path(Some(&config)), Some(config));
    }

    #[test]
    fn test_token_env_wins() {
        let tracker = TrackerConfig {
            name: "t".into(),
            backend: BackendKind::Redmine,
            url: "https://r.example.org".into(),
            project: None,
            token: Some("inline".into()),
            token_env: Some("ISSUECRAWL_TEST_TOKEN_UNSET_VAR".into()),
            user: None,
            page_size: None,
            delay_ms: None,
            timeout_secs: 0,
        };
        assert_eq!(tracker.resolved_token().as_deref(), Some("inline"));
    }
}
