use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use url::Url;

use super::DEFAULT_SSH_PORT;
use crate::error::{Error, Result};
use crate::sync::FetchError;

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Runs a remote Gerrit command and returns its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Host, port and login of a Gerrit ssh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
}

impl SshTarget {
    /// Derive the ssh endpoint from the tracker URL.
    ///
    /// `ssh://user@host:port` is used as is; for any other scheme only the
    /// host is kept and the default Gerrit port applies.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the URL has no host.
    pub fn from_url(url: &Url, user: Option<String>) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("gerrit url '{url}' has no host")))?
            .to_string();
        let (port, url_user) = if url.scheme() == "ssh" {
            let login = Some(url.username()).filter(|u| !u.is_empty());
            (url.port().unwrap_or(DEFAULT_SSH_PORT), login.map(str::to_string))
        } else {
            (DEFAULT_SSH_PORT, None)
        };
        Ok(Self {
            host,
            port,
            user: user.or(url_user),
        })
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// Runs commands through the system `ssh` client in batch mode.
pub struct SshRunner {
    target: SshTarget,
    timeout: Duration,
}

impl SshRunner {
    #[must_use]
    pub const fn new(target: SshTarget, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p")
            .arg(self.target.port.to_string())
            .args(["-o", "BatchMode=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.timeout.as_secs().max(1)))
            .arg(self.target.destination())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run(&self, args: &[String]) -> std::result::Result<Vec<u8>, FetchError> {
        tracing::debug!(host = %self.target.host, command = %args.join(" "), "Running gerrit command");

        let output = tokio::time::timeout(self.timeout, self.command(args).output())
            .await
            .map_err(|_| FetchError::Timeout(format!("ssh to {} timed out", self.target.host)))?
            .map_err(|e| FetchError::Unreachable(format!("cannot run ssh: {e}")))?;

        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(output.status.code(), stderr))
    }
}

/// Map a failed ssh invocation to a fetch error.
fn classify_failure(code: Option<i32>, stderr: String) -> FetchError {
    if stderr.contains("Permission denied") || stderr.contains("not authorized") {
        FetchError::Auth(stderr)
    } else if code == Some(SSH_CONNECTION_FAILURE) {
        FetchError::Unreachable(stderr)
    } else {
        FetchError::Transient(stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_ssh_url() {
        let url = Url::parse("ssh://bot@review.example.org:2222/").unwrap();
        let target = SshTarget::from_url(&url, None).unwrap();
        assert_eq!(target.host, "review.example.org");
        assert_eq!(target.port, 2222);
        assert_eq!(target.destination(), "bot@review.example.org");
    }

    #[test]
    fn test_target_from_https_url_uses_default_port() {
        let url = Url::parse("https://review.example.org/").unwrap();
        let target = SshTarget::from_url(&url, Some("ann".into())).unwrap();
        assert_eq!(target.port, DEFAULT_SSH_PORT);
        assert_eq!(target.user.as_deref(), Some("ann"));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(Some(255), "Permission denied (publickey).".into()),
            FetchError::Auth(_)
        ));
        assert!(matches!(
            classify_failure(Some(255), "Connection refused".into()),
            FetchError::Unreachable(_)
        ));
        assert!(matches!(classify_failure(Some(1), "fatal".into()), FetchError::Transient(_)));
    }
}
