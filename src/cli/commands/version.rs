//! Version command implementation.

use crate::backends::BackendKind;
use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    backends: Vec<&'static str>,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let backends = BackendKind::ALL.iter().map(BackendKind::as_str).collect::<Vec<_>>();

    if json {
        let output = VersionOutput {
            version,
            build,
            backends,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(());
    }

    println!("issuecrawl version {version} ({build})");
    println!("backends: {}", backends.join(", "));
    Ok(())
}
