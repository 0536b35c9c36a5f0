//! Title lookup for media downloads submitted without a base name

use super::command::title_args;
use crate::utils::sanitize_title;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Ask the tool for the title of `url`
///
/// Returns the first non-empty line of output, or None if the tool fails,
/// prints nothing, or does not answer within `timeout`. The child is killed
/// when the timeout expires.
pub(crate) async fn lookup_title(program: &Path, url: &str, timeout: Duration) -> Option<String> {
    let mut command = Command::new(program);
    command
        .args(title_args(url))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!(url = %url, error = %e, "title lookup could not run");
            return None;
        }
        Err(_) => {
            tracing::warn!(url = %url, timeout = ?timeout, "title lookup timed out");
            return None;
        }
    };

    if !output.status.success() {
        tracing::warn!(url = %url, code = ?output.status.code(), "title lookup failed");
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Look up and sanitize a title; never empty
pub(crate) async fn resolve_title(program: &Path, url: &str, timeout: Duration) -> String {
    let raw = lookup_title(program, url, timeout).await.unwrap_or_default();
    sanitize_title(&raw)
}
