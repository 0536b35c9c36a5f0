//! Resolution of the external downloader executable

use crate::config::ToolsConfig;
use crate::http::HttpDownloader;
use crate::types::Failure;
use crate::utils::{append_extension, ensure_dir, remove_file_quietly};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Tool name used in diagnostics and PATH lookups
pub const TOOL_NAME: &str = "yt-dlp";

/// Platform-specific executable file name
pub fn executable_name() -> &'static str {
    if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" }
}

/// Finds the external downloader, fetching it once if necessary
///
/// Lookup order:
/// 1. `tools.ytdlp_path` when configured
/// 2. a bundled copy in `tools.bundled_dir`
/// 3. the executable search path (when `tools.search_path` is set)
/// 4. a fresh download into `tools.bin_dir` (when `tools.auto_fetch` is set)
///
/// A successful resolution is cached; failures are retried on the next call.
/// Resolution runs on its own tokio task shared by every caller, so a caller
/// that is cancelled mid-fetch leaves the download running for the others and
/// at most one fetch is ever in flight.
pub struct ToolLocator {
    inner: Arc<LocatorInner>,
}

struct LocatorInner {
    config: ToolsConfig,
    http: HttpDownloader,
    resolved: OnceCell<PathBuf>,
}

impl ToolLocator {
    /// Create a locator; the HTTP downloader is used for the fetch step
    pub fn new(config: ToolsConfig, http: HttpDownloader) -> Self {
        Self {
            inner: Arc::new(LocatorInner {
                config,
                http,
                resolved: OnceCell::new(),
            }),
        }
    }

    /// Path of the executable, resolving it on first use
    pub async fn resolve(&self) -> Result<PathBuf, Failure> {
        if let Some(path) = self.inner.resolved.get() {
            return Ok(path.clone());
        }

        let inner = self.inner.clone();
        let resolution = tokio::spawn(async move {
            inner
                .resolved
                .get_or_try_init(|| inner.locate())
                .await
                .cloned()
        });

        resolution.await.map_err(|e| Failure::ToolNotFound {
            tool: TOOL_NAME.into(),
            detail: format!("tool resolution task failed: {e}"),
        })?
    }
}

impl LocatorInner {
    async fn locate(&self) -> Result<PathBuf, Failure> {
        if let Some(path) = &self.config.ytdlp_path {
            tracing::debug!(path = %path.display(), "using configured yt-dlp");
            return Ok(path.clone());
        }

        let bundled = self.config.bundled_dir.join(executable_name());
        if bundled.is_file() {
            tracing::debug!(path = %bundled.display(), "using bundled yt-dlp");
            return Ok(bundled);
        }

        if self.config.search_path
            && let Ok(path) = which::which(TOOL_NAME)
        {
            tracing::debug!(path = %path.display(), "found yt-dlp on PATH");
            return Ok(path);
        }

        if !self.config.auto_fetch {
            return Err(Failure::ToolNotFound {
                tool: TOOL_NAME.into(),
                detail: "not bundled, not on PATH, and automatic download is disabled".into(),
            });
        }

        self.fetch().await
    }

    /// Download into a staging file next to the target, then rename into place
    async fn fetch(&self) -> Result<PathBuf, Failure> {
        let target = self.config.bin_dir.join(executable_name());
        let staging = append_extension(&target, "download");
        tracing::info!(url = %self.config.fetch_url, path = %target.display(), "downloading yt-dlp");

        let not_found = |detail: String| Failure::ToolNotFound {
            tool: TOOL_NAME.into(),
            detail,
        };

        ensure_dir(&self.config.bin_dir)
            .await
            .map_err(|e| not_found(format!("cannot prepare {}: {e}", self.config.bin_dir.display())))?;

        self.http
            .fetch(&self.config.fetch_url, &staging)
            .await
            .map_err(|failure| not_found(format!("download failed: {failure}")))?;

        if let Err(e) = install(&staging, &target).await {
            remove_file_quietly(&staging).await;
            return Err(not_found(format!("cannot install {}: {e}", target.display())));
        }

        tracing::info!(path = %target.display(), "yt-dlp installed");
        Ok(target)
    }
}

async fn install(staging: &Path, target: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(staging, std::fs::Permissions::from_mode(0o755)).await?;
    }
    tokio::fs::rename(staging, target).await
}
