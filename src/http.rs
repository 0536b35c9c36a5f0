//! Direct HTTP download task.
//!
//! Streams one URL into one file. The transfer future runs inside a
//! `select!` against the task's cancellation token, so cancelling drops the
//! response body and the open file immediately instead of waiting for the
//! next chunk to arrive.

use crate::config::HttpConfig;
use crate::error::{Error, ErrorCategory, Result};
use crate::handle::{DownloadHandle, EventReceiver, TaskContext, TaskKind};
use crate::types::{Event, Failure, TaskId, TaskState};
use crate::utils::{ensure_parent_dir, remove_file_quietly};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Reason a transfer stopped early
enum Stop {
    Cancelled,
    Failed(Error),
}

impl From<Error> for Stop {
    fn from(e: Error) -> Self {
        Stop::Failed(e)
    }
}

impl From<std::io::Error> for Stop {
    fn from(e: std::io::Error) -> Self {
        Stop::Failed(Error::Io(e))
    }
}

impl From<reqwest::Error> for Stop {
    fn from(e: reqwest::Error) -> Self {
        Stop::Failed(Error::Http(e))
    }
}

/// Runs direct HTTP downloads
///
/// Cloning is cheap; clones share the underlying connection pool.
///
/// # Examples
///
/// ```no_run
/// use fetch_dl::config::HttpConfig;
/// use fetch_dl::http::HttpDownloader;
/// use fetch_dl::types::{Event, TaskId};
///
/// # #[tokio::main]
/// # async fn main() -> fetch_dl::Result<()> {
/// let http = HttpDownloader::new(&HttpConfig::default())?;
/// let (handle, mut events) = http.start(TaskId(1), "https://example.com/file.zip", "/tmp/file.zip");
/// while let Some(event) = events.recv().await {
///     if let Event::Progress { downloaded, total } = &event {
///         println!("{downloaded} / {total:?}");
///     }
///     if event.is_terminal() {
///         break;
///     }
/// }
/// assert!(handle.is_done());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpDownloader {
    client: reqwest::Client,
    read_timeout: Duration,
    chunk_size: usize,
}

impl HttpDownloader {
    /// Build a downloader from HTTP settings
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            read_timeout: config.read_timeout,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Start downloading `url` into `destination` on a new tokio task
    ///
    /// Returns immediately. Progress and the terminal outcome arrive on the
    /// returned receiver.
    pub fn start(
        &self,
        id: TaskId,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> (DownloadHandle, EventReceiver) {
        let (ctx, handle, events) = TaskContext::new(id, TaskKind::Http);
        let this = self.clone();
        let url = url.into();
        let destination = destination.into();

        tokio::spawn(async move {
            this.run(ctx, url, destination).await;
        });

        (handle, events)
    }

    /// Download `url` into `destination` and wait for the result
    ///
    /// Used for internal transfers that have no observer, such as fetching
    /// the external tool.
    pub(crate) async fn fetch(&self, url: &str, destination: &Path) -> std::result::Result<(), Failure> {
        let (handle, mut events) = self.start(TaskId(0), url, destination);
        let mut failure = None;
        while let Some(event) = events.recv().await {
            if let Event::Failed { failure: f } = event {
                failure = Some(f);
            }
        }
        match (handle.wait().await, failure) {
            (TaskState::Completed, _) => Ok(()),
            (_, Some(failure)) => Err(failure),
            (state, None) => Err(Failure::Http {
                category: ErrorCategory::GeneralFailure,
                cause: format!("download ended in state {state:?}"),
            }),
        }
    }

    async fn run(self, ctx: TaskContext, url: String, destination: PathBuf) {
        tracing::info!(task_id = %ctx.id(), url = %url, path = %destination.display(), "starting HTTP download");

        let result = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => Err(Stop::Cancelled),
            r = self.transfer(&ctx, &url, &destination) => r,
        };

        let proposed = match &result {
            Ok(()) => TaskState::Completed,
            Err(Stop::Cancelled) => TaskState::Cancelled,
            Err(Stop::Failed(_)) if ctx.is_cancelled() => TaskState::Cancelled,
            Err(Stop::Failed(_)) => TaskState::Failed,
        };

        match (ctx.settle(proposed), result) {
            (TaskState::Completed, _) => {
                tracing::info!(task_id = %ctx.id(), path = %destination.display(), "HTTP download complete");
                ctx.finish(Event::Completed { path: destination });
            }
            (TaskState::Failed, Err(Stop::Failed(e))) => {
                let category = ErrorCategory::classify(&e);
                tracing::warn!(task_id = %ctx.id(), url = %url, error = %e, %category, "HTTP download failed");
                remove_file_quietly(&destination).await;
                ctx.finish(Event::Failed {
                    failure: Failure::Http {
                        category,
                        cause: e.to_string(),
                    },
                });
            }
            _ => {
                tracing::info!(task_id = %ctx.id(), path = %destination.display(), "HTTP download cancelled");
                remove_file_quietly(&destination).await;
                ctx.finish(Event::Cancelled {
                    partial_path: Some(destination),
                });
            }
        }
    }

    async fn transfer(
        &self,
        ctx: &TaskContext,
        url: &str,
        destination: &Path,
    ) -> std::result::Result<(), Stop> {
        ensure_parent_dir(destination).await?;

        let response = self.read_with_timeout(self.client.get(url).send()).await??;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            }
            .into());
        }

        let total = response.content_length();
        ctx.emit(Event::Started { total_bytes: total });

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(destination)
            .await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = self.read_with_timeout(stream.next()).await? {
            let chunk = chunk?;
            for piece in chunk.chunks(self.chunk_size) {
                if ctx.is_cancelled() {
                    return Err(Stop::Cancelled);
                }
                writer.write_all(piece).await?;
                downloaded += piece.len() as u64;
                ctx.emit(Event::Progress { downloaded, total });
            }
        }

        if ctx.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(())
    }

    async fn read_with_timeout<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        tokio::time::timeout(self.read_timeout, fut).await.map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("read timed out after {:?}", self.read_timeout),
            ))
        })
    }
}
