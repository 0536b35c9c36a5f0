//! External-process download task (yt-dlp)
//!
//! Media URLs are handed to an external downloader. The task resolves the
//! executable, looks up a title when no base name was supplied, starts the
//! tool in its own process group and turns its output into
//! [`Event::PercentProgress`] events until it exits or is cancelled.
//!
//! ## Submodules
//!
//! - [`command`] - argument construction and expected output path
//! - `progress` - percentage parsing
//! - `title` - title lookup before a nameless download
//! - `tree` - process-group spawning and termination
//! - [`locate`] - finding or fetching the executable

pub mod command;
pub mod locate;
mod progress;
mod title;
mod tree;

pub use command::MediaCommand;
pub use locate::ToolLocator;
pub use progress::parse_percent;

use crate::handle::{DownloadHandle, EventReceiver, TaskContext, TaskKind};
use crate::types::{DownloadRequest, Event, Failure, TaskId, TaskState};
use crate::utils::{ensure_dir, partial_artifacts, remove_file_quietly, sanitize_title};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_stream::StreamExt;
use tree::ProcessTree;

/// How a supervised run ended
enum RunOutcome {
    Exited(std::process::ExitStatus),
    Cancelled,
    Failed(Failure),
}

/// Runs media downloads through the external tool
#[derive(Clone)]
pub struct MediaDownloader {
    locator: Arc<ToolLocator>,
    title_timeout: Duration,
    kill_grace_period: Duration,
}

impl MediaDownloader {
    /// Create a downloader around a shared tool locator
    pub fn new(locator: Arc<ToolLocator>, title_timeout: Duration, kill_grace_period: Duration) -> Self {
        Self {
            locator,
            title_timeout,
            kill_grace_period,
        }
    }

    /// Start a media download on a new tokio task
    ///
    /// `request.destination` is the output directory. Returns immediately.
    pub fn start(&self, id: TaskId, request: DownloadRequest) -> (DownloadHandle, EventReceiver) {
        let (ctx, handle, events) = TaskContext::new(id, TaskKind::Process);
        let this = self.clone();

        tokio::spawn(async move {
            this.run(ctx, request).await;
        });

        (handle, events)
    }

    async fn run(self, ctx: TaskContext, request: DownloadRequest) {
        tracing::info!(
            task_id = %ctx.id(),
            url = %request.url,
            dir = %request.destination.display(),
            format = ?request.format,
            "starting media download"
        );
        ctx.emit(Event::Started { total_bytes: None });

        let mut expected_output = None;
        let outcome = self.execute(&ctx, &request, &mut expected_output).await;
        self.conclude(ctx, outcome, expected_output).await;
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        request: &DownloadRequest,
        expected_output: &mut Option<PathBuf>,
    ) -> RunOutcome {
        let output_dir = &request.destination;
        if let Err(e) = ensure_dir(output_dir).await {
            return RunOutcome::Failed(Failure::Process {
                message: e.to_string(),
            });
        }

        let program = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => return RunOutcome::Cancelled,
            resolved = self.locator.resolve() => match resolved {
                Ok(path) => path,
                Err(failure) => return RunOutcome::Failed(failure),
            },
        };

        let base_name = match request.explicit_base_name() {
            Some(name) => sanitize_title(name),
            None => {
                let title = tokio::select! {
                    biased;
                    _ = ctx.token().cancelled() => return RunOutcome::Cancelled,
                    title = title::resolve_title(&program, &request.url, self.title_timeout) => title,
                };
                tracing::debug!(task_id = %ctx.id(), title = %title, "resolved media title");
                ctx.emit(Event::TitleExtracted {
                    title: title.clone(),
                });
                title
            }
        };

        let media = MediaCommand::new(&request.url, output_dir, &base_name, request.format);
        *expected_output = Some(media.expected_output.clone());

        if ctx.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        self.supervise(ctx, &program, media).await
    }

    async fn supervise(&self, ctx: &TaskContext, program: &Path, media: MediaCommand) -> RunOutcome {
        let mut command = Command::new(program);
        command.args(&media.args);

        let (mut tree, mut lines) = match ProcessTree::spawn(command) {
            Ok(spawned) => spawned,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return RunOutcome::Failed(Failure::ToolNotFound {
                    tool: locate::TOOL_NAME.into(),
                    detail: format!("{}: {e}", program.display()),
                });
            }
            Err(e) => {
                return RunOutcome::Failed(Failure::Spawn {
                    message: format!("{}: {e}", program.display()),
                });
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = ctx.token().cancelled() => {
                    tree.terminate(self.kill_grace_period).await;
                    return RunOutcome::Cancelled;
                }
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        let percent = parse_percent(&line);
                        ctx.emit(Event::PercentProgress { percent, line });
                    }
                    Some(Err(e)) => {
                        tracing::debug!(task_id = %ctx.id(), error = %e, "error reading tool output");
                    }
                    None => break,
                },
            }
        }

        tokio::select! {
            biased;
            _ = ctx.token().cancelled() => {
                tree.terminate(self.kill_grace_period).await;
                RunOutcome::Cancelled
            }
            status = tree.wait() => match status {
                Ok(status) => RunOutcome::Exited(status),
                Err(e) => RunOutcome::Failed(Failure::Process {
                    message: format!("failed to wait for external downloader: {e}"),
                }),
            },
        }
    }

    async fn conclude(&self, ctx: TaskContext, outcome: RunOutcome, expected_output: Option<PathBuf>) {
        let proposed = match &outcome {
            RunOutcome::Exited(status) if status.success() && expected_output.is_some() => {
                TaskState::Completed
            }
            RunOutcome::Cancelled => TaskState::Cancelled,
            _ => TaskState::Failed,
        };

        match (ctx.settle(proposed), outcome, expected_output) {
            (TaskState::Completed, _, Some(path)) => {
                tracing::info!(task_id = %ctx.id(), path = %path.display(), "media download complete");
                ctx.finish(Event::Completed { path });
            }
            (TaskState::Cancelled, _, expected) => {
                if let Some(expected) = expected {
                    for artifact in partial_artifacts(&expected).await {
                        remove_file_quietly(&artifact).await;
                    }
                }
                tracing::info!(task_id = %ctx.id(), "media download cancelled");
                ctx.finish(Event::Cancelled { partial_path: None });
            }
            (_, outcome, _) => {
                let failure = match outcome {
                    RunOutcome::Exited(status) => Failure::ProcessExited {
                        code: status.code(),
                    },
                    RunOutcome::Failed(failure) => failure,
                    RunOutcome::Cancelled => Failure::Process {
                        message: "cancelled".into(),
                    },
                };
                tracing::warn!(task_id = %ctx.id(), error = %failure, "media download failed");
                ctx.finish(Event::Failed { failure });
            }
        }
    }
}
