//! Core types and events for fetch-dl

use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a submitted download
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output container produced by the external downloader
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Best video and audio merged into an MP4 container
    #[default]
    Video,
    /// Audio track only, transcoded to MP3
    Audio,
}

impl MediaFormat {
    /// File extension the tool writes for this format
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Video => "mp4",
            MediaFormat::Audio => "mp3",
        }
    }
}

/// One download to perform
///
/// For direct HTTP downloads `destination` is the target file. For media
/// downloads handled by the external tool it is the output directory; the file
/// name is `base_name` (or the extracted title) plus the format's extension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Destination file (HTTP) or output directory (media)
    pub destination: PathBuf,
    /// Base name for media output; the title is looked up when absent or blank
    #[serde(default)]
    pub base_name: Option<String>,
    /// Media container, ignored for HTTP downloads
    #[serde(default)]
    pub format: MediaFormat,
}

impl DownloadRequest {
    /// Request a direct download of `url` into the file `destination`
    pub fn file(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            base_name: None,
            format: MediaFormat::default(),
        }
    }

    /// Request a media download of `url` into the directory `output_dir`
    pub fn media(url: impl Into<String>, output_dir: impl Into<PathBuf>, format: MediaFormat) -> Self {
        Self {
            url: url.into(),
            destination: output_dir.into(),
            base_name: None,
            format,
        }
    }

    /// Set the base name used for media output
    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = Some(base_name.into());
        self
    }

    /// Base name if one was given and it is not blank
    pub fn explicit_base_name(&self) -> Option<&str> {
        self.base_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Lifecycle state of a task
///
/// A task starts `Running`, may move to `CancelRequested`, and ends in exactly
/// one of the three terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Transfer in progress
    Running,
    /// `cancel()` was called; teardown is underway
    CancelRequested,
    /// Finished successfully
    Completed,
    /// Stopped by the caller
    Cancelled,
    /// Stopped by an error
    Failed,
}

impl TaskState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TaskState::Running => 0,
            TaskState::CancelRequested => 1,
            TaskState::Completed => 2,
            TaskState::Cancelled => 3,
            TaskState::Failed => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Running,
            1 => TaskState::CancelRequested,
            2 => TaskState::Completed,
            3 => TaskState::Cancelled,
            _ => TaskState::Failed,
        }
    }
}

/// Why a task failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// Direct HTTP download failed
    Http {
        /// Classified category for the presentation layer
        category: ErrorCategory,
        /// Description of the underlying error
        cause: String,
    },
    /// The external downloader is not installed and could not be fetched
    ToolNotFound {
        /// Tool name
        tool: String,
        /// What was tried
        detail: String,
    },
    /// The external downloader exists but could not be started
    Spawn {
        /// OS error text
        message: String,
    },
    /// The external downloader ran and exited unsuccessfully
    ProcessExited {
        /// Exit code, None when killed by a signal
        code: Option<i32>,
    },
    /// Output could not be read or the process could not be awaited
    Process {
        /// Diagnostic text
        message: String,
    },
}

impl Failure {
    /// Category of an HTTP failure, None for process failures
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Failure::Http { category, .. } => Some(*category),
            _ => None,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Http { category, cause } => write!(f, "{category}: {cause}"),
            Failure::ToolNotFound { tool, detail } => {
                write!(f, "{tool} not found on PATH ({detail})")
            }
            Failure::Spawn { message } => write!(f, "failed to run external downloader: {message}"),
            Failure::ProcessExited { code: Some(code) } => {
                write!(f, "process exited with code {code}")
            }
            Failure::ProcessExited { code: None } => f.write_str("process terminated by signal"),
            Failure::Process { message } => f.write_str(message),
        }
    }
}

/// Event emitted by a running task
///
/// Per task the order is always `Started`, then any number of progress or
/// `TitleExtracted` events, then exactly one terminal event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Transfer started
    Started {
        /// Declared content length; None when unknown or for process downloads
        total_bytes: Option<u64>,
    },

    /// Bytes written so far by a direct HTTP download
    Progress {
        /// Bytes written to the destination
        downloaded: u64,
        /// Declared content length, None when unknown
        total: Option<u64>,
    },

    /// One line of output from the external downloader
    PercentProgress {
        /// Parsed percentage in [0, 100], None when the line carries none
        percent: Option<u8>,
        /// The raw output line
        line: String,
    },

    /// Title resolved for a media download that had no base name
    TitleExtracted {
        /// Sanitized title, used as the base name
        title: String,
    },

    /// Download finished; `path` holds the complete file
    Completed {
        /// Final file path
        path: PathBuf,
    },

    /// Download cancelled and partial output removed
    Cancelled {
        /// Partial destination for HTTP downloads, None for process downloads
        partial_path: Option<PathBuf>,
    },

    /// Download failed and partial output removed
    Failed {
        /// What went wrong
        failure: Failure,
    },
}

impl Event {
    /// Whether this is the last event of a task
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Completed { .. } | Event::Cancelled { .. } | Event::Failed { .. }
        )
    }
}
