//! Caller-facing task handle and the lifecycle state shared with the worker.
//!
//! The worker owns a `TaskContext`; the caller holds any number of
//! [`DownloadHandle`] clones. Both sides point at one `TaskControl` whose
//! state is an atomic state machine, so cancellation can be requested from
//! any thread while the worker decides the single terminal outcome.

use crate::error::ErrorCategory;
use crate::types::{Event, Failure, TaskId, TaskState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Receiving end of a task's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// [`EventReceiver`] adapted to a `futures::Stream`
pub type EventStream = UnboundedReceiverStream<Event>;

/// Convert an event receiver into a stream
pub fn into_stream(events: EventReceiver) -> EventStream {
    UnboundedReceiverStream::new(events)
}

struct TaskControl {
    id: TaskId,
    state: AtomicU8,
    token: CancellationToken,
    /// Flips to true once cleanup is finished and the terminal event is sent
    finished: watch::Sender<bool>,
}

impl TaskControl {
    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Running -> CancelRequested. False if cancel was already requested or the task ended.
    fn request_cancel(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Running.to_u8(),
                TaskState::CancelRequested.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Handle to a submitted download
///
/// Cheap to clone; every clone controls the same task.
#[derive(Clone)]
pub struct DownloadHandle {
    control: Arc<TaskControl>,
}

impl std::fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("id", &self.control.id)
            .field("state", &self.control.state())
            .finish()
    }
}

impl DownloadHandle {
    /// Task identifier
    pub fn id(&self) -> TaskId {
        self.control.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.control.state()
    }

    /// Cancel the download and wait for its teardown
    ///
    /// Signals the worker, which closes its connection or kills its process
    /// tree, removes partial output and emits [`Event::Cancelled`]. Returns
    /// once that has happened. Calling this again, or after the task already
    /// finished, has no further effect.
    pub async fn cancel(&self) {
        if self.control.request_cancel() {
            tracing::info!(task_id = %self.control.id, "cancellation requested");
            self.control.token.cancel();
        }
        self.wait().await;
    }

    /// Whether the task reached a terminal state and finished its cleanup
    pub fn is_done(&self) -> bool {
        *self.control.finished.borrow()
    }

    /// Whether the task finished and the download succeeded
    pub fn is_completed_successfully(&self) -> bool {
        self.is_done() && self.state() == TaskState::Completed
    }

    /// Wait until the task is done and return its terminal state
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.control.finished.subscribe();
        // The sender lives in `control`, which we hold, so this cannot fail
        let _ = rx.wait_for(|done| *done).await;
        self.state()
    }
}

/// Worker side of a task
///
/// Dropping a context that never called [`TaskContext::finish`] (for example
/// because the worker panicked) reports the task as failed so the caller still
/// sees exactly one terminal event.
pub(crate) struct TaskContext {
    control: Arc<TaskControl>,
    events: mpsc::UnboundedSender<Event>,
    kind: TaskKind,
    finished: bool,
}

/// Which download strategy a task runs, used to shape fallback failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Http,
    Process,
}

impl TaskContext {
    /// Create a fresh task in the `Running` state
    pub(crate) fn new(id: TaskId, kind: TaskKind) -> (Self, DownloadHandle, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let (finished, _) = watch::channel(false);
        let control = Arc::new(TaskControl {
            id,
            state: AtomicU8::new(TaskState::Running.to_u8()),
            token: CancellationToken::new(),
            finished,
        });

        let ctx = Self {
            control: control.clone(),
            events,
            kind,
            finished: false,
        };
        (ctx, DownloadHandle { control }, rx)
    }

    pub(crate) fn id(&self) -> TaskId {
        self.control.id
    }

    /// Send a non-terminal event; a dropped receiver is ignored
    pub(crate) fn emit(&self, event: Event) {
        debug_assert!(!event.is_terminal());
        let _ = self.events.send(event);
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.control.token
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.control.token.is_cancelled()
    }

    /// Move into a terminal state
    ///
    /// A pending cancellation always wins over the proposed outcome. Returns
    /// the state actually entered; the caller must clean up accordingly and
    /// then call [`finish`](Self::finish).
    pub(crate) fn settle(&self, proposed: TaskState) -> TaskState {
        debug_assert!(proposed.is_terminal());
        match self.control.state.compare_exchange(
            TaskState::Running.to_u8(),
            proposed.to_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => proposed,
            Err(current) if TaskState::from_u8(current) == TaskState::CancelRequested => {
                self.control
                    .state
                    .store(TaskState::Cancelled.to_u8(), Ordering::SeqCst);
                TaskState::Cancelled
            }
            Err(current) => TaskState::from_u8(current),
        }
    }

    /// Emit the terminal event and mark the task done
    pub(crate) fn finish(mut self, event: Event) {
        debug_assert!(event.is_terminal());
        let _ = self.events.send(event);
        self.finished = true;
        self.control.finished.send_replace(true);
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let state = self.settle(TaskState::Failed);
        tracing::warn!(task_id = %self.control.id, ?state, "task ended without a terminal event");
        let message = "download task ended unexpectedly".to_string();
        let event = match (state, self.kind) {
            (TaskState::Cancelled, _) => Event::Cancelled { partial_path: None },
            (_, TaskKind::Http) => Event::Failed {
                failure: Failure::Http {
                    category: ErrorCategory::GeneralFailure,
                    cause: message,
                },
            },
            (_, TaskKind::Process) => Event::Failed {
                failure: Failure::Process { message },
            },
        };
        let _ = self.events.send(event);
        self.control.finished.send_replace(true);
    }
}
