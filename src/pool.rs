//! Task pool: accepts requests, routes them and tracks in-flight tasks

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handle::{DownloadHandle, EventReceiver};
use crate::http::HttpDownloader;
use crate::process::{MediaDownloader, ToolLocator};
use crate::types::{DownloadRequest, TaskId};
use crate::utils::is_media_url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Upper bound on how long [`DownloadPool::shutdown`] waits for teardown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Which download strategy handles a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Direct HTTP transfer into the destination file
    Http,
    /// External downloader writing into the destination directory
    Media,
}

impl Route {
    /// Pick the strategy for `url`
    pub fn for_url(url: &str) -> Self {
        if is_media_url(url) {
            Route::Media
        } else {
            Route::Http
        }
    }
}

/// Caller-owned scheduler for download tasks
///
/// Every submission runs on its own tokio task with no concurrency limit and
/// no ordering between tasks. The pool is cheap to clone; clones share the
/// same in-flight set and shutdown flag.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct DownloadPool {
    http: HttpDownloader,
    media: MediaDownloader,
    next_id: Arc<AtomicU64>,
    /// Handles of tasks that have not reached a terminal state
    active: Arc<Mutex<HashMap<TaskId, DownloadHandle>>>,
    /// Cleared by [`shutdown`](Self::shutdown)
    accepting_new: Arc<AtomicBool>,
}

impl DownloadPool {
    /// Build a pool from validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let http = HttpDownloader::new(&config.http)?;
        let locator = Arc::new(ToolLocator::new(config.tools.clone(), http.clone()));
        let media = MediaDownloader::new(
            locator,
            config.tools.title_timeout,
            config.tools.kill_grace_period,
        );

        Ok(Self {
            http,
            media,
            // 0 is reserved for internal transfers such as the tool fetch
            next_id: Arc::new(AtomicU64::new(1)),
            active: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Submit a request, routed by URL
    ///
    /// Media URLs go to the external downloader and `request.destination` is
    /// treated as a directory. Everything else is a direct HTTP download into
    /// the file `request.destination`.
    pub fn submit(&self, request: DownloadRequest) -> Result<(DownloadHandle, EventReceiver)> {
        let route = Route::for_url(&request.url);
        self.submit_to(route, request)
    }

    /// Submit a direct HTTP download regardless of the URL
    pub fn submit_http(&self, request: DownloadRequest) -> Result<(DownloadHandle, EventReceiver)> {
        self.submit_to(Route::Http, request)
    }

    /// Submit a media download regardless of the URL
    pub fn submit_media(&self, request: DownloadRequest) -> Result<(DownloadHandle, EventReceiver)> {
        self.submit_to(Route::Media, request)
    }

    fn submit_to(&self, route: Route, request: DownloadRequest) -> Result<(DownloadHandle, EventReceiver)> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        tracing::info!(task_id = %id, url = %request.url, ?route, "download submitted");

        let (handle, events) = match route {
            Route::Http => self.http.start(id, request.url, request.destination),
            Route::Media => self.media.start(id, request),
        };

        self.track(handle.clone());
        Ok((handle, events))
    }

    fn track(&self, handle: DownloadHandle) {
        let id = handle.id();
        self.active_set().insert(id, handle.clone());

        let active = self.active.clone();
        tokio::spawn(async move {
            let state = handle.wait().await;
            active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
            tracing::debug!(task_id = %id, ?state, "task left the pool");
        });
    }

    fn active_set(&self) -> MutexGuard<'_, HashMap<TaskId, DownloadHandle>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of tasks that have not yet finished
    pub fn in_flight(&self) -> usize {
        self.active_set()
            .values()
            .filter(|handle| !handle.is_done())
            .count()
    }

    /// Handle of an in-flight task
    pub fn handle(&self, id: TaskId) -> Option<DownloadHandle> {
        self.active_set().get(&id).cloned()
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// Stop accepting work and cancel everything in flight
    ///
    /// Waits for cancelled tasks to finish their teardown, giving up after a
    /// bounded time. Calling it again is harmless.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating pool shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        let handles: Vec<DownloadHandle> = self.active_set().values().cloned().collect();
        tracing::info!(count = handles.len(), "cancelling in-flight downloads");

        let teardown = futures::future::join_all(handles.iter().map(|handle| handle.cancel()));
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, teardown).await {
            Ok(_) => tracing::info!("All in-flight downloads stopped"),
            Err(_) => tracing::warn!(
                timeout = ?SHUTDOWN_TIMEOUT,
                "Timeout waiting for downloads to stop, proceeding with shutdown"
            ),
        }
    }
}
