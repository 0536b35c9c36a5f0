//! # fetch-dl
//!
//! Download orchestration engine for embedding in applications.
//!
//! ## Design Philosophy
//!
//! fetch-dl is designed to be:
//! - **Strategy-agnostic** - direct HTTP transfers and external-tool media
//!   downloads share one handle and one event vocabulary
//! - **Cancellable** - every task can be stopped at any point, and a cancelled
//!   media download takes the whole helper process tree down with it
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - each submission comes with its own ordered event channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetch_dl::{Config, DownloadPool, DownloadRequest, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = DownloadPool::new(Config::default())?;
//!
//!     let (handle, mut events) =
//!         pool.submit(DownloadRequest::file("https://example.com/big.iso", "/tmp/big.iso"))?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Progress { downloaded, total } => println!("{downloaded}/{total:?}"),
//!             Event::Failed { failure } => eprintln!("failed: {failure}"),
//!             other => println!("{other:?}"),
//!         }
//!     }
//!
//!     println!("finished as {:?}", handle.wait().await);
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types and failure classification
pub mod error;
/// Caller-facing task handle and event channel
pub mod handle;
/// Direct HTTP downloads
pub mod http;
/// Task pool and routing
pub mod pool;
/// External-process media downloads
pub mod process;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

pub use config::{Config, HttpConfig, ToolsConfig};
pub use error::{Error, ErrorCategory, Result};
pub use handle::{DownloadHandle, EventReceiver, EventStream, into_stream};
pub use http::HttpDownloader;
pub use pool::{DownloadPool, Route};
pub use process::{MediaDownloader, ToolLocator};
pub use types::{DownloadRequest, Event, Failure, MediaFormat, TaskId, TaskState};
