//! # VidSplit Engine - Video Splitting Client Library
//!
//! A headless client for a video-splitting service in Rust.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! The engine uploads a local video to the service, which cuts it into
//! fixed-length segments, and then fetches the segments back. It features:
//! - Client-side validation before anything touches the network
//! - Automatic retry with exponential backoff for transient failures
//! - A view state machine with a pure render projection
//! - Progress reporting (synthetic placeholder or server-streamed)
//! - Transient notifications with a deterministic lifecycle
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{Client, ClientConfig, SelectedFile, ViewKind};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::http(ClientConfig::default())?;
//!
//! // Select a file (metadata is probed in the background)
//! client.select_file(SelectedFile::from_path("clip.mp4").await?)?;
//!
//! // Submit and wait for the outcome
//! client.submit()?;
//! if client.run_until_settled().await == ViewKind::ShowingResults {
//!     client.download_all("segments".as_ref()).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (SelectedFile, SegmentDuration, JobResult)
//! - **error**: Error types and handling
//! - **config**: Client configuration and retry policy
//! - **transport**: HTTP contract with the service
//! - **probe**: Local metadata decoding
//! - **upload**: Validation, submission and retry
//! - **progress**: Progress sources and reporter
//! - **notify**: Notification lifecycle
//! - **session**: View state machine
//! - **view**: Render projection of the session
//! - **client**: Dispatcher tying the above together

pub mod model;
pub mod error;
pub mod config;
pub mod transport;
pub mod probe;
pub mod upload;
pub mod progress;
pub mod notify;
pub mod session;
pub mod view;
pub mod client;

// Re-export main types and functions
pub use model::{JobResult, SegmentDuration, SegmentFile, SelectedFile, VideoMetadata};
pub use error::{ConfigError, DownloadError, SessionError, TransportError, UploadError};
pub use config::{ClientConfig, ProgressConfig, RetryPolicy};
pub use transport::{HttpTransport, Transport};
pub use probe::{FfprobeProbe, MetadataProbe, NoProbe};
pub use upload::{UploadController, UploadEvent, UploadObserver};
pub use progress::{ProgressReporter, ProgressStatus, ProgressUpdate};
pub use notify::{Notification, NotificationCenter, Severity};
pub use session::{Action, Session, Transition, ViewKind, ViewState};
pub use view::{render, View};
pub use client::{Client, ClientEvent};
