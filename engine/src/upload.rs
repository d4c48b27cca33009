//! Upload controller: validation, submission and retry.
//!
//! `submit` runs the checks that need no network first, then posts the file
//! through the configured `Transport`. Transport and server failures are
//! retried with exponential backoff; a rate-limit response ends the
//! submission immediately. Every step is reported to an `UploadObserver`.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{ClientConfig, RetryPolicy};
use crate::error::UploadError;
use crate::model::{JobResult, MediaKind, SegmentDuration, SelectedFile};
use crate::transport::Transport;

/// Step notifications emitted while a submission runs.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Local checks are running
    Validating,

    /// Attempt `attempt` (0-based) is being sent
    Submitting { attempt: u32 },

    /// The last attempt failed; retry number `retry` fires after `delay`
    RetryScheduled {
        retry: u32,
        max_retries: u32,
        delay: Duration,
        reason: UploadError,
    },

    Succeeded(JobResult),

    /// Terminal failure; no further attempts will be made
    Failed(UploadError),
}

/// Receives `UploadEvent`s from a running submission.
///
/// Called inline from the submitting task, so implementations should hand
/// the event off rather than do slow work.
pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: UploadEvent);
}

impl<F> UploadObserver for F
where
    F: Fn(UploadEvent) + Send + Sync,
{
    fn on_event(&self, event: UploadEvent) {
        self(event)
    }
}

/// Check a selection against the service's limits.
pub fn validate_file(file: &SelectedFile, max_file_size: u64) -> Result<(), UploadError> {
    if file.kind() != MediaKind::Video {
        return Err(UploadError::InvalidType {
            mime_type: file.mime_type.clone(),
        });
    }
    if file.size_bytes > max_file_size {
        return Err(UploadError::TooLarge {
            size_bytes: file.size_bytes,
            limit_bytes: max_file_size,
        });
    }
    Ok(())
}

/// Drives one submission at a time against a `Transport`.
pub struct UploadController<T> {
    transport: T,
    retry: RetryPolicy,
    max_file_size: u64,
}

impl<T: Transport> UploadController<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        UploadController {
            transport,
            retry: config.retry,
            max_file_size: config.max_file_size,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn validate(&self, file: &SelectedFile) -> Result<(), UploadError> {
        validate_file(file, self.max_file_size)
    }

    /// Validate and upload `file`, retrying transient failures.
    ///
    /// Validation failures return before the transport is touched. Retries
    /// are announced through `observer` before their delay starts. After the
    /// retry budget is spent the last error is returned as `UploadFailed`.
    pub async fn submit<O>(
        &self,
        file: &SelectedFile,
        duration: SegmentDuration,
        observer: &O,
    ) -> Result<JobResult, UploadError>
    where
        O: UploadObserver + ?Sized,
    {
        observer.on_event(UploadEvent::Validating);
        if let Err(err) = self.validate(file) {
            warn!(file = %file.name, error = %err, "rejected before upload");
            observer.on_event(UploadEvent::Failed(err.clone()));
            return Err(err);
        }

        let mut attempt = 0u32;
        loop {
            observer.on_event(UploadEvent::Submitting { attempt });
            info!(
                file = %file.name,
                duration = duration.as_secs(),
                attempt = attempt + 1,
                of = self.retry.max_attempts(),
                "submitting upload"
            );

            let err = match self.transport.upload(file, duration).await {
                Ok(result) => {
                    info!(
                        output_dir = %result.output_dir,
                        segments = result.num_segments,
                        "upload succeeded"
                    );
                    observer.on_event(UploadEvent::Succeeded(result.clone()));
                    return Ok(result);
                }
                Err(err) => UploadError::from(err),
            };

            if err.is_retryable() && attempt < self.retry.max_retries {
                let retry = attempt + 1;
                let delay = self.retry.delay_before(retry);
                warn!(error = %err, retry, delay_ms = delay.as_millis() as u64, "upload failed, retrying");
                observer.on_event(UploadEvent::RetryScheduled {
                    retry,
                    max_retries: self.retry.max_retries,
                    delay,
                    reason: err,
                });
                tokio::time::sleep(delay).await;
                attempt = retry;
                continue;
            }

            let err = if err.is_retryable() {
                UploadError::UploadFailed {
                    attempts: attempt + 1,
                    last: Box::new(err),
                }
            } else {
                err
            };
            error!(error = %err, attempts = attempt + 1, "upload failed");
            observer.on_event(UploadEvent::Failed(err.clone()));
            return Err(err);
        }
    }
}
