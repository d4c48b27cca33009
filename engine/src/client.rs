//! The client dispatcher.
//!
//! `Client` is the single owner of the session. Front ends call its
//! operations for user actions and pump `next_event` for everything that
//! happens in the background: upload steps, progress ticks, metadata and
//! notification deadlines. Background work runs in spawned tasks that only
//! ever send tagged events back over a channel; state changes happen here,
//! on the caller's task, one event at a time.
//!
//! Every selection and every reset starts a new epoch. Events tagged with an
//! older epoch are dropped, so nothing from an abandoned flow can touch the
//! current one even if it was already queued when the flow was cancelled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::Stream;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ConfigError, DownloadError, ProbeError, SessionError};
use crate::model::{SegmentDuration, SelectedFile, VideoMetadata};
use crate::notify::{Notification, NotificationCenter, Severity};
use crate::probe::{FfprobeProbe, MetadataProbe};
use crate::progress::{ProgressReporter, ProgressStatus, ProgressUpdate};
use crate::session::{Action, MetadataStatus, Session, Transition, ViewKind, ViewState};
use crate::transport::{HttpTransport, Transport};
use crate::upload::{UploadController, UploadEvent};
use crate::view::{self, View};

/// Result of pumping one event through the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// A background event was applied to the session
    Applied(Transition),
    /// One or more notifications changed phase
    Notifications,
    /// The event belonged to a cancelled flow or was not accepted
    Discarded,
}

#[derive(Debug)]
enum Background {
    Metadata(Result<VideoMetadata, ProbeError>),
    Upload(UploadEvent),
    Progress(ProgressUpdate),
}

#[derive(Debug)]
struct Envelope {
    epoch: u64,
    event: Background,
}

/// Where progress for a submission comes from.
enum ProgressSource<S> {
    Synthetic,
    Streamed(S),
    Off,
}

pub struct Client<T: Transport, P: MetadataProbe> {
    config: ClientConfig,
    session: Session,
    uploader: Arc<UploadController<T>>,
    probe: Arc<P>,
    reporter: ProgressReporter,
    notifications: NotificationCenter,
    tx: UnboundedSender<Envelope>,
    rx: UnboundedReceiver<Envelope>,
    upload_task: Option<JoinHandle<()>>,
    probe_task: Option<JoinHandle<()>>,
    epoch: u64,
}

impl Client<HttpTransport, FfprobeProbe> {
    /// Client talking HTTP to `config.server_url`, probing with `ffprobe`.
    pub fn http(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Client::new(transport, FfprobeProbe::new(), config))
    }
}

impl<T: Transport, P: MetadataProbe> Client<T, P> {
    pub fn new(transport: T, probe: P, config: ClientConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Client {
            session: Session::new(config.max_file_size),
            uploader: Arc::new(UploadController::new(transport, &config)),
            probe: Arc::new(probe),
            reporter: ProgressReporter::new(config.progress.tick_interval()),
            notifications: NotificationCenter::new(),
            tx,
            rx,
            upload_task: None,
            probe_task: None,
            epoch: 0,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn kind(&self) -> ViewKind {
        self.session.kind()
    }

    /// Project the current state for drawing.
    pub fn view(&self) -> View {
        view::render(&self.session)
    }

    pub fn notifications(&self) -> &[Notification] {
        self.notifications.active()
    }

    pub fn transport(&self) -> &T {
        self.uploader.transport()
    }

    /// Post a notification now with the severity's default duration.
    pub fn notify(&mut self, message: impl Into<String>, severity: Severity) -> Uuid {
        self.notifications.post(message, severity, None, Instant::now())
    }

    pub fn dismiss(&mut self, id: Uuid) -> bool {
        self.notifications.dismiss(id, Instant::now())
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear_all(Instant::now());
    }

    /// Select a file and start decoding its metadata in the background.
    ///
    /// A file that fails validation moves the session to the error view,
    /// posts an error notification and returns `SessionError::Rejected`.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<Transition, SessionError> {
        let path = file.path.clone();
        let outcome = self.dispatch_user(Action::SelectFile(file));
        if matches!(outcome, Ok(_) | Err(SessionError::Rejected(_))) {
            // The previous selection's metadata is no longer wanted either way.
            self.start_epoch();
            if let Some(previous) = self.probe_task.take() {
                previous.abort();
            }
        }
        let transition = outcome?;

        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let task = tokio::spawn(async move {
            let result = probe.probe(&path).await;
            let _ = tx.send(Envelope {
                epoch,
                event: Background::Metadata(result),
            });
        });
        self.probe_task = Some(task);
        Ok(transition)
    }

    pub fn choose_duration(&mut self, duration: SegmentDuration) -> Result<Transition, SessionError> {
        self.dispatch_user(Action::ChooseDuration(duration))
    }

    /// Choose a custom duration given in minutes (1 to 60).
    pub fn choose_custom_minutes(&mut self, minutes: i64) -> Result<Transition, SessionError> {
        match SegmentDuration::from_custom_minutes(minutes) {
            Ok(duration) => self.choose_duration(duration),
            Err(err) => {
                self.notify(err.to_string(), Severity::Error);
                Err(err)
            }
        }
    }

    /// Submit the selection, with synthetic progress unless configured off.
    pub fn submit(&mut self) -> Result<Transition, SessionError> {
        let source = if self.config.progress.synthetic {
            ProgressSource::Synthetic
        } else {
            ProgressSource::Off
        };
        self.begin::<futures_util::stream::Empty<ProgressUpdate>>(source)
    }

    /// Submit the selection and render progress pushed by the server.
    pub fn submit_streamed<S>(&mut self, feed: S) -> Result<Transition, SessionError>
    where
        S: Stream<Item = ProgressUpdate> + Send + 'static,
    {
        self.begin(ProgressSource::Streamed(feed))
    }

    /// Return to file selection, cancelling anything in flight.
    pub fn reset(&mut self) -> Result<Transition, SessionError> {
        if let Some(task) = self.upload_task.take() {
            task.abort();
        }
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
        self.reporter.stop();
        self.start_epoch();
        self.session.dispatch(Action::Reset)
    }

    /// Wait for the next background event or notification deadline and apply it.
    pub async fn next_event(&mut self) -> ClientEvent {
        let deadline = self.notifications.next_deadline();
        let notification_due = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            Some(envelope) = self.rx.recv() => self.apply(envelope),
            _ = notification_due => {
                self.notifications.advance(Instant::now());
                ClientEvent::Notifications
            }
        }
    }

    /// Apply everything already queued without waiting.
    pub fn drain_pending(&mut self) -> Vec<ClientEvent> {
        let mut applied = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            applied.push(self.apply(envelope));
        }
        if self.notifications.advance(Instant::now()) {
            applied.push(ClientEvent::Notifications);
        }
        applied
    }

    /// Pump events until no upload or metadata probe is outstanding.
    pub async fn run_until_settled(&mut self) -> ViewKind {
        while self.is_busy() {
            self.next_event().await;
        }
        self.session.kind()
    }

    /// True while an upload is running or metadata is still expected.
    pub fn is_busy(&self) -> bool {
        match self.session.state() {
            ViewState::Processing { .. } => true,
            ViewState::Configuring { metadata, .. } => *metadata == MetadataStatus::Pending,
            _ => false,
        }
    }

    /// Download one produced segment into `dest_dir`.
    pub async fn download(&self, filename: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let result = self.session.job_result().ok_or(DownloadError::NoResults)?;
        let bytes = self
            .transport()
            .download(&result.output_dir, filename, dest_dir)
            .await
            .map_err(|source| DownloadError::Segment {
                filename: filename.to_string(),
                source,
            })?;
        debug!(filename, bytes, "segment downloaded");
        Ok(dest_dir.join(filename))
    }

    /// Download every segment in order, pausing between consecutive requests.
    ///
    /// A failed segment posts an error notification and does not stop the
    /// others; the report holds one result per segment, in order.
    pub async fn download_all(
        &mut self,
        dest_dir: &Path,
    ) -> Result<Vec<Result<PathBuf, DownloadError>>, DownloadError> {
        let filenames: Vec<String> = self
            .session
            .job_result()
            .ok_or(DownloadError::NoResults)?
            .files
            .iter()
            .map(|f| f.filename.clone())
            .collect();

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| DownloadError::CreateDir {
                path: dest_dir.to_path_buf(),
                source,
            })?;

        let stagger = self.config.download_stagger();
        let mut report = Vec::with_capacity(filenames.len());
        for (i, filename) in filenames.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(stagger).await;
            }
            let outcome = self.download(filename, dest_dir).await;
            if let Err(err) = &outcome {
                warn!(error = %err, "segment download failed");
                self.notify(err.to_string(), Severity::Error);
            }
            report.push(outcome);
        }
        let saved = report.iter().filter(|r| r.is_ok()).count();
        info!(saved, total = report.len(), dest = %dest_dir.display(), "downloads complete");
        Ok(report)
    }

    fn begin<S>(&mut self, source: ProgressSource<S>) -> Result<Transition, SessionError>
    where
        S: Stream<Item = ProgressUpdate> + Send + 'static,
    {
        let transition = self.dispatch_user(Action::Submit)?;
        let (file, duration) = match self.session.state() {
            ViewState::Processing { file, duration, .. } => (file.clone(), *duration),
            _ => return Ok(transition),
        };

        let uploader = Arc::clone(&self.uploader);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        self.upload_task = Some(tokio::spawn(async move {
            let observer = move |event: UploadEvent| {
                let _ = tx.send(Envelope {
                    epoch,
                    event: Background::Upload(event),
                });
            };
            // The outcome reaches the session through the observer.
            let _ = uploader.submit(&file, duration, &observer).await;
        }));

        let tx = self.tx.clone();
        let sink = move |update: ProgressUpdate| {
            let _ = tx.send(Envelope {
                epoch,
                event: Background::Progress(update),
            });
        };
        match source {
            ProgressSource::Synthetic => self.reporter.start_synthetic(StdRng::from_os_rng(), sink),
            ProgressSource::Streamed(feed) => self.reporter.start_streamed(feed, sink),
            ProgressSource::Off => self.reporter.stop(),
        }
        Ok(transition)
    }

    /// Dispatch a user action. One that lands in the error view is reported
    /// as `Rejected` after posting its message.
    fn dispatch_user(&mut self, action: Action) -> Result<Transition, SessionError> {
        let transition = self.session.dispatch(action)?;
        let rejected = match self.session.state() {
            ViewState::ShowingError { error, .. } if transition.changed_view() => Some(error.clone()),
            _ => None,
        };
        if let Some(error) = rejected {
            warn!(%error, "selection rejected");
            self.notify(error.to_string(), Severity::Error);
            return Err(SessionError::Rejected(error));
        }
        Ok(transition)
    }

    fn start_epoch(&mut self) {
        self.epoch += 1;
        debug!(epoch = self.epoch, "new epoch");
    }

    fn apply(&mut self, envelope: Envelope) -> ClientEvent {
        if envelope.epoch != self.epoch {
            debug!(stale = envelope.epoch, current = self.epoch, "dropping event from cancelled flow");
            return ClientEvent::Discarded;
        }

        let action = match envelope.event {
            Background::Metadata(Ok(meta)) => {
                if let Some(file) = self.session.selected_file() {
                    let message = format!("Video loaded: {}", file.name);
                    self.notify(message, Severity::Success);
                }
                Action::MetadataLoaded(meta)
            }
            Background::Metadata(Err(err)) => {
                warn!(error = %err, "metadata unavailable");
                self.notify("Could not load video metadata", Severity::Warning);
                Action::MetadataUnavailable
            }
            Background::Upload(event) => {
                self.announce(&event);
                Action::Upload(event)
            }
            Background::Progress(update) => {
                if update.status == ProgressStatus::Error && self.kind() == ViewKind::Processing {
                    self.reporter.stop();
                    self.notify(update.message.clone(), Severity::Error);
                }
                Action::Progress(update)
            }
        };

        match self.session.dispatch(action) {
            Ok(transition) => ClientEvent::Applied(transition),
            Err(err) => {
                warn!(error = %err, "background event rejected");
                ClientEvent::Discarded
            }
        }
    }

    /// Side effects of upload steps: notifications and stopping progress.
    fn announce(&mut self, event: &UploadEvent) {
        match event {
            UploadEvent::RetryScheduled {
                retry,
                max_retries,
                delay,
                ..
            } => {
                let message = format!(
                    "Upload failed. Retrying in {}s... (Attempt {}/{})",
                    delay.as_secs_f64(),
                    retry,
                    max_retries
                );
                self.notify(message, Severity::Warning);
            }
            UploadEvent::Succeeded(_) => {
                self.reporter.stop();
                self.upload_task = None;
                self.notify("Video processed successfully!", Severity::Success);
            }
            UploadEvent::Failed(err) => {
                self.reporter.stop();
                self.upload_task = None;
                self.notify(err.to_string(), Severity::Error);
            }
            UploadEvent::Validating | UploadEvent::Submitting { .. } => {}
        }
    }
}

impl<T: Transport, P: MetadataProbe> Drop for Client<T, P> {
    fn drop(&mut self) {
        if let Some(task) = self.upload_task.take() {
            task.abort();
        }
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
    }
}
