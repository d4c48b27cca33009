//! Progress reporting for a running job.
//!
//! The reporter is a data source, independent of rendering: it pushes
//! `ProgressUpdate`s into a sink and the session/view decide what to show.
//!
//! Two sources share that interface:
//! - `SyntheticProgress`: a client-side placeholder that fabricates progress
//!   on a timer. It has no connection to the server's real state.
//! - a streamed feed of server-pushed `ProgressUpdate`s, for deployments that
//!   expose one.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Parts the synthetic progression pretends to produce.
const SYNTHETIC_TOTAL_PARTS: u32 = 3;

/// State carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

/// One progress event, as rendered by the processing view.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressUpdate {
    /// 0.0 to 100.0
    pub percent: f64,

    #[serde(default)]
    pub message: String,

    pub status: ProgressStatus,

    #[serde(default)]
    pub current_part: Option<u32>,

    #[serde(default)]
    pub total_parts: Option<u32>,
}

impl ProgressUpdate {
    /// "Part X of Y" when both counters are known.
    pub fn parts_label(&self) -> Option<String> {
        match (self.current_part, self.total_parts) {
            (Some(current), Some(total)) => Some(format!("Part {} of {}", current, total)),
            _ => None,
        }
    }
}

/// Placeholder progression: random steps of 2 to 10 percent with canned
/// status text.
///
/// The numbers mean nothing; they only keep the processing view alive until
/// the upload request returns.
pub struct SyntheticProgress<R> {
    rng: R,
    percent: f64,
    finished: bool,
}

impl<R: Rng> SyntheticProgress<R> {
    pub fn new(rng: R) -> Self {
        SyntheticProgress {
            rng,
            percent: 0.0,
            finished: false,
        }
    }

    /// Update shown before the first tick.
    pub fn initial(&self) -> ProgressUpdate {
        ProgressUpdate {
            percent: 0.0,
            message: "Starting video analysis...".to_string(),
            status: ProgressStatus::Processing,
            current_part: None,
            total_parts: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance one tick. Returns `None` once 100% has been reported.
    pub fn advance(&mut self) -> Option<ProgressUpdate> {
        if self.finished {
            return None;
        }

        self.percent += self.rng.random_range(2.0..=10.0);
        if self.percent >= 100.0 {
            self.percent = 100.0;
            self.finished = true;
            return Some(ProgressUpdate {
                percent: 100.0,
                message: "Video processing complete!".to_string(),
                status: ProgressStatus::Completed,
                current_part: Some(SYNTHETIC_TOTAL_PARTS),
                total_parts: Some(SYNTHETIC_TOTAL_PARTS),
            });
        }

        let part = if self.percent >= 66.0 {
            3
        } else if self.percent >= 33.0 {
            2
        } else {
            1
        };
        let message = if self.percent < 10.0 {
            "Analyzing video duration and format...".to_string()
        } else if self.percent < 20.0 {
            "Preparing to split video...".to_string()
        } else if self.percent < 90.0 {
            format!("Processing part {} of {}...", part, SYNTHETIC_TOTAL_PARTS)
        } else {
            "Finalizing video parts...".to_string()
        };

        Some(ProgressUpdate {
            percent: self.percent,
            message,
            status: ProgressStatus::Processing,
            current_part: Some(part),
            total_parts: Some(SYNTHETIC_TOTAL_PARTS),
        })
    }
}

/// Owns at most one running progress source.
///
/// Starting a new run aborts the previous one, so two ticking loops never
/// overlap. `stop` may be called any number of times.
pub struct ProgressReporter {
    tick: Duration,
    task: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn new(tick: Duration) -> Self {
        ProgressReporter { tick, task: None }
    }

    /// Tick a `SyntheticProgress` into `sink` until it reaches 100%.
    pub fn start_synthetic<R, F>(&mut self, rng: R, mut sink: F)
    where
        R: Rng + Send + 'static,
        F: FnMut(ProgressUpdate) + Send + 'static,
    {
        self.stop();
        let tick = self.tick;
        debug!(tick_ms = tick.as_millis() as u64, "starting synthetic progress");
        self.task = Some(tokio::spawn(async move {
            let mut progress = SyntheticProgress::new(rng);
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            sink(progress.initial());
            loop {
                interval.tick().await;
                match progress.advance() {
                    Some(update) => sink(update),
                    None => break,
                }
                if progress.is_finished() {
                    break;
                }
            }
        }));
    }

    /// Forward a server-pushed feed into `sink`.
    ///
    /// Messages, status and part counters pass through untouched. Percentages
    /// are clamped to 0..=100 and never move backwards within the run. The
    /// feed is dropped after the first `Completed` or `Error` event.
    pub fn start_streamed<S, F>(&mut self, feed: S, mut sink: F)
    where
        S: Stream<Item = ProgressUpdate> + Send + 'static,
        F: FnMut(ProgressUpdate) + Send + 'static,
    {
        self.stop();
        debug!("starting streamed progress");
        self.task = Some(tokio::spawn(async move {
            let mut feed = Box::pin(feed);
            let mut high_water = 0.0f64;
            while let Some(mut update) = feed.next().await {
                if update.percent.is_finite() {
                    update.percent = update.percent.clamp(0.0, 100.0).max(high_water);
                } else {
                    update.percent = high_water;
                }
                high_water = update.percent;
                let terminal = update.status.is_terminal();
                sink(update);
                if terminal {
                    break;
                }
            }
        }));
    }

    /// Cancel the running source, if any.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("progress stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
