//! The view state machine.
//!
//! `Session` owns the current `ViewState` and changes it only through
//! `dispatch`. Each state carries exactly the data that exists in it, so a
//! selected file exists in every state but `Selecting` and a job result
//! exists only in `ShowingResults`.

use std::fmt;

use tracing::debug;

use crate::error::{SessionError, UploadError};
use crate::model::{
    AttemptOutcome, JobResult, SegmentDuration, SelectedFile, UploadAttempt, VideoMetadata,
};
use crate::progress::ProgressUpdate;
use crate::upload::{validate_file, UploadEvent};

/// Which of the five views is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Selecting,
    Configuring,
    Processing,
    ShowingResults,
    ShowingError,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Selecting => "selecting",
            ViewKind::Configuring => "configuring",
            ViewKind::Processing => "processing",
            ViewKind::ShowingResults => "showing results",
            ViewKind::ShowingError => "showing error",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether decoded metadata for the selection has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStatus {
    Pending,
    Loaded,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Selecting,
    Configuring {
        file: SelectedFile,
        metadata: MetadataStatus,
        duration: SegmentDuration,
    },
    Processing {
        file: SelectedFile,
        duration: SegmentDuration,
        attempts: Vec<UploadAttempt>,
        progress: Option<ProgressUpdate>,
    },
    ShowingResults {
        file: SelectedFile,
        result: JobResult,
        attempts: Vec<UploadAttempt>,
    },
    ShowingError {
        file: SelectedFile,
        error: UploadError,
        attempts: Vec<UploadAttempt>,
    },
}

impl ViewState {
    pub fn kind(&self) -> ViewKind {
        match self {
            ViewState::Selecting => ViewKind::Selecting,
            ViewState::Configuring { .. } => ViewKind::Configuring,
            ViewState::Processing { .. } => ViewKind::Processing,
            ViewState::ShowingResults { .. } => ViewKind::ShowingResults,
            ViewState::ShowingError { .. } => ViewKind::ShowingError,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SelectFile(SelectedFile),
    MetadataLoaded(VideoMetadata),
    MetadataUnavailable,
    ChooseDuration(SegmentDuration),
    Submit,
    Upload(UploadEvent),
    Progress(ProgressUpdate),
    Reset,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SelectFile(_) => "select a file",
            Action::MetadataLoaded(_) | Action::MetadataUnavailable => "attach metadata",
            Action::ChooseDuration(_) => "change the duration",
            Action::Submit => "submit",
            Action::Upload(_) => "apply an upload event",
            Action::Progress(_) => "apply progress",
            Action::Reset => "reset",
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ViewKind,
    pub to: ViewKind,
}

impl Transition {
    pub fn changed_view(&self) -> bool {
        self.from != self.to
    }
}

/// Client-side state for one browser-style session.
#[derive(Debug)]
pub struct Session {
    state: ViewState,
    max_file_size: u64,
}

impl Session {
    pub fn new(max_file_size: u64) -> Self {
        Session {
            state: ViewState::Selecting,
            max_file_size,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn kind(&self) -> ViewKind {
        self.state.kind()
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        match &self.state {
            ViewState::Selecting => None,
            ViewState::Configuring { file, .. }
            | ViewState::Processing { file, .. }
            | ViewState::ShowingResults { file, .. }
            | ViewState::ShowingError { file, .. } => Some(file),
        }
    }

    pub fn job_result(&self) -> Option<&JobResult> {
        match &self.state {
            ViewState::ShowingResults { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn duration(&self) -> SegmentDuration {
        match &self.state {
            ViewState::Configuring { duration, .. } | ViewState::Processing { duration, .. } => {
                *duration
            }
            _ => SegmentDuration::DEFAULT,
        }
    }

    pub fn attempts(&self) -> &[UploadAttempt] {
        match &self.state {
            ViewState::Processing { attempts, .. }
            | ViewState::ShowingResults { attempts, .. }
            | ViewState::ShowingError { attempts, .. } => attempts,
            _ => &[],
        }
    }

    /// Apply one action. On error the state is left exactly as it was.
    pub fn dispatch(&mut self, action: Action) -> Result<Transition, SessionError> {
        let from = self.state.kind();
        let state = std::mem::replace(&mut self.state, ViewState::Selecting);
        match self.step(state, action) {
            Ok(next) => {
                self.state = next;
                let to = self.state.kind();
                if from != to {
                    debug!(%from, %to, "view transition");
                }
                Ok(Transition { from, to })
            }
            Err((previous, err)) => {
                self.state = previous;
                Err(err)
            }
        }
    }

    fn step(
        &self,
        state: ViewState,
        action: Action,
    ) -> Result<ViewState, (ViewState, SessionError)> {
        let invalid = |state: ViewState, action: &Action| {
            let from = state.kind().as_str();
            (
                state,
                SessionError::InvalidTransition {
                    from,
                    action: action.name(),
                },
            )
        };

        match (state, action) {
            (_, Action::Reset) => Ok(ViewState::Selecting),

            // A rejected file still counts as selected; the error view names it.
            (state @ (ViewState::Selecting | ViewState::Configuring { .. }), Action::SelectFile(file)) => {
                if let Err(error) = validate_file(&file, self.max_file_size) {
                    return Ok(ViewState::ShowingError {
                        file,
                        error,
                        attempts: Vec::new(),
                    });
                }
                let duration = match &state {
                    ViewState::Configuring { duration, .. } => *duration,
                    _ => SegmentDuration::DEFAULT,
                };
                Ok(ViewState::Configuring {
                    file,
                    metadata: MetadataStatus::Pending,
                    duration,
                })
            }

            (ViewState::Configuring { file, duration, .. }, Action::MetadataLoaded(meta)) => {
                Ok(ViewState::Configuring {
                    file: file.with_metadata(meta),
                    metadata: MetadataStatus::Loaded,
                    duration,
                })
            }
            (ViewState::Configuring { file, duration, .. }, Action::MetadataUnavailable) => {
                Ok(ViewState::Configuring {
                    file,
                    metadata: MetadataStatus::Unavailable,
                    duration,
                })
            }
            (
                ViewState::Processing {
                    file,
                    duration,
                    attempts,
                    progress,
                },
                Action::MetadataLoaded(meta),
            ) => Ok(ViewState::Processing {
                file: file.with_metadata(meta),
                duration,
                attempts,
                progress,
            }),
            // Metadata that arrives after the view moved on only mattered for display.
            (state, Action::MetadataLoaded(_) | Action::MetadataUnavailable) => Ok(state),

            (ViewState::Configuring { file, metadata, .. }, Action::ChooseDuration(duration)) => {
                Ok(ViewState::Configuring {
                    file,
                    metadata,
                    duration,
                })
            }

            (ViewState::Configuring { file, duration, .. }, Action::Submit) => {
                if let Err(error) = validate_file(&file, self.max_file_size) {
                    return Ok(ViewState::ShowingError {
                        file,
                        error,
                        attempts: Vec::new(),
                    });
                }
                Ok(ViewState::Processing {
                    file,
                    duration,
                    attempts: Vec::new(),
                    progress: None,
                })
            }
            (state @ ViewState::Processing { .. }, Action::Submit) => {
                Err((state, SessionError::UploadInProgress))
            }

            (
                ViewState::Processing {
                    file,
                    duration,
                    mut attempts,
                    progress,
                },
                Action::Upload(event),
            ) => match event {
                UploadEvent::Validating => Ok(ViewState::Processing {
                    file,
                    duration,
                    attempts,
                    progress,
                }),
                UploadEvent::Submitting { attempt } => {
                    let in_flight = attempts.last().is_some_and(|a| !a.outcome.is_resolved());
                    if !in_flight {
                        attempts.push(UploadAttempt::start(attempt));
                    }
                    let state = ViewState::Processing {
                        file,
                        duration,
                        attempts,
                        progress,
                    };
                    if in_flight {
                        return Err((state, SessionError::UploadInProgress));
                    }
                    Ok(state)
                }
                UploadEvent::RetryScheduled { reason, .. } => {
                    resolve_last(&mut attempts, AttemptOutcome::Failure(reason.to_string()));
                    Ok(ViewState::Processing {
                        file,
                        duration,
                        attempts,
                        progress,
                    })
                }
                UploadEvent::Succeeded(result) => {
                    resolve_last(&mut attempts, AttemptOutcome::Success);
                    Ok(ViewState::ShowingResults {
                        file,
                        result,
                        attempts,
                    })
                }
                UploadEvent::Failed(error) => {
                    let outcome = match &error {
                        UploadError::RateLimited {
                            retry_after_secs, ..
                        } => AttemptOutcome::RateLimited {
                            retry_after_secs: *retry_after_secs,
                        },
                        other => AttemptOutcome::Failure(other.to_string()),
                    };
                    resolve_last(&mut attempts, outcome);
                    Ok(ViewState::ShowingError {
                        file,
                        error,
                        attempts,
                    })
                }
            },

            (
                ViewState::Processing {
                    file,
                    duration,
                    attempts,
                    ..
                },
                Action::Progress(update),
            ) => Ok(ViewState::Processing {
                file,
                duration,
                attempts,
                progress: Some(update),
            }),
            // Ticks that land after processing ended are dropped.
            (state, Action::Progress(_)) => Ok(state),

            (state, action) => Err(invalid(state, &action)),
        }
    }
}

/// Mark the in-flight attempt, if any, with its outcome.
fn resolve_last(attempts: &mut [UploadAttempt], outcome: AttemptOutcome) {
    if let Some(last) = attempts.last_mut().filter(|a| !a.outcome.is_resolved()) {
        last.outcome = outcome;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MAX_FILE_SIZE;
    use crate::progress::ProgressStatus;
    use crate::upload::tests::{sample_result, video_file};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::Duration;

    fn configuring() -> Session {
        let mut session = Session::new(MAX_FILE_SIZE);
        session
            .dispatch(Action::SelectFile(video_file()))
            .expect("Failed to select file");
        session
    }

    fn processing() -> Session {
        let mut session = configuring();
        session.dispatch(Action::Submit).expect("Failed to submit");
        session
    }

    fn assert_invariants(session: &Session) {
        let kind = session.kind();
        assert_eq!(session.selected_file().is_some(), kind != ViewKind::Selecting);
        assert_eq!(session.job_result().is_some(), kind == ViewKind::ShowingResults);
    }

    #[test]
    fn test_happy_path() {
        let mut session = Session::new(MAX_FILE_SIZE);
        assert_eq!(session.kind(), ViewKind::Selecting);

        let t = session.dispatch(Action::SelectFile(video_file())).unwrap();
        assert_eq!(t, Transition { from: ViewKind::Selecting, to: ViewKind::Configuring });

        session
            .dispatch(Action::ChooseDuration(SegmentDuration::from_preset_secs(600).unwrap()))
            .unwrap();
        assert_eq!(session.duration().as_secs(), 600);

        session.dispatch(Action::Submit).unwrap();
        assert_eq!(session.kind(), ViewKind::Processing);
        assert_eq!(session.duration().as_secs(), 600);

        session.dispatch(Action::Upload(UploadEvent::Validating)).unwrap();
        session
            .dispatch(Action::Upload(UploadEvent::Submitting { attempt: 0 }))
            .unwrap();
        assert_eq!(session.attempts().len(), 1);
        assert_eq!(session.attempts()[0].outcome, AttemptOutcome::Pending);

        let t = session
            .dispatch(Action::Upload(UploadEvent::Succeeded(sample_result())))
            .unwrap();
        assert!(t.changed_view());
        assert_eq!(session.kind(), ViewKind::ShowingResults);
        assert_eq!(session.job_result().map(|r| r.output_dir.as_str()), Some("abc123"));
        assert_eq!(session.attempts()[0].outcome, AttemptOutcome::Success);
    }

    #[test]
    fn test_invalid_selection_shows_error() {
        let mut session = Session::new(MAX_FILE_SIZE);
        let text = SelectedFile::new("/tmp/notes.txt", 10, "text/plain");
        let t = session.dispatch(Action::SelectFile(text)).unwrap();
        assert_eq!(t, Transition { from: ViewKind::Selecting, to: ViewKind::ShowingError });
        match session.state() {
            ViewState::ShowingError { file, error, attempts } => {
                assert_eq!(file.name, "notes.txt");
                assert!(matches!(error, UploadError::InvalidType { .. }));
                assert!(attempts.is_empty());
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_invariants(&session);

        session.dispatch(Action::Reset).unwrap();
        assert_eq!(session.kind(), ViewKind::Selecting);

        // Replacing a good selection with an oversized one also ends in the error view.
        let mut session = configuring();
        let huge = SelectedFile::new("/tmp/huge.mp4", MAX_FILE_SIZE + 1, "video/mp4");
        session.dispatch(Action::SelectFile(huge)).unwrap();
        assert_eq!(session.kind(), ViewKind::ShowingError);
        assert_eq!(session.selected_file().unwrap().name, "huge.mp4");
        assert!(session.job_result().is_none());
    }

    #[test]
    fn test_submit_revalidates_against_limit() {
        let mut session = Session::new(1024);
        session
            .dispatch(Action::SelectFile(SelectedFile::new("/videos/a.mp4", 1024, "video/mp4")))
            .unwrap();
        session.max_file_size = 512;
        session.dispatch(Action::Submit).unwrap();
        match session.state() {
            ViewState::ShowingError { error, .. } => {
                assert!(matches!(error, UploadError::TooLarge { limit_bytes: 512, .. }))
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_reselect_keeps_duration() {
        let mut session = configuring();
        session
            .dispatch(Action::ChooseDuration(SegmentDuration::from_custom_minutes(7).unwrap()))
            .unwrap();
        let other = SelectedFile::new("/videos/other.webm", 1024, "video/webm");
        session.dispatch(Action::SelectFile(other)).unwrap();
        assert_eq!(session.selected_file().unwrap().name, "other.webm");
        assert_eq!(session.duration().as_secs(), 420);
    }

    #[test]
    fn test_metadata_failure_does_not_block() {
        let mut session = configuring();
        session.dispatch(Action::MetadataUnavailable).unwrap();
        match session.state() {
            ViewState::Configuring { metadata, .. } => {
                assert_eq!(*metadata, MetadataStatus::Unavailable)
            }
            other => panic!("unexpected state {:?}", other),
        }
        session.dispatch(Action::Submit).unwrap();
        assert_eq!(session.kind(), ViewKind::Processing);
    }

    #[test]
    fn test_metadata_attaches_to_file() {
        let mut session = configuring();
        let meta = VideoMetadata {
            duration_secs: 125.0,
            width: 1280,
            height: 720,
        };
        session.dispatch(Action::MetadataLoaded(meta)).unwrap();
        assert_eq!(session.selected_file().unwrap().metadata, Some(meta));
    }

    #[test]
    fn test_second_submit_is_rejected() {
        let mut session = processing();
        assert_eq!(session.dispatch(Action::Submit), Err(SessionError::UploadInProgress));
        assert_eq!(session.kind(), ViewKind::Processing);
    }

    #[test]
    fn test_overlapping_attempt_is_rejected() {
        let mut session = processing();
        session
            .dispatch(Action::Upload(UploadEvent::Submitting { attempt: 0 }))
            .unwrap();
        assert_eq!(
            session.dispatch(Action::Upload(UploadEvent::Submitting { attempt: 1 })),
            Err(SessionError::UploadInProgress)
        );
        assert_eq!(session.attempts().len(), 1);
    }

    #[test]
    fn test_retry_then_rate_limit_records_attempts() {
        let mut session = processing();
        session
            .dispatch(Action::Upload(UploadEvent::Submitting { attempt: 0 }))
            .unwrap();
        session
            .dispatch(Action::Upload(UploadEvent::RetryScheduled {
                retry: 1,
                max_retries: 3,
                delay: Duration::from_secs(1),
                reason: UploadError::NetworkFailure {
                    message: "Failed to fetch".into(),
                },
            }))
            .unwrap();
        session
            .dispatch(Action::Upload(UploadEvent::Submitting { attempt: 1 }))
            .unwrap();
        session
            .dispatch(Action::Upload(UploadEvent::Failed(UploadError::RateLimited {
                retry_after_secs: 30,
                message: "Rate limit exceeded".into(),
            })))
            .unwrap();

        assert_eq!(session.kind(), ViewKind::ShowingError);
        let outcomes: Vec<AttemptOutcome> =
            session.attempts().iter().map(|a| a.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Failure("Failed to fetch".into()),
                AttemptOutcome::RateLimited { retry_after_secs: 30 },
            ]
        );
    }

    #[test]
    fn test_reset_clears_everything() {
        for terminal in [
            UploadEvent::Succeeded(sample_result()),
            UploadEvent::Failed(UploadError::NetworkFailure { message: "x".into() }),
        ] {
            let mut session = processing();
            session.dispatch(Action::Upload(terminal)).unwrap();
            session.dispatch(Action::Reset).unwrap();
            assert_eq!(session.kind(), ViewKind::Selecting);
            assert!(session.selected_file().is_none());
            assert!(session.job_result().is_none());
            assert!(session.attempts().is_empty());
            assert_eq!(session.duration(), SegmentDuration::DEFAULT);
        }
    }

    #[test]
    fn test_illegal_actions_leave_state_untouched() {
        let mut session = Session::new(MAX_FILE_SIZE);
        assert!(matches!(
            session.dispatch(Action::Submit),
            Err(SessionError::InvalidTransition { .. })
        ));
        assert!(session
            .dispatch(Action::Upload(UploadEvent::Succeeded(sample_result())))
            .is_err());

        let mut session = processing();
        let before = session.state().clone();
        assert!(session
            .dispatch(Action::ChooseDuration(SegmentDuration::DEFAULT))
            .is_err());
        assert!(session.dispatch(Action::SelectFile(video_file())).is_err());
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn test_late_progress_is_ignored() {
        let mut session = processing();
        let update = ProgressUpdate {
            percent: 40.0,
            message: "Processing part 2 of 3...".into(),
            status: ProgressStatus::Processing,
            current_part: Some(2),
            total_parts: Some(3),
        };
        session.dispatch(Action::Progress(update.clone())).unwrap();
        session
            .dispatch(Action::Upload(UploadEvent::Succeeded(sample_result())))
            .unwrap();
        let t = session.dispatch(Action::Progress(update)).unwrap();
        assert!(!t.changed_view());
        assert_eq!(session.kind(), ViewKind::ShowingResults);
    }

    #[test]
    fn test_random_action_sequences_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5e55);
        let text = SelectedFile::new("/tmp/a.txt", 1, "text/plain");
        for _ in 0..200 {
            let mut session = Session::new(MAX_FILE_SIZE);
            for _ in 0..30 {
                let action = match rng.random_range(0..9) {
                    0 => Action::SelectFile(video_file()),
                    1 => Action::SelectFile(text.clone()),
                    2 => Action::ChooseDuration(SegmentDuration::DEFAULT),
                    3 => Action::Submit,
                    4 => Action::Upload(UploadEvent::Submitting { attempt: 0 }),
                    5 => Action::Upload(UploadEvent::Succeeded(sample_result())),
                    6 => Action::Upload(UploadEvent::Failed(UploadError::NetworkFailure {
                        message: "x".into(),
                    })),
                    7 => Action::MetadataUnavailable,
                    _ => Action::Reset,
                };
                let before = session.state().clone();
                if session.dispatch(action).is_err() {
                    assert_eq!(session.state(), &before);
                }
                assert_invariants(&session);
            }
        }
    }
}
