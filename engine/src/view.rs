//! Pure projection of a `Session` into what a front end draws.

use crate::model::{format_duration, JobResult, SegmentFile};
use crate::session::{MetadataStatus, Session, ViewKind, ViewState};

/// The one region on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Selection,
    Configuring(ConfiguringView),
    Processing(ProcessingView),
    Results(ResultsView),
    Error(ErrorView),
}

impl View {
    pub fn kind(&self) -> ViewKind {
        match self {
            View::Selection => ViewKind::Selecting,
            View::Configuring(_) => ViewKind::Configuring,
            View::Processing(_) => ViewKind::Processing,
            View::Results(_) => ViewKind::ShowingResults,
            View::Error(_) => ViewKind::ShowingError,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguringView {
    pub file_name: String,
    /// Size, plus duration and dimensions once metadata is known
    pub summary: String,
    pub duration_secs: u32,
    pub duration_label: String,
    pub metadata: MetadataStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingView {
    pub file_name: String,
    /// Rounded to a whole percent
    pub percent: u8,
    pub status: String,
    pub parts: Option<String>,
    /// "Attempt 2" once a retry has happened
    pub attempt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub duration: String,
    pub segment_count: String,
    pub segments: Vec<SegmentCard>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCard {
    pub title: String,
    pub detail: String,
    pub filename: String,
    pub download_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorView {
    pub file_name: String,
    pub message: String,
}

const UPLOADING: &str = "Uploading video...";

pub fn render(session: &Session) -> View {
    match session.state() {
        ViewState::Selecting => View::Selection,
        ViewState::Configuring {
            file,
            metadata,
            duration,
        } => View::Configuring(ConfiguringView {
            file_name: file.name.clone(),
            summary: file.summary(),
            duration_secs: duration.as_secs(),
            duration_label: duration.to_string(),
            metadata: *metadata,
        }),
        ViewState::Processing {
            file,
            attempts,
            progress,
            ..
        } => View::Processing(ProcessingView {
            file_name: file.name.clone(),
            percent: progress
                .as_ref()
                .map_or(0, |p| p.percent.clamp(0.0, 100.0).round() as u8),
            status: progress
                .as_ref()
                .map_or_else(|| UPLOADING.to_string(), |p| p.message.clone()),
            parts: progress.as_ref().and_then(|p| p.parts_label()),
            attempt: (attempts.len() > 1).then(|| format!("Attempt {}", attempts.len())),
        }),
        ViewState::ShowingResults { result, .. } => View::Results(results_view(result)),
        ViewState::ShowingError { file, error, .. } => View::Error(ErrorView {
            file_name: file.name.clone(),
            message: error.to_string(),
        }),
    }
}

fn results_view(result: &JobResult) -> ResultsView {
    ResultsView {
        duration: format_duration(result.original_duration),
        segment_count: format!("{} Parts", result.num_segments),
        segments: result
            .files
            .iter()
            .enumerate()
            .map(|(i, file)| segment_card(result, i + 1, file))
            .collect(),
        message: result.message.clone(),
    }
}

fn segment_card(result: &JobResult, number: usize, file: &SegmentFile) -> SegmentCard {
    SegmentCard {
        title: format!("Part {}", number),
        detail: format!("{} • {} MB", file.filename, file.size_mb),
        filename: file.filename.clone(),
        download_path: result.download_path(&file.filename),
    }
}
