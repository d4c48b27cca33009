//! Core data model for the upload lifecycle.
//!
//! This module defines the values that flow between the controller, the
//! session and the view:
//! - SelectedFile / VideoMetadata: the user's chosen media file
//! - SegmentDuration: the target segment length sent to the service
//! - UploadAttempt / AttemptOutcome: one submission attempt
//! - JobResult / SegmentFile: what the service reports back

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SessionError;

/// Largest file the service accepts (2 GiB).
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Broad media category derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Other,
}

impl MediaKind {
    /// Classify by the MIME top-level type.
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type.split('/').next().map(str::to_ascii_lowercase).as_deref() {
            Some("video") => MediaKind::Video,
            Some("audio") => MediaKind::Audio,
            Some("image") => MediaKind::Image,
            _ => MediaKind::Other,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Image => write!(f, "image"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// Map a file extension to a MIME type.
///
/// Covers every container the service splits, plus enough common non-video
/// types that those are classified correctly instead of falling through to
/// `application/octet-stream`.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "flv" => "video/x-flv",
        "wmv" => "video/x-ms-wmv",
        "webm" => "video/webm",
        "mpeg" | "mpg" => "video/mpeg",
        "3gp" => "video/3gpp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Decoded properties of a video file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

/// A media file chosen by the user.
///
/// The name, size and MIME type are fixed once the file has been validated.
/// Metadata arrives later (or never) and is attached with `with_metadata`,
/// which produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    /// Location on disk
    pub path: PathBuf,

    /// File name shown to the user and sent as the multipart file name
    pub name: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// MIME type derived from the extension
    pub mime_type: String,

    /// Duration and dimensions, if they could be decoded
    pub metadata: Option<VideoMetadata>,
}

impl SelectedFile {
    /// Build a selection from already-known attributes.
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video")
            .to_string();
        SelectedFile {
            path,
            name,
            size_bytes,
            mime_type: mime_type.into(),
            metadata: None,
        }
    }

    /// Stat a file on disk and derive its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(mime_for_extension)
            .unwrap_or("application/octet-stream");
        Ok(SelectedFile::new(path, meta.len(), mime_type))
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime_type)
    }

    /// Copy of this selection with decoded metadata attached.
    pub fn with_metadata(&self, metadata: VideoMetadata) -> Self {
        SelectedFile {
            metadata: Some(metadata),
            ..self.clone()
        }
    }

    /// "50 MB • 2m 5s • 1920x1080", or just the size when metadata is missing.
    pub fn summary(&self) -> String {
        match self.metadata {
            Some(meta) => format!(
                "{} • {} • {}x{}",
                format_file_size(self.size_bytes),
                format_clock(meta.duration_secs),
                meta.width,
                meta.height
            ),
            None => format_file_size(self.size_bytes),
        }
    }
}

/// Target length of each output segment, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentDuration(u32);

impl SegmentDuration {
    /// Preset choices offered to the user.
    pub const PRESETS: [u32; 4] = [60, 300, 600, 900];

    /// Five minutes.
    pub const DEFAULT: SegmentDuration = SegmentDuration(300);

    /// Accept one of the preset values.
    pub fn from_preset_secs(secs: u32) -> Option<Self> {
        Self::PRESETS.contains(&secs).then_some(SegmentDuration(secs))
    }

    /// Accept a custom value of 1 to 60 minutes.
    pub fn from_custom_minutes(minutes: i64) -> Result<Self, SessionError> {
        if !(1..=60).contains(&minutes) {
            return Err(SessionError::InvalidDuration { minutes });
        }
        Ok(SegmentDuration(minutes as u32 * 60))
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }
}

impl Default for SegmentDuration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for SegmentDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % 60 == 0 {
            let minutes = self.0 / 60;
            write!(f, "{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
        } else {
            write!(f, "{} seconds", self.0)
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Still in flight
    Pending,
    Success,
    Failure(String),
    RateLimited { retry_after_secs: u64 },
}

impl AttemptOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AttemptOutcome::Pending)
    }
}

/// One submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadAttempt {
    /// 0-based attempt index
    pub index: u32,

    /// When the request was started
    pub started_at: DateTime<Utc>,

    pub outcome: AttemptOutcome,
}

impl UploadAttempt {
    pub fn start(index: u32) -> Self {
        UploadAttempt {
            index,
            started_at: Utc::now(),
            outcome: AttemptOutcome::Pending,
        }
    }
}

/// One output segment reported by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmentFile {
    pub filename: String,

    /// Size in megabytes, rounded by the server to two decimals
    pub size_mb: f64,

    /// Exact size in bytes, when the server includes it
    #[serde(default)]
    pub size: Option<u64>,
}

/// Outcome of a successful split, as reported by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "UploadResponse")]
pub struct JobResult {
    /// Duration of the uploaded video, in seconds
    pub original_duration: f64,

    pub num_segments: u32,

    /// Segment length the server actually used
    pub segment_duration: Option<u32>,

    /// Segments in playback order
    pub files: Vec<SegmentFile>,

    /// Opaque token naming where the segments are stored
    pub output_dir: String,

    pub message: Option<String>,
}

impl JobResult {
    /// Server-relative path that downloads one segment.
    pub fn download_path(&self, filename: &str) -> String {
        format!("/download/{}/{}", self.output_dir, filename)
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    data: UploadData,
    output_dir: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct UploadData {
    original_duration: f64,
    num_segments: u32,
    #[serde(default)]
    segment_duration: Option<u32>,
    files: Vec<SegmentFile>,
}

impl From<UploadResponse> for JobResult {
    fn from(resp: UploadResponse) -> Self {
        JobResult {
            original_duration: resp.data.original_duration,
            num_segments: resp.data.num_segments,
            segment_duration: resp.data.segment_duration,
            files: resp.data.files,
            output_dir: resp.output_dir,
            message: resp.message,
        }
    }
}

/// Format seconds as `M:SS`, or `H:MM:SS` from one hour up.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Format seconds as `Xh Ym Zs`, dropping the hour when it is zero.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        format!("{}m {}s", minutes, secs)
    }
}

/// Format a byte count with 1024-based units, two decimals at most.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut size = bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }
    let rounded = (size * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("VIDEO/webm"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Other);
        assert_eq!(MediaKind::from_mime(""), MediaKind::Other);
    }

    #[test]
    fn test_every_accepted_container_is_video() {
        for ext in ["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm", "mpeg", "mpg", "MP4"] {
            assert_eq!(
                MediaKind::from_mime(mime_for_extension(ext)),
                MediaKind::Video,
                "{} should be a video container",
                ext
            );
        }
        assert_eq!(mime_for_extension("exe"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_selected_file_from_path() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("holiday.mkv");
        std::fs::write(&path, vec![0u8; 2048]).expect("Failed to write file");

        let file = SelectedFile::from_path(&path).await.expect("Failed to stat file");
        assert_eq!(file.name, "holiday.mkv");
        assert_eq!(file.size_bytes, 2048);
        assert_eq!(file.mime_type, "video/x-matroska");
        assert_eq!(file.kind(), MediaKind::Video);
        assert!(file.metadata.is_none());
    }

    #[tokio::test]
    async fn test_selected_file_rejects_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert!(SelectedFile::from_path(temp_dir.path()).await.is_err());
    }

    #[test]
    fn test_with_metadata_leaves_original_untouched() {
        let file = SelectedFile::new("/tmp/a.mp4", 50 * 1024 * 1024, "video/mp4");
        let meta = VideoMetadata {
            duration_secs: 125.0,
            width: 1920,
            height: 1080,
        };
        let enriched = file.with_metadata(meta);
        assert!(file.metadata.is_none());
        assert_eq!(enriched.metadata, Some(meta));
        assert_eq!(enriched.summary(), "50 MB • 2m 5s • 1920x1080");
        assert_eq!(file.summary(), "50 MB");
    }

    #[test]
    fn test_segment_duration_presets_and_custom() {
        assert_eq!(SegmentDuration::default().as_secs(), 300);
        assert_eq!(SegmentDuration::from_preset_secs(600).map(|d| d.as_secs()), Some(600));
        assert!(SegmentDuration::from_preset_secs(301).is_none());

        assert_eq!(SegmentDuration::from_custom_minutes(1).unwrap().as_secs(), 60);
        assert_eq!(SegmentDuration::from_custom_minutes(60).unwrap().as_secs(), 3600);
        assert_eq!(
            SegmentDuration::from_custom_minutes(0),
            Err(SessionError::InvalidDuration { minutes: 0 })
        );
        assert!(SegmentDuration::from_custom_minutes(61).is_err());
        assert!(SegmentDuration::from_custom_minutes(-5).is_err());
    }

    #[test]
    fn test_job_result_from_service_body() {
        let body = r#"{
            "success": true,
            "message": "Video split successfully",
            "data": {
                "original_duration": 125,
                "num_segments": 1,
                "segment_duration": 300,
                "files": [{"filename": "part1.mp4", "size": 52428800, "size_mb": 50}]
            },
            "output_dir": "abc123"
        }"#;
        let result: JobResult = serde_json::from_str(body).expect("Failed to parse body");
        assert_eq!(result.original_duration, 125.0);
        assert_eq!(result.num_segments, 1);
        assert_eq!(result.segment_duration, Some(300));
        assert_eq!(result.output_dir, "abc123");
        assert_eq!(result.files[0].filename, "part1.mp4");
        assert_eq!(result.files[0].size, Some(52428800));
        assert_eq!(result.download_path("part1.mp4"), "/download/abc123/part1.mp4");
    }

    #[test]
    fn test_job_result_minimal_body() {
        let body = r#"{"data":{"original_duration":1.5,"num_segments":0,"files":[]},"output_dir":"x"}"#;
        let result: JobResult = serde_json::from_str(body).expect("Failed to parse body");
        assert!(result.files.is_empty());
        assert!(result.message.is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(125.0), "2:05");
        assert_eq!(format_duration(125.9), "2:05");
        assert_eq!(format_duration(3600.0), "1:00:00");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(125.0), "2m 5s");
        assert_eq!(format_clock(3725.0), "1h 2m 5s");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(50 * 1024 * 1024), "50 MB");
        assert_eq!(format_file_size(MAX_FILE_SIZE), "2 GB");
    }
}
