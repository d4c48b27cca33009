//! Local metadata decoding for a selected file.
//!
//! Metadata only feeds the summary line shown after selection. A probe that
//! fails, or no probe at all, never blocks the upload.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use crate::error::ProbeError;
use crate::model::VideoMetadata;

/// Source of duration and dimensions for a local file.
pub trait MetadataProbe: Send + Sync + 'static {
    fn probe(&self, path: &Path) -> impl Future<Output = Result<VideoMetadata, ProbeError>> + Send;
}

/// Runs `ffprobe` and reads its JSON report.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl FfprobeProbe {
    /// Use the `ffprobe` found on `PATH`.
    pub fn new() -> Self {
        FfprobeProbe {
            binary: PathBuf::from("ffprobe"),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        FfprobeProbe {
            binary: binary.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError> {
        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProbeError::Failed(if stderr.is_empty() {
                format!("exit status {}", output.status)
            } else {
                stderr
            }));
        }

        parse_ffprobe_json(&output.stdout)
    }
}

/// Probe that never produces metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl MetadataProbe for NoProbe {
    async fn probe(&self, _path: &Path) -> Result<VideoMetadata, ProbeError> {
        Err(ProbeError::Disabled)
    }
}

#[derive(Deserialize)]
struct FfprobeReport {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Extract metadata from `ffprobe -print_format json` output.
///
/// Duration comes from the container when present, otherwise from the first
/// video stream. ffprobe reports durations as decimal strings.
pub fn parse_ffprobe_json(stdout: &[u8]) -> Result<VideoMetadata, ProbeError> {
    let report: FfprobeReport =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;

    let duration = report
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Parse("missing duration".to_string()))?;

    Ok(VideoMetadata {
        duration_secs: duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
    })
}
