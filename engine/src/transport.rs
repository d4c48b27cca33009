//! Network seam between the engine and the processing service.
//!
//! The `Transport` trait is what the upload controller talks to, so the
//! controller can be driven by a scripted transport in tests and by
//! `HttpTransport` in production.

use std::future::Future;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ConfigError, TransportError};
use crate::model::{JobResult, SegmentDuration, SelectedFile};

/// Wait suggested to the user when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// One HTTP exchange per call; retrying is the caller's business.
pub trait Transport: Send + Sync + 'static {
    /// `POST /upload` with the file and the chosen segment duration.
    fn upload(
        &self,
        file: &SelectedFile,
        duration: SegmentDuration,
    ) -> impl Future<Output = Result<JobResult, TransportError>> + Send;

    /// `GET /download/{output_dir}/{filename}` into `dest_dir/filename`.
    ///
    /// Returns the number of bytes written.
    fn download(
        &self,
        output_dir: &str,
        filename: &str,
        dest_dir: &Path,
    ) -> impl Future<Output = Result<u64, TransportError>> + Send;
}

/// `Transport` backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base_url =
            Url::parse(&config.server_url).map_err(|e| ConfigError::InvalidServerUrl {
                url: config.server_url.clone(),
                reason: e.to_string(),
            })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidServerUrl {
                url: config.server_url.clone(),
                reason: "url cannot carry a path".to_string(),
            });
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(HttpTransport { client, base_url })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl Transport for HttpTransport {
    async fn upload(
        &self,
        file: &SelectedFile,
        duration: SegmentDuration,
    ) -> Result<JobResult, TransportError> {
        // Reopened on every attempt so a retry streams from the beginning.
        let handle = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| TransportError::Io {
                path: file.path.clone(),
                source,
            })?;
        let body = Body::wrap_stream(ReaderStream::new(handle));
        let video = Part::stream_with_length(body, file.size_bytes)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new()
            .part("video", video)
            .text("duration", duration.as_secs().to_string());

        let url = self.endpoint(&["upload"]);
        debug!(%url, file = %file.name, duration = duration.as_secs(), "posting upload");
        let response = self.client.post(url).multipart(form).send().await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        interpret_upload_response(status, retry_after.as_deref(), &body)
    }

    async fn download(
        &self,
        output_dir: &str,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<u64, TransportError> {
        let dest = safe_destination(dest_dir, filename)?;
        let url = self.endpoint(&["download", output_dir, filename]);
        debug!(%url, dest = %dest.display(), "downloading segment");

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.bytes().await?;
            return Err(TransportError::Server {
                status,
                message: error_message(&body).unwrap_or_else(|| "File not found".to_string()),
            });
        }

        // Only a complete body ever appears under the final name.
        let partial = partial_path(&dest);
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
        };
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|source| TransportError::Io {
                path: dest.clone(),
                source,
            })?;
        Ok(written)
    }
}

/// Hidden sibling of `dest` that receives the body while it streams.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.part", name))
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64, TransportError> {
    let io_err = |source| TransportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    out.flush().await.map_err(io_err)?;
    Ok(written)
}

/// Join a server-supplied file name onto `dest_dir`, refusing anything that
/// is not a bare file name.
fn safe_destination(dest_dir: &Path, filename: &str) -> Result<PathBuf, TransportError> {
    let name = Path::new(filename);
    match name.file_name() {
        Some(bare) if bare == name.as_os_str() => Ok(dest_dir.join(bare)),
        _ => Err(TransportError::Io {
            path: dest_dir.join(filename),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("refusing unsafe segment name '{}'", filename),
            ),
        }),
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Pull `{"error": "..."}` out of a response body, if present.
fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
}

/// Classify an upload response.
///
/// - 2xx: the body must decode as a `JobResult`
/// - 429: `RateLimited`, waiting `Retry-After` seconds (default 60)
/// - anything else: `Server` with the body's `error` text
pub fn interpret_upload_response(
    status: u16,
    retry_after: Option<&str>,
    body: &[u8],
) -> Result<JobResult, TransportError> {
    if (200..300).contains(&status) {
        return serde_json::from_slice::<JobResult>(body).map_err(|e| TransportError::Server {
            status,
            message: format!("Invalid response from server: {}", e),
        });
    }

    let message = error_message(body);
    if status == 429 {
        let retry_after_secs = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(TransportError::RateLimited {
            retry_after_secs,
            message: message.unwrap_or_else(|| "Rate limit exceeded".to_string()),
        });
    }

    Err(TransportError::Server {
        status,
        message: message.unwrap_or_else(|| "Upload failed".to_string()),
    })
}
