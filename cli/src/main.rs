//! VidSplit - Command-line interface for the video splitting client.
//!
//! Uploads one video, shows progress and notifications on stderr, and saves
//! the resulting parts. This is the simplest front end over the engine's
//! client dispatcher.

use clap::Parser;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use engine::{
    Client, ClientConfig, MetadataProbe, Notification, SegmentDuration, SelectedFile, Transport,
    View, ViewKind,
};

/// VidSplit - Split a video into equal parts
#[derive(Parser, Debug)]
#[command(name = "vidsplit")]
#[command(version = "0.1.0")]
#[command(about = "Upload a video to a VidSplit server and download the parts")]
struct Args {
    /// Video file to split
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Segment length in seconds: 60, 300, 600 or 900
    #[arg(long, value_name = "SECS", conflicts_with = "minutes")]
    duration: Option<u32>,

    /// Custom segment length in minutes (1-60)
    #[arg(long, value_name = "N")]
    minutes: Option<i64>,

    /// Server base URL, overriding the config file
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for downloaded parts (default: ./<output_dir>)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Do not download the parts after processing
    #[arg(long)]
    no_download: bool,

    /// Disable the client-side progress animation
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// Draws views and notifications to stderr.
struct CliView {
    verbose: bool,
    start_time: Instant,
    last_view: Option<View>,
    seen: HashSet<Uuid>,
    on_progress_line: bool,
}

impl CliView {
    fn new(verbose: bool) -> Self {
        CliView {
            verbose,
            start_time: Instant::now(),
            last_view: None,
            seen: HashSet::new(),
            on_progress_line: false,
        }
    }

    fn print_progress_bar(percent: u8) -> String {
        let percent = percent.min(100) as usize;
        let filled = percent / 5;
        let empty = 20 - filled;
        format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn format_elapsed(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        if secs >= 60 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}s", secs)
        }
    }

    /// End an in-place progress line before printing anything else.
    fn finish_line(&mut self) {
        if self.on_progress_line {
            eprintln!();
            self.on_progress_line = false;
        }
    }

    fn draw(&mut self, view: View, notifications: &[Notification]) {
        self.show_notifications(notifications);
        if self.last_view.as_ref() == Some(&view) {
            return;
        }

        match &view {
            View::Selection => {}
            View::Configuring(config) => {
                // Redrawn when metadata arrives; only the summary line changes.
                let first = !matches!(self.last_view, Some(View::Configuring(_)));
                if first {
                    eprintln!("Selected: {}", config.file_name);
                }
                eprintln!("  {}", config.summary);
                if first {
                    eprintln!("  Segment length: {}", config.duration_label);
                }
            }
            View::Processing(processing) => {
                let mut line = format!(
                    "\r{} {}",
                    Self::print_progress_bar(processing.percent),
                    processing.status
                );
                if let Some(parts) = &processing.parts {
                    line.push_str(&format!(" ({})", parts));
                }
                if let Some(attempt) = &processing.attempt {
                    line.push_str(&format!(" [{}]", attempt));
                }
                // Clear leftovers from a longer previous status.
                eprint!("{:<100}", line);
                let _ = std::io::stderr().flush();
                self.on_progress_line = true;
            }
            View::Results(results) => {
                self.finish_line();
                eprintln!("Processing complete!");
                if let Some(message) = &results.message {
                    eprintln!("  {}", message);
                }
                eprintln!("  Duration: {}", results.duration);
                eprintln!("  Segments: {}", results.segment_count);
                for card in &results.segments {
                    eprintln!("  {:<8} {}", card.title, card.detail);
                    if self.verbose {
                        eprintln!("           {}", card.download_path);
                    }
                }
                eprintln!("Elapsed: {}", Self::format_elapsed(self.start_time.elapsed()));
            }
            View::Error(_) => self.finish_line(),
        }
        self.last_view = Some(view);
    }

    /// Print each notification once, when it first appears.
    fn show_notifications(&mut self, notifications: &[Notification]) {
        for note in notifications {
            if self.seen.insert(note.id) {
                self.finish_line();
                eprintln!("{} {}", note.severity.icon(), note.message);
            }
        }
    }
}

/// Parse arguments, run the upload, and exit with its status
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Exit code tracking
    let exit_code = match run_cli(&args).await {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Layer command-line flags over the config file (or the defaults).
fn load_config(args: &Args) -> Result<ClientConfig, String> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path).map_err(|e| e.to_string())?,
        None => ClientConfig::default(),
    };
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if args.no_progress {
        config.progress.synthetic = false;
    }
    config.validate().map_err(|e| e.to_string())?;
    debug!(server = %config.server_url, "configuration loaded");
    Ok(config)
}

fn segment_duration(args: &Args) -> Result<SegmentDuration, String> {
    match (args.duration, args.minutes) {
        (Some(secs), _) => SegmentDuration::from_preset_secs(secs).ok_or_else(|| {
            format!(
                "Invalid duration '{}'. Must be one of 60, 300, 600 or 900 seconds",
                secs
            )
        }),
        (None, Some(minutes)) => {
            SegmentDuration::from_custom_minutes(minutes).map_err(|e| e.to_string())
        }
        (None, None) => Ok(SegmentDuration::DEFAULT),
    }
}

/// Local directory for the parts. The server's directory id is only used
/// when it is a plain name.
fn download_dir(args: &Args, output_dir: &str) -> PathBuf {
    if let Some(dir) = &args.output {
        return dir.clone();
    }
    let name = Path::new(output_dir);
    match name.file_name() {
        Some(bare) if bare == name.as_os_str() => PathBuf::from(bare),
        _ => PathBuf::from("segments"),
    }
}

/// Apply background events until the client settles, redrawing as it goes.
async fn pump<T, P>(client: &mut Client<T, P>, screen: &mut CliView) -> Result<ViewKind, String>
where
    T: Transport,
    P: MetadataProbe,
{
    screen.draw(client.view(), client.notifications());
    while client.is_busy() {
        tokio::select! {
            _ = client.next_event() => screen.draw(client.view(), client.notifications()),
            _ = tokio::signal::ctrl_c() => {
                let _ = client.reset();
                screen.finish_line();
                return Err("Interrupted".to_string());
            }
        }
    }
    screen.draw(client.view(), client.notifications());
    Ok(client.kind())
}

/// Main CLI logic - separated for testability
async fn run_cli(args: &Args) -> Result<(), String> {
    let config = load_config(args)?;
    let duration = segment_duration(args)?;

    let file = SelectedFile::from_path(&args.file)
        .await
        .map_err(|e| format!("Cannot read {}: {}", args.file.display(), e))?;

    let mut client =
        Client::http(config).map_err(|e| format!("Client setup failed: {}", e))?;
    let mut screen = CliView::new(args.verbose);

    client.select_file(file).map_err(|e| e.to_string())?;
    client.choose_duration(duration).map_err(|e| e.to_string())?;
    // Wait for metadata so the summary line is complete.
    pump(&mut client, &mut screen).await?;

    client.submit().map_err(|e| e.to_string())?;
    if pump(&mut client, &mut screen).await? != ViewKind::ShowingResults {
        return Err(match client.view() {
            View::Error(error) => error.message,
            other => format!("Upload ended while {}", other.kind()),
        });
    }

    if args.no_download {
        return Ok(());
    }

    let output_dir = client
        .session()
        .job_result()
        .map(|r| r.output_dir.clone())
        .unwrap_or_default();
    let dest = download_dir(args, &output_dir);
    let report = client
        .download_all(&dest)
        .await
        .map_err(|e| format!("Download failed: {}", e))?;
    screen.show_notifications(client.notifications());

    let mut saved = 0;
    for path in report.iter().flatten() {
        saved += 1;
        if args.verbose {
            eprintln!("  Saved {}", path.display());
        }
    }
    eprintln!("Saved {} parts to {}", saved, dest.display());

    let failed = report.len() - saved;
    if failed > 0 {
        return Err(format!("{} of {} parts failed to download", failed, report.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args_for(file: PathBuf) -> Args {
        Args {
            file,
            duration: None,
            minutes: None,
            server: None,
            config: None,
            output: None,
            no_download: false,
            no_progress: false,
            verbose: false,
        }
    }

    #[tokio::test]
    async fn test_cli_rejects_missing_file() {
        let args = args_for(PathBuf::from("/nonexistent/video.mp4"));
        let result = run_cli(&args).await;
        assert!(result.is_err(), "CLI should reject a missing file");
    }

    #[tokio::test]
    async fn test_cli_rejects_non_video_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").expect("Failed to write file");

        let result = run_cli(&args_for(path)).await;
        assert_eq!(
            result,
            Err("Invalid file type. Please select a video file.".to_string())
        );
    }

    #[tokio::test]
    async fn test_cli_rejects_invalid_preset_duration() {
        let mut args = args_for(PathBuf::from("video.mp4"));
        args.duration = Some(120);
        let result = run_cli(&args).await;
        assert!(result.is_err(), "CLI should reject a non-preset duration");
    }

    #[tokio::test]
    async fn test_cli_rejects_out_of_range_minutes() {
        let mut args = args_for(PathBuf::from("video.mp4"));
        args.minutes = Some(0);
        assert_eq!(
            run_cli(&args).await,
            Err("Please enter a duration between 1-60 minutes".to_string())
        );
    }

    #[tokio::test]
    async fn test_cli_rejects_invalid_server_url() {
        let mut args = args_for(PathBuf::from("video.mp4"));
        args.server = Some("not a url".to_string());
        let result = run_cli(&args).await;
        assert!(result.is_err(), "CLI should reject an invalid server url");
    }

    #[tokio::test]
    async fn test_cli_rejects_malformed_config() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("config.json");
        std::fs::write(&config, "{ not json").expect("Failed to write file");

        let mut args = args_for(PathBuf::from("video.mp4"));
        args.config = Some(config);
        let result = run_cli(&args).await;
        assert!(result.is_err(), "CLI should reject a malformed config");
    }

    #[tokio::test]
    async fn test_cli_reports_unreachable_server() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").expect("Failed to write file");

        // Nothing listens on port 1; keep the retry schedule short.
        let config = dir.path().join("config.json");
        std::fs::write(
            &config,
            r#"{"server_url":"http://127.0.0.1:1","retry":{"max_retries":1,"initial_delay_ms":10}}"#,
        )
        .expect("Failed to write file");

        let mut args = args_for(video);
        args.config = Some(config);
        args.no_progress = true;
        let result = run_cli(&args).await;
        assert!(result.is_err(), "CLI should fail when the server is unreachable");
    }

    #[test]
    fn test_segment_duration_flags() {
        let mut args = args_for(PathBuf::from("video.mp4"));
        assert_eq!(segment_duration(&args).unwrap().as_secs(), 300);

        args.duration = Some(900);
        assert_eq!(segment_duration(&args).unwrap().as_secs(), 900);

        args.duration = None;
        args.minutes = Some(45);
        assert_eq!(segment_duration(&args).unwrap().as_secs(), 2700);
    }

    #[test]
    fn test_flags_override_config() {
        let mut args = args_for(PathBuf::from("video.mp4"));
        args.server = Some("http://example.com:8080".to_string());
        args.no_progress = true;
        let config = load_config(&args).unwrap();
        assert_eq!(config.server_url, "http://example.com:8080");
        assert!(!config.progress.synthetic);
    }

    #[test]
    fn test_download_dir() {
        let mut args = args_for(PathBuf::from("video.mp4"));
        assert_eq!(download_dir(&args, "abc123"), PathBuf::from("abc123"));
        assert_eq!(download_dir(&args, "../etc"), PathBuf::from("segments"));
        assert_eq!(download_dir(&args, ""), PathBuf::from("segments"));

        args.output = Some(PathBuf::from("/tmp/parts"));
        assert_eq!(download_dir(&args, "abc123"), PathBuf::from("/tmp/parts"));
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(CliView::print_progress_bar(0), format!("[{}]   0%", " ".repeat(20)));
        assert_eq!(
            CliView::print_progress_bar(50),
            format!("[{}{}]  50%", "=".repeat(10), " ".repeat(10))
        );
        assert_eq!(CliView::print_progress_bar(100), format!("[{}] 100%", "=".repeat(20)));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(CliView::format_elapsed(std::time::Duration::from_secs(5)), "5s");
        assert_eq!(CliView::format_elapsed(std::time::Duration::from_secs(125)), "2m 5s");
    }
}
