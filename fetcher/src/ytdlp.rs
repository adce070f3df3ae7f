/// yt-dlp subprocess engine.
///
/// Spawns one `yt-dlp` process per job, reads tagged progress and result
/// lines from its stdout, and forwards stderr to tracing logs.
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use ytm4a_shared::engine::{FetchEngine, FetchOutcome, FetchRequest, ProgressSender};
use ytm4a_shared::errors::FetchError;

use crate::protocol::{self, EngineLine};

/// Default format selector: best audio-only stream, preferring m4a.
pub const DEFAULT_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio";

/// Fetch engine backed by the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    /// yt-dlp executable.
    bin: PathBuf,
    /// `--format` selector.
    format: String,
    /// Passed as `--ffmpeg-location` when set.
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpEngine {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            format: DEFAULT_FORMAT.to_string(),
            ffmpeg_location: None,
        }
    }

    /// Resolve `bin` on `PATH` (or as a path) and build an engine for it.
    pub fn discover(bin: &str) -> Result<Self, FetchError> {
        let resolved = which::which(bin)
            .map_err(|e| FetchError::EngineMissing(format!("{}: {}", bin, e)))?;
        info!("Using yt-dlp at {:?}", resolved);
        Ok(Self::new(resolved))
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Build the yt-dlp invocation for one request.
    pub fn command(&self, request: &FetchRequest) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--format")
            .arg(&self.format)
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--progress")
            .arg("--progress-template")
            .arg(protocol::progress_template())
            .arg("--print")
            .arg(protocol::result_template())
            .arg("--output")
            .arg(&request.output_template);
        if let Some(location) = &self.ffmpeg_location {
            cmd.arg("--ffmpeg-location").arg(location);
        }
        cmd.arg("--").arg(&request.locator);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressSender,
    ) -> Result<FetchOutcome, FetchError> {
        let job_id = request.job_id.clone();
        let mut child = self
            .command(&request)
            .spawn()
            .map_err(|e| FetchError::SpawnFailed(format!("{:?}: {}", self.bin, e)))?;
        debug!("yt-dlp spawned for job {} (pid: {:?})", job_id, child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::ReadFailed("No stdout handle".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::ReadFailed("No stderr handle".into()))?;

        // Stderr reader task - forward to tracing, remember the last ERROR line
        let stderr_job = job_id.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut last_error = None;
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "ytdlp", "[{}] {}", stderr_job, line);
                if let Some(message) = protocol::error_message(&line) {
                    last_error = Some(message);
                }
            }
            last_error
        });

        let mut outcome = None;
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => return Err(FetchError::ReadFailed(e.to_string())),
            };
            match protocol::parse_line(&line) {
                Ok(Some(EngineLine::Progress(raw))) => {
                    if let Some(event) = raw.into_event() {
                        // The receiver only goes away if the worker itself is gone.
                        let _ = progress.send(event);
                    }
                }
                Ok(Some(EngineLine::Result(raw))) => outcome = Some(FetchOutcome::from(raw)),
                Ok(None) => debug!(target: "ytdlp", "[{}] {}", job_id, line),
                Err(e) => warn!(
                    "Invalid progress line from yt-dlp for job {}: {} (line: {})",
                    job_id,
                    e,
                    line.chars().take(200).collect::<String>()
                ),
            }
        }

        let status = child.wait().await?;
        let last_error = stderr_handle.await.unwrap_or(None);

        if !status.success() {
            return Err(match last_error {
                Some(message) => FetchError::Engine(message),
                None => FetchError::Exited(status.code().unwrap_or(-1)),
            });
        }
        outcome.ok_or(FetchError::MissingResult)
    }
}
