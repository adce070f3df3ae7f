/// Line protocol spoken by the yt-dlp child process.
///
/// yt-dlp is asked to print two kinds of tagged lines on stdout:
/// progress dictionaries (`[ytm4a-progress] {...}`) and, after the file has
/// been moved into place, the final result (`[ytm4a-result] {...}`).
/// Everything else on stdout is ignored.
use serde::Deserialize;
use std::path::PathBuf;

use ytm4a_shared::engine::{FetchEvent, FetchOutcome};

pub const PROGRESS_MARKER: &str = "[ytm4a-progress]";
pub const RESULT_MARKER: &str = "[ytm4a-result]";

/// `--progress-template` value emitting one JSON progress dictionary per line.
pub fn progress_template() -> String {
    format!("download:{} %(progress)j", PROGRESS_MARKER)
}

/// `--print` value emitting the title and final path once the file is in place.
pub fn result_template() -> String {
    format!("after_move:{} %(.{{title,filepath}})j", RESULT_MARKER)
}

/// Progress dictionary as yt-dlp reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProgress {
    pub status: String,
    #[serde(default)]
    pub downloaded_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes_estimate: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub eta: Option<f64>,
}

impl RawProgress {
    /// Typed event, or `None` for statuses the worker does not track.
    pub fn into_event(self) -> Option<FetchEvent> {
        match self.status.as_str() {
            "downloading" => {
                let total = self
                    .total_bytes
                    .filter(|t| *t > 0.0)
                    .or(self.total_bytes_estimate)
                    .filter(|t| *t > 0.0)
                    .map(|t| t as u64);
                Some(FetchEvent::Downloading {
                    downloaded_bytes: self.downloaded_bytes.unwrap_or(0.0).max(0.0) as u64,
                    total_bytes: total,
                    speed: self.speed,
                    eta: self.eta,
                })
            }
            "finished" => Some(FetchEvent::Finished),
            _ => None,
        }
    }
}

/// Final result printed after the artifact is in place.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub title: Option<String>,
    pub filepath: PathBuf,
}

impl From<RawResult> for FetchOutcome {
    fn from(raw: RawResult) -> Self {
        FetchOutcome {
            title: raw.title.unwrap_or_default(),
            final_path: raw.filepath,
        }
    }
}

/// One recognised stdout line.
#[derive(Debug)]
pub enum EngineLine {
    Progress(RawProgress),
    Result(RawResult),
}

/// Parse a stdout line. `Ok(None)` for untagged lines, `Err` for tagged lines
/// with a malformed payload.
pub fn parse_line(line: &str) -> Result<Option<EngineLine>, serde_json::Error> {
    let line = line.trim();
    if let Some(payload) = line.strip_prefix(PROGRESS_MARKER) {
        return serde_json::from_str(payload.trim()).map(|p| Some(EngineLine::Progress(p)));
    }
    if let Some(payload) = line.strip_prefix(RESULT_MARKER) {
        return serde_json::from_str(payload.trim()).map(|r| Some(EngineLine::Result(r)));
    }
    Ok(None)
}

/// Message of a yt-dlp `ERROR:` line on stderr.
pub fn error_message(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix("ERROR:")
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}
