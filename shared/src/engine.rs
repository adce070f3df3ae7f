/// Contract between the job runner and a media fetch engine.
///
/// An engine receives a locator and an output path template, pushes zero or
/// more [`FetchEvent`]s into the progress sender while it works, and finally
/// returns the resolved title and artifact path or a [`FetchError`].
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::errors::FetchError;

/// Placeholder the engine substitutes with the resolved media title.
pub const TITLE_PLACEHOLDER: &str = "%(title)s";

/// Placeholder the engine substitutes with the artifact extension.
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Typed progress event emitted while an engine runs.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Downloading {
        downloaded_bytes: u64,
        /// Exact size, or the engine's estimate when the exact size is unknown.
        total_bytes: Option<u64>,
        /// Raw bytes per second.
        speed: Option<f64>,
        /// Raw seconds remaining.
        eta: Option<f64>,
    },
    /// Transfer complete, post-processing under way.
    Finished,
}

/// Channel the engine writes progress events to.
pub type ProgressSender = mpsc::UnboundedSender<FetchEvent>;

/// One fetch to perform.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub job_id: String,
    pub locator: String,
    /// Path template containing [`TITLE_PLACEHOLDER`] and [`EXT_PLACEHOLDER`].
    pub output_template: String,
}

impl FetchRequest {
    /// Build a request whose artifact lands at `<dir>/<job_id>_<title>.<ext>`.
    pub fn new(job_id: impl Into<String>, locator: impl Into<String>, output_dir: &std::path::Path) -> Self {
        let job_id = job_id.into();
        let file_template = format!("{}_{}.{}", job_id, TITLE_PLACEHOLDER, EXT_PLACEHOLDER);
        Self {
            output_template: output_dir.join(file_template).to_string_lossy().into_owned(),
            job_id,
            locator: locator.into(),
        }
    }
}

/// What a successful fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub title: String,
    pub final_path: PathBuf,
}

#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Run one fetch to completion. All progress events are sent before this returns.
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressSender,
    ) -> Result<FetchOutcome, FetchError>;
}
