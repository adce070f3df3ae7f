/// Job runner: accepts submissions and drives one fetch worker per job.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{FetchEngine, FetchEvent, FetchOutcome, FetchRequest};
use crate::errors::{FetchError, RelayError, RelayResult};
use crate::models::JobUpdate;
use crate::progress;
use crate::registry::JobRegistry;
use crate::sanitize::FALLBACK_TITLE;

/// User-facing message for an empty submission.
pub const EMPTY_LOCATOR_MESSAGE: &str = "Please paste a YouTube URL.";

/// Owns the engine and the output directory; hands out job ids.
#[derive(Clone)]
pub struct JobRunner {
    registry: JobRegistry,
    engine: Arc<dyn FetchEngine>,
    download_dir: PathBuf,
}

impl JobRunner {
    pub fn new(registry: JobRegistry, engine: Arc<dyn FetchEngine>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            engine,
            download_dir: download_dir.into(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Register a job for `locator` and start its worker. Returns the new job id
    /// without waiting on the fetch.
    pub async fn submit(&self, locator: &str) -> RelayResult<String> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(RelayError::Validation(EMPTY_LOCATOR_MESSAGE.to_string()));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        self.registry.create(&job_id).await?;
        self.spawn_worker(job_id.clone(), locator.to_string());

        info!("Job submitted: job={} locator={}", job_id, locator);
        Ok(job_id)
    }

    fn spawn_worker(&self, job_id: String, locator: String) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let engine = self.engine.clone();
        let request = FetchRequest::new(job_id, locator, &self.download_dir);
        tokio::spawn(async move {
            run_job(registry, engine, request).await;
        })
    }
}

/// Drive one job from `Starting` to a terminal state. Every engine fault,
/// including a panic inside the engine, ends up in the job record.
pub async fn run_job(registry: JobRegistry, engine: Arc<dyn FetchEngine>, request: FetchRequest) {
    let job_id = request.job_id.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut fetch = tokio::spawn(async move { engine.fetch(request, tx).await });

    let result = loop {
        tokio::select! {
            biased;
            Some(event) = rx.recv() => apply_event(&registry, &job_id, &event).await,
            joined = &mut fetch => {
                break joined.unwrap_or_else(|e| Err(FetchError::Crashed(e.to_string())));
            }
        }
    };

    // Events sent right before the engine returned.
    while let Ok(event) = rx.try_recv() {
        apply_event(&registry, &job_id, &event).await;
    }

    match finalize(result).await {
        Ok((title, file_path)) => {
            let update = JobUpdate::Ready {
                title: title.clone(),
                file_path: file_path.clone(),
            };
            if registry.update(&job_id, update).await {
                info!("Job {} ready: {:?}", job_id, file_path);
            } else {
                // The job failed while processing progress, or is gone. Nobody
                // will collect this file.
                warn!("Job {} finished after it was closed, discarding {:?}", job_id, file_path);
                if let Err(e) = tokio::fs::remove_file(&file_path).await {
                    debug!("Could not discard {:?}: {}", file_path, e);
                }
            }
        }
        Err(e) => {
            warn!("Job {} failed: {}", job_id, e);
            registry
                .update(&job_id, JobUpdate::Failed { message: e.to_string() })
                .await;
        }
    }
}

async fn apply_event(registry: &JobRegistry, job_id: &str, event: &FetchEvent) {
    let update = match progress::interpret(event) {
        Ok(update) => update,
        Err(e) => {
            warn!("Job {} progress error: {}", job_id, e);
            JobUpdate::Failed {
                message: FetchError::from(e).to_string(),
            }
        }
    };
    registry.update(job_id, update).await;
}

/// Check the engine's result: the artifact must exist and its path becomes absolute.
async fn finalize(result: Result<FetchOutcome, FetchError>) -> Result<(String, PathBuf), FetchError> {
    let outcome = result?;
    let file_path = tokio::fs::canonicalize(&outcome.final_path)
        .await
        .map_err(|_| FetchError::ArtifactMissing(outcome.final_path.display().to_string()))?;

    let title = if outcome.title.trim().is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        outcome.title
    };
    Ok((title, file_path))
}
