/// In-memory job registry.
///
/// One instance is created at startup and cloned into every component that
/// touches jobs. Each operation takes the lock once and releases it before
/// returning, so callers never hold a record across an await point.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{RelayError, RelayResult};
use crate::models::{JobRecord, JobStatus, JobUpdate, Snapshot};

/// Thread-safe job directory keyed by job id.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new job in the `Starting` state. Fails if the id is already tracked.
    pub async fn create(&self, job_id: &str) -> RelayResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job_id) {
            warn!("Job {} already registered", job_id);
            return Err(RelayError::DuplicateJob(job_id.to_string()));
        }
        jobs.insert(job_id.to_string(), JobRecord::new(job_id));
        debug!("Job {} registered", job_id);
        Ok(())
    }

    /// Clone of the current record, if any.
    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    /// Like [`get`](Self::get), but a missing job is an error.
    pub async fn require(&self, job_id: &str) -> RelayResult<JobRecord> {
        self.get(job_id)
            .await
            .ok_or_else(|| RelayError::NotFound(job_id.to_string()))
    }

    /// Current snapshot, or the `unknown` placeholder for untracked ids.
    pub async fn snapshot(&self, job_id: &str) -> Snapshot {
        match self.jobs.lock().await.get(job_id) {
            Some(record) => record.snapshot(),
            None => Snapshot::unknown(),
        }
    }

    /// Apply a field group atomically.
    ///
    /// Returns false when the job is gone or already terminal; a lagging
    /// worker writing to a consumed job is expected and harmless.
    pub async fn update(&self, job_id: &str, update: JobUpdate) -> bool {
        match self.jobs.lock().await.get_mut(job_id) {
            Some(record) => {
                let applied = record.apply(update);
                if !applied {
                    debug!("Ignored update for terminal job {}", job_id);
                }
                applied
            }
            None => {
                debug!("Ignored update for untracked job {}", job_id);
                false
            }
        }
    }

    /// Stop tracking a job. Removing an absent id is a no-op.
    pub async fn remove(&self, job_id: &str) -> Option<JobRecord> {
        let removed = self.jobs.lock().await.remove(job_id);
        if removed.is_some() {
            debug!("Job {} removed", job_id);
        }
        removed
    }

    /// Mark a ready job as handed off and return it.
    ///
    /// The check and the mark happen under one lock, so of any number of
    /// concurrent callers exactly one succeeds. Unknown, unfinished, failed and
    /// already claimed jobs are all `NotFound`.
    pub async fn claim_ready(&self, job_id: &str) -> RelayResult<JobRecord> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| RelayError::NotFound(job_id.to_string()))?;
        if record.status != JobStatus::Ready {
            return Err(RelayError::NotFound(format!("job {} is {}", job_id, record.status)));
        }
        if record.claimed {
            return Err(RelayError::NotFound(format!("job {} was already handed off", job_id)));
        }
        record.claimed = true;
        debug!("Job {} claimed for handoff", job_id);
        Ok(record.clone())
    }

    /// Undo [`claim_ready`](Self::claim_ready) for a handoff that never started.
    pub async fn release_claim(&self, job_id: &str) -> bool {
        match self.jobs.lock().await.get_mut(job_id) {
            Some(record) if record.claimed => {
                record.claimed = false;
                debug!("Job {} claim released", job_id);
                true
            }
            _ => false,
        }
    }

    /// Remove terminal jobs that finished more than `max_age` ago and return them.
    /// Jobs in the middle of a handoff are left to the handoff.
    pub async fn sweep_finished(&self, max_age: chrono::Duration) -> Vec<JobRecord> {
        let cutoff = chrono::Utc::now() - max_age;
        let mut jobs = self.jobs.lock().await;
        let expired: Vec<String> = jobs
            .values()
            .filter(|j| j.status.is_terminal() && !j.claimed)
            .filter(|j| j.finished_at.map_or(false, |t| t < cutoff))
            .map(|j| j.id.clone())
            .collect();

        let removed: Vec<JobRecord> = expired.iter().filter_map(|id| jobs.remove(id)).collect();
        if !removed.is_empty() {
            info!("Swept {} abandoned jobs", removed.len());
        }
        removed
    }

    /// Registry statistics snapshot.
    pub async fn stats(&self) -> RegistryStats {
        let jobs = self.jobs.lock().await;
        let count = |status: JobStatus| jobs.values().filter(|j| j.status == status).count();
        RegistryStats {
            total_tracked: jobs.len(),
            active: jobs.values().filter(|j| !j.status.is_terminal()).count(),
            ready: count(JobStatus::Ready),
            failed: count(JobStatus::Error),
        }
    }

    /// Number of live handles sharing this registry.
    #[cfg(any(test, feature = "testing"))]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.jobs)
    }
}

/// Registry statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub total_tracked: usize,
    pub active: usize,
    pub ready: usize,
    pub failed: usize,
}
