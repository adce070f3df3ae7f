/// One-shot artifact handoff.
///
/// [`claim`] marks a ready job as taken and checks its file is still on disk.
/// The returned [`Artifact`] carries a [`CleanupGuard`]; dropping the guard, after
/// the body was fully sent or the transfer was abandoned, deletes the file and
/// forgets the job.
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{RelayError, RelayResult};
use crate::registry::JobRegistry;
use crate::sanitize;

/// A ready artifact about to be streamed to the client.
pub struct Artifact {
    pub job_id: String,
    pub path: PathBuf,
    pub download_name: String,
    pub guard: CleanupGuard,
}

impl Artifact {
    /// MIME type inferred from the artifact's extension.
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.path)
    }
}

/// Claim a ready job and prepare its artifact for transfer.
///
/// Only the first caller gets the artifact; the job stays claimed until the
/// guard cleans it up. Any failed precondition is `NotFound` and leaves the
/// job as it was.
pub async fn claim(registry: &JobRegistry, job_id: &str) -> RelayResult<Artifact> {
    let record = registry.claim_ready(job_id).await?;

    let on_disk = match &record.file_path {
        Some(path) => is_file(path).await,
        None => false,
    };
    let path = match record.file_path {
        Some(path) if on_disk => path,
        other => {
            registry.release_claim(job_id).await;
            return Err(RelayError::NotFound(format!(
                "artifact for job {} missing at {:?}",
                job_id, other
            )));
        }
    };

    Ok(Artifact {
        job_id: job_id.to_string(),
        download_name: sanitize::download_name(&record.title, &path),
        guard: CleanupGuard {
            registry: registry.clone(),
            job_id: job_id.to_string(),
            path: path.clone(),
            armed: true,
        },
        path,
    })
}

async fn is_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
}

/// Deletes the artifact and removes the job when dropped.
pub struct CleanupGuard {
    registry: JobRegistry,
    job_id: String,
    path: PathBuf,
    armed: bool,
}

impl CleanupGuard {
    /// Give up the handoff without touching the file, e.g. when the artifact
    /// could not be opened after all. The job becomes claimable again.
    pub async fn disarm(mut self) {
        self.armed = false;
        self.registry.release_claim(&self.job_id).await;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = self.registry.clone();
        let job_id = std::mem::take(&mut self.job_id);
        let path = std::mem::take(&mut self.path);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!("Could not delete artifact {:?}: {}", path, e);
                    }
                    registry.remove(&job_id).await;
                    info!("Job {} handed off and cleaned up", job_id);
                });
            }
            Err(_) => {
                // Runtime already gone; the registry goes with it.
                if let Err(e) = std::fs::remove_file(&path) {
                    debug!("Could not delete artifact {:?}: {}", path, e);
                }
            }
        }
    }
}

/// MIME type for an audio/video file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "mkv" | "webm" => "video/mp4",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "opus" | "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobUpdate;
    use crate::testing::wait_for_removal;

    async fn ready_job(registry: &JobRegistry, dir: &Path, title: &str) -> PathBuf {
        let path = dir.join("j1_whatever.m4a");
        std::fs::write(&path, b"audio").unwrap();
        registry.create("j1").await.unwrap();
        registry
            .update("j1", JobUpdate::Ready { title: title.into(), file_path: path.clone() })
            .await;
        path
    }

    #[tokio::test]
    async fn test_claim_unknown_job() {
        let registry = JobRegistry::new();
        assert!(matches!(claim(&registry, "ghost").await, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_claim_requires_ready() {
        let registry = JobRegistry::new();
        registry.create("j1").await.unwrap();
        registry.update("j1", JobUpdate::PostProcessing).await;

        assert!(matches!(claim(&registry, "j1").await, Err(RelayError::NotFound(_))));
        assert!(registry.get("j1").await.is_some());
    }

    #[tokio::test]
    async fn test_claim_requires_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let path = ready_job(&registry, dir.path(), "Song").await;
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(claim(&registry, "j1").await, Err(RelayError::NotFound(_))));
        let record = registry.get("j1").await.unwrap();
        assert!(!record.claimed);
    }

    #[tokio::test]
    async fn test_second_claim_is_refused_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let path = ready_job(&registry, dir.path(), "Song").await;

        let first = claim(&registry, "j1").await.unwrap();
        assert!(matches!(claim(&registry, "j1").await, Err(RelayError::NotFound(_))));
        assert!(path.exists());

        drop(first);
        wait_for_removal(&registry, "j1").await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_claim_right_after_drop_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        ready_job(&registry, dir.path(), "Song").await;

        drop(claim(&registry, "j1").await.unwrap());
        // Cleanup runs in the background; the job must already be off limits.
        assert!(matches!(claim(&registry, "j1").await, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dropping_artifact_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let path = ready_job(&registry, dir.path(), "My: Song").await;

        let artifact = claim(&registry, "j1").await.unwrap();
        assert_eq!(artifact.download_name, "My_ Song.m4a");
        assert_eq!(artifact.content_type(), "audio/mp4");
        assert!(path.exists());

        drop(artifact);
        wait_for_removal(&registry, "j1").await;
        assert!(!path.exists());
        assert!(matches!(claim(&registry, "j1").await, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_disarmed_guard_leaves_job_alone() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let path = ready_job(&registry, dir.path(), "Song").await;

        let artifact = claim(&registry, "j1").await.unwrap();
        artifact.guard.disarm().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(path.exists());
        assert!(!registry.get("j1").await.unwrap().claimed);
        assert!(claim(&registry, "j1").await.is_ok());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a.opus")), "audio/ogg");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
