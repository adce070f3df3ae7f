/// Live progress feed for one job.
///
/// Polls the registry on a fixed interval and yields a snapshot whenever the
/// rendered payload changes. Terminal snapshots are always yielded and end the
/// feed. A job that was never registered reports `unknown` once and the feed
/// then stays open until the consumer drops it.
use std::time::Duration;
use tokio_stream::Stream;
use tracing::debug;

use crate::models::Snapshot;
use crate::registry::JobRegistry;

/// Default delay between two registry reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn progress_feed(
    registry: JobRegistry,
    job_id: String,
    interval: Duration,
) -> impl Stream<Item = Snapshot> + Send + 'static {
    async_stream::stream! {
        let mut last: Option<Snapshot> = None;
        loop {
            let snapshot = registry.snapshot(&job_id).await;
            if snapshot.status.is_terminal() {
                debug!("Feed for job {} closing on {}", job_id, snapshot.status);
                yield snapshot;
                break;
            }
            if last.as_ref() != Some(&snapshot) {
                last = Some(snapshot.clone());
                yield snapshot;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FetchEvent, FetchOutcome};
    use crate::models::{JobStatus, JobUpdate};
    use crate::testing::{ScriptedEngine, Step};
    use crate::worker::JobRunner;
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_terminal_snapshot_closes_feed() {
        let registry = JobRegistry::new();
        registry.create("j1").await.unwrap();
        registry.update("j1", JobUpdate::Failed { message: "network timeout".into() }).await;

        let snapshots: Vec<Snapshot> = progress_feed(registry, "j1".into(), TICK).collect().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, JobStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_snapshots_are_not_repeated() {
        let registry = JobRegistry::new();
        registry.create("j1").await.unwrap();

        let feed = progress_feed(registry.clone(), "j1".into(), DEFAULT_POLL_INTERVAL);
        tokio::pin!(feed);

        assert_eq!(feed.next().await.unwrap().status, JobStatus::Starting);

        // Several polls pass with nothing new; the next item is the change.
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 4).await;
        registry
            .update("j1", JobUpdate::Downloading { percent: 10, eta: Some(9), speed: "1.0 KB/s".into() })
            .await;
        let next = feed.next().await.unwrap();
        assert_eq!(next.status, JobStatus::Downloading);
        assert_eq!(next.pct(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_job_reports_once_and_stays_open() {
        let registry = JobRegistry::new();
        let feed = progress_feed(registry, "ghost".into(), DEFAULT_POLL_INTERVAL);
        tokio::pin!(feed);

        assert_eq!(feed.next().await.unwrap(), Snapshot::unknown());
        let more = tokio::time::timeout(DEFAULT_POLL_INTERVAL * 20, feed.next()).await;
        assert!(more.is_err(), "feed for unknown job should neither repeat nor end");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_feed_stops_polling() {
        let registry = JobRegistry::new();
        registry.create("j1").await.unwrap();
        let baseline = registry.handle_count();

        let feed = progress_feed(registry.clone(), "j1".into(), DEFAULT_POLL_INTERVAL);
        let mut feed = Box::pin(feed);
        assert_eq!(feed.next().await.unwrap().status, JobStatus::Starting);
        assert_eq!(registry.handle_count(), baseline + 1);

        // Consumer goes away mid-job; the feed's registry handle goes with it
        // and later changes are never read.
        drop(feed);
        assert_eq!(registry.handle_count(), baseline);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 10).await;
        registry.update("j1", JobUpdate::PostProcessing).await;
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 10).await;
        assert_eq!(registry.handle_count(), baseline);
    }

    #[tokio::test]
    async fn test_full_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, script) = ScriptedEngine::new();
        let runner = JobRunner::new(JobRegistry::new(), Arc::new(engine), dir.path());
        let job_id = runner.submit("https://example/video").await.unwrap();

        let feed = progress_feed(runner.registry().clone(), job_id.clone(), TICK);
        let collector = tokio::spawn(feed.collect::<Vec<Snapshot>>());

        for done in [256u64, 512, 1024] {
            script
                .send(Step::Event(FetchEvent::Downloading {
                    downloaded_bytes: done,
                    total_bytes: Some(1024),
                    speed: Some(1024.0),
                    eta: Some(1.0),
                }))
                .unwrap();
            tokio::time::sleep(TICK * 4).await;
        }
        script.send(Step::Event(FetchEvent::Finished)).unwrap();
        tokio::time::sleep(TICK * 4).await;

        let artifact = dir.path().join("song.m4a");
        std::fs::write(&artifact, b"audio").unwrap();
        script
            .send(Step::Done(Ok(FetchOutcome { title: "Song".into(), final_path: artifact })))
            .unwrap();

        let snapshots = tokio::time::timeout(Duration::from_secs(5), collector)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshots.first().unwrap().status, JobStatus::Starting);
        let last = snapshots.last().unwrap();
        assert_eq!(last.status, JobStatus::Ready);
        assert_eq!(last.pct(), 100);
        assert_eq!(last.detail.as_ref().unwrap().title, "Song");

        for pair in snapshots.windows(2) {
            assert!(pair[0].pct() <= pair[1].pct());
            assert_ne!(pair[0], pair[1]);
        }
        for s in &snapshots {
            assert!(s.pct() <= 100);
        }
    }
}
