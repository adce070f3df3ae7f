/// ytm4a API Server
///
/// Accepts a media link, runs yt-dlp for it in the background, streams live
/// progress over server-sent events and hands the finished audio over once.
mod config;
mod routes;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use ytm4a_fetcher::YtDlpEngine;
use ytm4a_shared::registry::JobRegistry;
use ytm4a_shared::worker::JobRunner;

use config::Config;

/// Shared application state for all handlers.
pub struct AppState {
    pub jobs: JobRunner,
    pub poll_interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ytm4a_api=info,ytm4a_shared=info,ytm4a_fetcher=info,tower_http=info".into()
            }),
        )
        .init();

    info!("=== ytm4a starting ===");

    // Config
    let config = Config::from_env();
    std::fs::create_dir_all(&config.download_dir)?;
    info!("Download directory: {}", config.download_dir.display());

    // Fetch engine
    let engine = YtDlpEngine::discover(&config.ytdlp_bin)?
        .with_format(config.ytdlp_format.clone())
        .with_ffmpeg_location(config.ffmpeg_location.clone());

    let registry = JobRegistry::new();
    let state = Arc::new(AppState {
        jobs: JobRunner::new(registry.clone(), Arc::new(engine), config.download_dir.clone()),
        poll_interval: config.poll_interval,
    });

    // Background sweep of abandoned jobs (opt-in)
    if let Some(retention) = config.job_retention {
        info!(
            "Sweeping finished jobs older than {}s every {}s",
            retention.as_secs(),
            config.sweep_interval.as_secs()
        );
        spawn_sweeper(registry.clone(), retention, config.sweep_interval);
    }

    let app = routes::router(state);

    // Bind
    let addr = config.bind_addr();
    info!("ytm4a listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop terminal jobs nobody collected, along with their files.
fn spawn_sweeper(registry: JobRegistry, retention: Duration, every: Duration) {
    let max_age = chrono::Duration::seconds(retention.as_secs() as i64);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            for job in registry.sweep_finished(max_age).await {
                if let Some(path) = job.file_path {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => debug!("Deleted abandoned artifact {:?}", path),
                        Err(e) => warn!("Could not delete abandoned artifact {:?}: {}", path, e),
                    }
                }
            }
        }
    });
}
