/// Fake fetch engines for tests.
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::engine::{
    FetchEngine, FetchEvent, FetchOutcome, FetchRequest, ProgressSender, EXT_PLACEHOLDER,
    TITLE_PLACEHOLDER,
};
use crate::errors::FetchError;
use crate::models::JobRecord;
use crate::registry::JobRegistry;

/// Engine that completes immediately, either writing an artifact or failing.
pub struct StubEngine {
    title: String,
    contents: Vec<u8>,
    failure: Option<String>,
}

impl StubEngine {
    /// Report progress, write `contents` to the templated path as `.m4a`, succeed.
    pub fn succeed(title: &str, contents: &[u8]) -> Self {
        Self {
            title: title.to_string(),
            contents: contents.to_vec(),
            failure: None,
        }
    }

    /// Report some progress, then fail with `message`.
    pub fn fail(message: &str) -> Self {
        Self {
            title: String::new(),
            contents: Vec::new(),
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl FetchEngine for StubEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressSender,
    ) -> Result<FetchOutcome, FetchError> {
        let total = self.contents.len().max(1) as u64;
        let _ = progress.send(FetchEvent::Downloading {
            downloaded_bytes: total / 2,
            total_bytes: Some(total),
            speed: Some(2048.0),
            eta: Some(1.0),
        });

        if let Some(message) = &self.failure {
            return Err(FetchError::Engine(message.clone()));
        }

        let _ = progress.send(FetchEvent::Downloading {
            downloaded_bytes: total,
            total_bytes: Some(total),
            speed: Some(4096.0),
            eta: Some(0.0),
        });
        let _ = progress.send(FetchEvent::Finished);

        let final_path = request
            .output_template
            .replace(TITLE_PLACEHOLDER, &self.title)
            .replace(EXT_PLACEHOLDER, "m4a");
        tokio::fs::write(&final_path, &self.contents).await?;

        Ok(FetchOutcome {
            title: self.title.clone(),
            final_path: final_path.into(),
        })
    }
}

/// One instruction for a [`ScriptedEngine`].
#[derive(Debug)]
pub enum Step {
    Event(FetchEvent),
    Done(Result<FetchOutcome, FetchError>),
}

/// Engine driven step by step from the test body.
pub struct ScriptedEngine {
    script: Mutex<Option<mpsc::UnboundedReceiver<Step>>>,
}

impl ScriptedEngine {
    pub fn new() -> (Self, mpsc::UnboundedSender<Step>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    async fn fetch(
        &self,
        _request: FetchRequest,
        progress: ProgressSender,
    ) -> Result<FetchOutcome, FetchError> {
        let mut script = match self.script.lock().await.take() {
            Some(script) => script,
            None => return Err(FetchError::Engine("script already used".into())),
        };

        while let Some(step) = script.recv().await {
            match step {
                Step::Event(event) => {
                    let _ = progress.send(event);
                }
                Step::Done(result) => return result,
            }
        }
        Err(FetchError::Engine("script ended without a result".into()))
    }
}

/// Engine that reports half the transfer and then panics.
pub struct PanicEngine;

#[async_trait]
impl FetchEngine for PanicEngine {
    async fn fetch(
        &self,
        _request: FetchRequest,
        progress: ProgressSender,
    ) -> Result<FetchOutcome, FetchError> {
        let _ = progress.send(FetchEvent::Downloading {
            downloaded_bytes: 50,
            total_bytes: Some(100),
            speed: None,
            eta: None,
        });
        panic!("fetch engine bug");
    }
}

/// Poll until the job is terminal. Panics after five seconds.
pub async fn wait_for_terminal(registry: &JobRegistry, job_id: &str) -> JobRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(record) = registry.get(job_id).await {
            if record.status.is_terminal() {
                return record;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "job {} never finished", job_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the job is no longer tracked. Panics after five seconds.
pub async fn wait_for_removal(registry: &JobRegistry, job_id: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registry.get(job_id).await.is_some() {
        assert!(tokio::time::Instant::now() < deadline, "job {} never removed", job_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
