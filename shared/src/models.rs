/// Job models shared across all ytm4a crates.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a job.
///
/// `Unknown` is never stored; lookups return it for ids with no record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Downloading,
    #[serde(rename = "post")]
    PostProcessing,
    Ready,
    Error,
    Unknown,
}

impl JobStatus {
    /// `Ready` and `Error` end a job; nothing mutates it afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Starting => write!(f, "starting"),
            JobStatus::Downloading => write!(f, "downloading"),
            JobStatus::PostProcessing => write!(f, "post"),
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Mutable record for one submitted job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub percent: u8,
    pub eta: Option<u64>,
    pub speed: String,
    pub title: String,
    /// Set only once the job is `Ready`.
    pub file_path: Option<PathBuf>,
    /// Set only once the job is `Error`.
    pub error_message: Option<String>,
    /// Set once a handoff has taken the artifact. A claimed job cannot be
    /// claimed again or swept.
    pub claimed: bool,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A field group applied to a record in one step.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Downloading {
        percent: u8,
        eta: Option<u64>,
        speed: String,
    },
    PostProcessing,
    Ready {
        title: String,
        file_path: PathBuf,
    },
    Failed {
        message: String,
    },
}

impl JobRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Starting,
            percent: 0,
            eta: None,
            speed: String::new(),
            title: String::new(),
            file_path: None,
            error_message: None,
            claimed: false,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Apply an update. Returns false, leaving the record untouched, once the
    /// record is terminal.
    pub fn apply(&mut self, update: JobUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match update {
            JobUpdate::Downloading { percent, eta, speed } => {
                self.status = JobStatus::Downloading;
                // Percent never moves backwards, even across a second download pass.
                self.percent = self.percent.max(percent.min(100));
                self.eta = eta;
                self.speed = speed;
            }
            JobUpdate::PostProcessing => {
                self.status = JobStatus::PostProcessing;
                self.percent = 100;
                self.eta = None;
                self.speed.clear();
            }
            JobUpdate::Ready { title, file_path } => {
                self.status = JobStatus::Ready;
                self.percent = 100;
                self.eta = Some(0);
                self.speed.clear();
                self.title = title;
                self.file_path = Some(file_path);
                self.finished_at = Some(Utc::now());
            }
            JobUpdate::Failed { message } => {
                self.status = JobStatus::Error;
                self.eta = None;
                self.speed.clear();
                self.error_message = Some(message);
                self.finished_at = Some(Utc::now());
            }
        }
        true
    }

    /// Observable fields pushed to progress streams.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            detail: Some(SnapshotDetail {
                pct: self.percent,
                eta: self.eta,
                speed: self.speed.clone(),
                title: self.title.clone(),
            }),
        }
    }
}

/// Immutable view of a job at one point in time.
///
/// Unknown jobs render as just `{"status":"unknown"}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Snapshot {
    pub status: JobStatus,
    #[serde(flatten)]
    pub detail: Option<SnapshotDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SnapshotDetail {
    pub pct: u8,
    pub eta: Option<u64>,
    pub speed: String,
    pub title: String,
}

impl Snapshot {
    pub fn unknown() -> Self {
        Self {
            status: JobStatus::Unknown,
            detail: None,
        }
    }

    pub fn pct(&self) -> u8 {
        self.detail.as_ref().map(|d| d.pct).unwrap_or(0)
    }

    /// Serialize to the JSON payload of one stream message.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
