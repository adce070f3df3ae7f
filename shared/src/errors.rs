/// Unified error types for ytm4a.
use thiserror::Error;

/// Top-level error type for ytm4a.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Rejected input, shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} already exists")]
    DuplicateJob(String),

    #[error("Cleanup error: {0}")]
    Cleanup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Faults raised while a fetch engine runs a job.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch engine not available: {0}")]
    EngineMissing(String),

    #[error("Failed to spawn fetch engine: {0}")]
    SpawnFailed(String),

    #[error("Failed to read fetch engine output: {0}")]
    ReadFailed(String),

    /// Message reported by the engine itself, e.g. "network timeout".
    #[error("{0}")]
    Engine(String),

    #[error("Fetch engine exited with code {0}")]
    Exited(i32),

    #[error("Fetch engine crashed: {0}")]
    Crashed(String),

    #[error("Fetch engine finished without reporting a result")]
    MissingResult,

    #[error("Artifact missing at {0}")]
    ArtifactMissing(String),

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults raised while turning a raw progress event into a job update.
#[derive(Debug, Error, PartialEq)]
pub enum ProgressError {
    #[error("downloaded byte count {0} is too large to compute a percentage")]
    Overflow(u64),

    #[error("invalid eta: {0}")]
    InvalidEta(f64),

    #[error("invalid speed: {0}")]
    InvalidSpeed(f64),
}

/// Result type alias for ytm4a operations.
pub type RelayResult<T> = Result<T, RelayError>;
