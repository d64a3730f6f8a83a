use thiserror::Error;
use tokio::task::JoinError;

/// Failure kinds surfaced by the document downloader.
///
/// Callers branch on the kind (e.g. the orchestrator reports them all as
/// per-source failures, tests assert the exact variant), so these stay a
/// dedicated enum instead of being flattened into strings.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("download timed out after {0}s")]
    Timeout(u64),
    #[error("origin returned status {0}")]
    HttpStatus(u16),
    #[error("download exceeded the {0} byte limit")]
    TooLarge(u64),
    #[error("unexpected content type: {0}")]
    BadContentType(String),
    #[error("transport error: {0}")]
    Transport(String),
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Admission rejected: {0}")]
    AdmissionRejected(String),
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Embedding error: {0}")]
    Embed(String),
    #[error("Persist error: {0}")]
    Persist(String),
    #[error("Status update error: {0}")]
    StatusUpdate(String),
    #[error("Worker pool is stopping")]
    PoolStopping,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}
