//! Queue error types.

use thiserror::Error;

use renderq_media::MediaError;
use renderq_models::{CommandError, JobId};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job is running: {0}")]
    JobRunning(JobId),

    #[error("job has no steps")]
    EmptyJob,

    #[error("bad command: {0}")]
    BadCommand(#[from] CommandError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn job_not_found(id: &JobId) -> Self {
        Self::JobNotFound(id.clone())
    }

    pub fn job_running(id: &JobId) -> Self {
        Self::JobRunning(id.clone())
    }
}
