//! Job definitions for the render queue.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::step::Step;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status in the queue.
///
/// Serialized capitalized; the snapshot file stores these words verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobStatus {
    /// Waiting in the queue.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Every step exited zero.
    Done,
    /// A step failed, was cancelled, or could not start.
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of user-requested work: an ordered chain of steps.
///
/// Owned exclusively by the queue. Steps are immutable once the job is
/// admitted; only `status` changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub label: String,
    pub steps: Vec<Step>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Intermediate files (palette, transforms, pass logs) removed when
    /// the job reaches a terminal state.
    #[serde(default)]
    pub temp_artifacts: Vec<PathBuf>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(label: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: JobId::new(),
            label: label.into(),
            steps,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            temp_artifacts: Vec::new(),
        }
    }

    /// Attach temp artifacts to clean up at terminal state.
    pub fn with_artifacts<I, P>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.temp_artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::ToolCommand;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(
            "extract",
            vec![Step::run(ToolCommand::parse_line("tool -i in.mp4 out.mp3").unwrap())],
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_terminal());
        assert!(!job.id.as_str().is_empty());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Pending.as_str(), "Pending");
        assert_eq!(JobStatus::Error.to_string(), "Error");
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
