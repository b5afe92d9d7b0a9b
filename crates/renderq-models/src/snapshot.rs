//! Durable queue snapshot records.
//!
//! The queue file is a JSON array of these records, one per non-terminal
//! job. The shape is fixed: `{label, command, status, added_at}` with
//! `command` holding the whole chain, one step per line. Running jobs are
//! written as `Pending` so a crash mid-run stays resumable; terminal jobs
//! are never written.

use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};
use crate::step::{CommandError, Step, StepAction};

/// Wall-clock format of the `added_at` field.
const ADDED_AT_FORMAT: &str = "%H:%M:%S";

/// One persisted queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub added_at: String,
}

impl QueueRecord {
    /// Project a job into its durable form.
    pub fn from_job(job: &Job) -> Result<Self, CommandError> {
        let mut lines = Vec::with_capacity(job.steps.len());
        for step in &job.steps {
            lines.push(step.render_line()?);
        }
        Ok(Self {
            label: job.label.clone(),
            command: lines.join("\n"),
            status: JobStatus::Pending.as_str().to_string(),
            added_at: job.created_at.format(ADDED_AT_FORMAT).to_string(),
        })
    }

    /// Reconstruct a pending job from a record.
    pub fn into_job(self) -> Result<Job, CommandError> {
        let mut steps = Vec::new();
        for line in self.command.lines() {
            if line.trim().is_empty() {
                continue;
            }
            steps.push(Step::parse_line(line)?);
        }
        if steps.is_empty() {
            return Err(CommandError::Empty);
        }

        let created_at = NaiveTime::parse_from_str(&self.added_at, ADDED_AT_FORMAT)
            .ok()
            .map(|t| Utc::now().date_naive().and_time(t).and_utc())
            .unwrap_or_else(Utc::now);

        let artifacts = detect_artifacts(&steps);
        let mut job = Job::new(self.label, steps).with_artifacts(artifacts);
        job.created_at = created_at;
        Ok(job)
    }
}

/// Recover the temp-artifact list for a resumed chain.
///
/// The artifact names are the fixed ones the canonical chains produce;
/// the explicit list on the original job does not survive the snapshot,
/// so cleanup falls back to spotting them in the command text (and the
/// implicit pass log behind `-pass`).
fn detect_artifacts(steps: &[Step]) -> Vec<PathBuf> {
    fn push_unique(artifacts: &mut Vec<PathBuf>, name: &str) {
        let p = Path::new(name);
        if !artifacts.iter().any(|a| a == p) {
            artifacts.push(p.to_path_buf());
        }
    }

    let mut artifacts: Vec<PathBuf> = Vec::new();
    for step in steps {
        if let StepAction::Run { command } = &step.action {
            for arg in &command.args {
                if arg.contains("palette.png") {
                    push_unique(&mut artifacts, "palette.png");
                }
                if arg.contains("transforms.trf") {
                    push_unique(&mut artifacts, "transforms.trf");
                }
                if arg == "-pass" {
                    push_unique(&mut artifacts, "ffmpeg2pass-0.log");
                    push_unique(&mut artifacts, "ffmpeg2pass-0.log.mbtree");
                }
            }
        }
    }

    artifacts
}
