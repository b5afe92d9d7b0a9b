//! Queue snapshot persistence.
//!
//! The queue file is a JSON array of [`QueueRecord`]s, rewritten in full
//! after every status transition. Loading is tolerant: a missing or
//! corrupt file yields an empty queue, an unparsable record is skipped.
//! Persistence problems degrade durability, never queue operation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use renderq_models::{Job, QueueRecord};

use crate::error::QueueResult;

/// Reads and rewrites the on-disk queue snapshot.
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted pending set.
    pub fn load(&self) -> Vec<Job> {
        if !self.path.exists() {
            return Vec::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read queue file");
                return Vec::new();
            }
        };

        let records: Vec<QueueRecord> = match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to parse queue file");
                return Vec::new();
            }
        };

        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            let label = record.label.clone();
            match record.into_job() {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(label = %label, error = %e, "skipping unparsable queue record");
                }
            }
        }

        debug!(count = jobs.len(), "loaded queue snapshot");
        jobs
    }

    /// Rewrite the snapshot with every non-terminal job.
    ///
    /// Running jobs are written back as Pending so a crash mid-run leaves
    /// resumable work. The write goes to a temp file first and is renamed
    /// into place.
    pub fn save(&self, jobs: &[Job]) -> QueueResult<()> {
        let records = jobs
            .iter()
            .filter(|job| !job.is_terminal())
            .map(QueueRecord::from_job)
            .collect::<Result<Vec<_>, _>>()?;

        let json = serde_json::to_string_pretty(&records)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, &json)?;
        fs::rename(&temp, &self.path)?;

        debug!(count = records.len(), path = %self.path.display(), "saved queue snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderq_models::{JobStatus, Step, ToolCommand};

    fn store(dir: &tempfile::TempDir) -> QueueStore {
        QueueStore::new(dir.path().join("render_queue.json"))
    }

    fn job(label: &str, line: &str) -> Job {
        Job::new(label, vec![Step::run(ToolCommand::parse_line(line).unwrap())])
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir).load().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let jobs = vec![
            job("convert a", "ffmpeg -i a.mp4 a.mkv"),
            job("convert b", "ffmpeg -i \"b c.mp4\" b.mkv"),
        ];
        store.save(&jobs).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].label, "convert a");
        assert_eq!(loaded[1].label, "convert b");
        assert_eq!(loaded[0].steps, jobs[0].steps);
        assert_eq!(loaded[1].steps, jobs[1].steps);
        assert!(loaded.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn test_terminal_jobs_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut done = job("finished", "ffmpeg -i a.mp4 a.mkv");
        done.status = JobStatus::Done;
        let mut failed = job("failed", "ffmpeg -i b.mp4 b.mkv");
        failed.status = JobStatus::Error;
        let mut running = job("in flight", "ffmpeg -i c.mp4 c.mkv");
        running.status = JobStatus::Running;

        store.save(&[done, failed, running]).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, "in flight");
        // Resumable on restart.
        assert_eq!(loaded[0].status, JobStatus::Pending);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{not json[").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_bad_record_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"[
                {"label": "ok", "command": "ffmpeg -i a.mp4 a.mkv", "status": "Pending", "added_at": "10:00:00"},
                {"label": "broken", "command": "ffmpeg -i \"unterminated", "status": "Pending", "added_at": "10:00:01"}
            ]"#,
        )
        .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, "ok");
    }
}
