//! Queue events.
//!
//! Everything a front-end needs to mirror queue state is broadcast here;
//! the queue itself never blocks on slow or absent listeners.

use renderq_models::{JobId, JobStatus};

/// Broadcast channel capacity. Lagging receivers drop old events.
pub(crate) const EVENT_CAPACITY: usize = 256;

/// One observable queue state change.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job was appended to the queue.
    Enqueued { job_id: JobId, label: String },
    /// A job left Pending and began executing.
    JobStarted { job_id: JobId },
    /// One step of the running job began.
    StepStarted {
        job_id: JobId,
        step: usize,
        total_steps: usize,
        command: String,
    },
    /// One line of tool output, merged across stdout/stderr.
    OutputLine { job_id: JobId, line: String },
    /// Percent progress of the running step, monotone within a step.
    Progress { job_id: JobId, percent: u8 },
    /// A job reached Done or Error.
    JobFinished { job_id: JobId, status: JobStatus },
    /// A pending or finished job was removed.
    Removed { job_id: JobId },
    /// No pending jobs remain.
    Drained,
}

impl QueueEvent {
    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            QueueEvent::Enqueued { job_id, .. }
            | QueueEvent::JobStarted { job_id }
            | QueueEvent::StepStarted { job_id, .. }
            | QueueEvent::OutputLine { job_id, .. }
            | QueueEvent::Progress { job_id, .. }
            | QueueEvent::JobFinished { job_id, .. }
            | QueueEvent::Removed { job_id } => Some(job_id),
            QueueEvent::Drained => None,
        }
    }
}
