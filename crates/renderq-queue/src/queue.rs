//! The render queue.
//!
//! [`JobQueue`] is the sole owner of the job list and its snapshot. At
//! most one job runs at a time; pending jobs drain in insertion order on
//! a spawned task, and every state change is broadcast as a
//! [`QueueEvent`]. Callers never block on a running tool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use renderq_models::{Job, JobId, JobStatus, Step};

use crate::chain::ChainExecutor;
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::events::{QueueEvent, EVENT_CAPACITY};
use crate::persist::QueueStore;

/// Read-side projection of one queued job.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: JobId,
    pub label: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub steps: usize,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            label: job.label.clone(),
            status: job.status,
            created_at: job.created_at,
            steps: job.steps.len(),
        }
    }
}

struct RunningJob {
    id: JobId,
    cancel: watch::Sender<bool>,
}

struct QueueInner {
    jobs: Vec<Job>,
    store: QueueStore,
    running: Option<RunningJob>,
}

/// The render queue. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Mutex<QueueInner>>,
    events: broadcast::Sender<QueueEvent>,
    config: QueueConfig,
}

impl JobQueue {
    /// Open the queue, loading any persisted pending work.
    ///
    /// Loaded jobs stay Pending until [`JobQueue::start`] (or the
    /// auto-start on the next enqueue) kicks the drain off.
    pub fn open(config: QueueConfig) -> Self {
        let store = QueueStore::new(&config.queue_file);
        let jobs = store.load();
        if !jobs.is_empty() {
            info!(count = jobs.len(), "restored pending jobs from snapshot");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                jobs,
                store,
                running: None,
            })),
            events,
            config,
        }
    }

    /// Open with configuration from environment variables.
    pub fn from_env() -> Self {
        Self::open(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Subscribe to queue events. Lagging receivers lose old events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append a pending job built from a label and steps.
    pub async fn enqueue(&self, label: impl Into<String>, steps: Vec<Step>) -> QueueResult<JobId> {
        self.enqueue_job(Job::new(label, steps)).await
    }

    /// Append a pending job and start the drain if nothing is running.
    pub async fn enqueue_job(&self, job: Job) -> QueueResult<JobId> {
        if job.steps.is_empty() {
            return Err(QueueError::EmptyJob);
        }

        let job_id = job.id.clone();
        let label = job.label.clone();
        {
            let mut inner = self.inner.lock().await;
            inner.jobs.push(job);
            persist(&inner);
        }

        info!(job_id = %job_id, label = %label, "job enqueued");
        let _ = self.events.send(QueueEvent::Enqueued {
            job_id: job_id.clone(),
            label,
        });

        self.start().await;
        Ok(job_id)
    }

    /// Start the drain: begin the first pending job unless one is
    /// already running. Emits `Drained` when there is nothing to do.
    pub async fn start(&self) {
        let (job, cancel_rx) = {
            let mut inner = self.inner.lock().await;
            if inner.running.is_some() {
                return;
            }

            let Some(job) = inner.jobs.iter_mut().find(|j| j.status == JobStatus::Pending)
            else {
                drop(inner);
                let _ = self.events.send(QueueEvent::Drained);
                return;
            };

            job.status = JobStatus::Running;
            let job = job.clone();
            let (cancel_tx, cancel_rx) = watch::channel(false);
            inner.running = Some(RunningJob {
                id: job.id.clone(),
                cancel: cancel_tx,
            });
            persist(&inner);
            (job, cancel_rx)
        };

        info!(job_id = %job.id, label = %job.label, "job started");
        let _ = self.events.send(QueueEvent::JobStarted {
            job_id: job.id.clone(),
        });

        let queue = self.clone();
        tokio::spawn(async move {
            let mut executor = ChainExecutor::new(
                queue.events.clone(),
                cancel_rx,
                queue.config.cancel_grace,
            );
            let status = executor.run(&job).await;
            queue.finish(&job.id, status).await;
        });
    }

    /// Record a terminal status and continue the drain.
    ///
    /// Boxed because the future is recursive: `start` spawns a task that
    /// awaits `finish`, which awaits `start` again.
    fn finish<'a>(
        &'a self,
        job_id: &'a JobId,
        status: JobStatus,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut inner = self.inner.lock().await;
                if let Some(job) = inner.jobs.iter_mut().find(|j| &j.id == job_id) {
                    job.status = status;
                }
                inner.running = None;
                persist(&inner);
            }

            info!(job_id = %job_id, status = %status, "job finished");
            let _ = self.events.send(QueueEvent::JobFinished {
                job_id: job_id.clone(),
                status,
            });

            self.start().await;
        })
    }

    /// Ask the running job to stop. Returns the job that was signalled,
    /// `None` when nothing is running. Safe to call repeatedly; the job
    /// reports Error once its process confirms termination.
    pub async fn cancel_current(&self) -> Option<JobId> {
        let inner = self.inner.lock().await;
        let running = inner.running.as_ref()?;
        info!(job_id = %running.id, "cancelling running job");
        let _ = running.cancel.send(true);
        Some(running.id.clone())
    }

    /// Remove a job that is not currently running.
    pub async fn remove(&self, job_id: &JobId) -> QueueResult<()> {
        {
            let mut inner = self.inner.lock().await;
            let Some(pos) = inner.jobs.iter().position(|j| &j.id == job_id) else {
                return Err(QueueError::job_not_found(job_id));
            };
            if inner.jobs[pos].status == JobStatus::Running {
                return Err(QueueError::job_running(job_id));
            }
            inner.jobs.remove(pos);
            persist(&inner);
        }

        let _ = self.events.send(QueueEvent::Removed {
            job_id: job_id.clone(),
        });
        Ok(())
    }

    /// Drop finished jobs from the in-memory list. The snapshot never
    /// contained them, so nothing is rewritten.
    pub async fn clear_finished(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.jobs.len();
        inner.jobs.retain(|j| !j.is_terminal());
        before - inner.jobs.len()
    }

    /// Snapshot of every job, in queue order.
    pub async fn jobs(&self) -> Vec<JobView> {
        let inner = self.inner.lock().await;
        inner.jobs.iter().map(JobView::from).collect()
    }

    /// Drive the queue until no pending work remains.
    ///
    /// Returns `true` when every job that finished during the drain
    /// ended Done.
    pub async fn run_until_drained(&self) -> bool {
        let mut events = self.subscribe();
        let mut all_done = true;

        self.start().await;

        loop {
            match events.recv().await {
                Ok(QueueEvent::JobFinished { status, .. }) => {
                    if status != JobStatus::Done {
                        all_done = false;
                    }
                }
                Ok(QueueEvent::Drained) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        all_done
    }
}

fn persist(inner: &QueueInner) {
    if let Err(e) = inner.store.save(&inner.jobs) {
        warn!(error = %e, "failed to persist queue");
    }
}
