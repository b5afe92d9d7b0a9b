//! Chain execution.
//!
//! A job's steps run strictly in order, driven by an explicit state
//! machine. Analysis output collected by one step feeds the dependent
//! steps after it; the first failure ends the chain.

use std::path::Path;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use renderq_media::{probe_duration, AnalysisCollector, ProgressTracker, ToolRunner};
use renderq_models::{
    keep_segments, render_cut_list, AnalysisFacts, CutListSpec, Job, JobStatus, OutputKind, Step,
    StepAction, ToolCommand,
};

use crate::events::QueueEvent;

/// Execution state of a job's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    NotStarted,
    StepRunning(usize),
    Done,
    Error,
}

enum StepOutcome {
    Succeeded,
    Failed,
}

/// Runs one job's steps in order, emitting queue events as it goes.
pub struct ChainExecutor {
    events: broadcast::Sender<QueueEvent>,
    cancel_rx: watch::Receiver<bool>,
    cancel_grace: Duration,
}

impl ChainExecutor {
    pub fn new(
        events: broadcast::Sender<QueueEvent>,
        cancel_rx: watch::Receiver<bool>,
        cancel_grace: Duration,
    ) -> Self {
        Self {
            events,
            cancel_rx,
            cancel_grace,
        }
    }

    /// Run the whole chain and return the job's terminal status.
    ///
    /// Temp artifacts are removed on the way out, success and failure
    /// alike.
    pub async fn run(&mut self, job: &Job) -> JobStatus {
        let total = self.probe_total(job).await;
        let mut facts = AnalysisFacts::default();
        let mut state = ChainState::NotStarted;

        let status = loop {
            state = match state {
                ChainState::NotStarted => {
                    if job.steps.is_empty() {
                        ChainState::Done
                    } else {
                        ChainState::StepRunning(0)
                    }
                }
                ChainState::StepRunning(index) => {
                    let step = &job.steps[index];
                    let _ = self.events.send(QueueEvent::StepStarted {
                        job_id: job.id.clone(),
                        step: index,
                        total_steps: job.steps.len(),
                        command: describe_step(step),
                    });

                    match self.run_step(job, step, total, &mut facts).await {
                        StepOutcome::Succeeded if index + 1 == job.steps.len() => ChainState::Done,
                        StepOutcome::Succeeded => ChainState::StepRunning(index + 1),
                        StepOutcome::Failed => ChainState::Error,
                    }
                }
                ChainState::Done => break JobStatus::Done,
                ChainState::Error => break JobStatus::Error,
            };
        };

        self.cleanup_artifacts(job).await;
        status
    }

    /// Best-effort duration probe of the chain's input, to arm percent
    /// reporting. Failure just disables percentages.
    async fn probe_total(&self, job: &Job) -> Option<f64> {
        let input = chain_input(job)?;
        match probe_duration(input).await {
            Ok(d) if d > 0.0 => Some(d),
            Ok(_) => None,
            Err(e) => {
                debug!(job_id = %job.id, input, error = %e, "duration probe failed");
                None
            }
        }
    }

    async fn run_step(
        &self,
        job: &Job,
        step: &Step,
        total: Option<f64>,
        facts: &mut AnalysisFacts,
    ) -> StepOutcome {
        match &step.action {
            StepAction::Run { command } => {
                self.run_command(job, command, step.collect, total, facts)
                    .await
            }
            StepAction::Derive { rule } => match rule.materialize(facts, total) {
                Some(command) => {
                    self.run_command(job, &command, step.collect, total, facts)
                        .await
                }
                None => {
                    warn!(job_id = %job.id, rule = rule.name(), "nothing to derive, step skipped");
                    StepOutcome::Succeeded
                }
            },
            StepAction::WriteCutList { spec } => self.write_cut_list(job, spec, total, facts).await,
        }
    }

    async fn run_command(
        &self,
        job: &Job,
        command: &ToolCommand,
        collect: OutputKind,
        total: Option<f64>,
        facts: &mut AnalysisFacts,
    ) -> StepOutcome {
        let runner = ToolRunner::new()
            .with_cancel(self.cancel_rx.clone())
            .with_cancel_grace(self.cancel_grace);

        let mut tracker = ProgressTracker::new(total);
        let mut collector = AnalysisCollector::new();
        let events = &self.events;
        let job_id = &job.id;

        let result = runner
            .run(command, |line| {
                match collect {
                    OutputKind::Progress => {
                        if let Some(percent) = tracker.observe(line) {
                            let _ = events.send(QueueEvent::Progress {
                                job_id: job_id.clone(),
                                percent,
                            });
                        }
                    }
                    OutputKind::Analysis => collector.observe(line),
                }
                let _ = events.send(QueueEvent::OutputLine {
                    job_id: job_id.clone(),
                    line: line.to_string(),
                });
            })
            .await;

        match result {
            Ok(run) => {
                if run.cancelled {
                    warn!(job_id = %job.id, "step cancelled");
                    return StepOutcome::Failed;
                }
                if run.exit_code != Some(0) {
                    warn!(job_id = %job.id, exit_code = ?run.exit_code, "tool exited with failure");
                    return StepOutcome::Failed;
                }
                if collect == OutputKind::Analysis {
                    *facts = collector.into_facts();
                    debug!(
                        job_id = %job.id,
                        silences = facts.silences.len(),
                        scenes = facts.scene_times.len(),
                        "collected analysis facts"
                    );
                }
                StepOutcome::Succeeded
            }
            Err(e) => {
                error!(job_id = %job.id, program = %command.program, error = %e, "failed to run tool");
                StepOutcome::Failed
            }
        }
    }

    async fn write_cut_list(
        &self,
        job: &Job,
        spec: &CutListSpec,
        total: Option<f64>,
        facts: &AnalysisFacts,
    ) -> StepOutcome {
        // Without a probed duration the last silence end bounds the
        // document; everything observed is still covered.
        let total = total.unwrap_or_else(|| facts.silences.last().map(|s| s.end).unwrap_or(0.0));
        let keeps = keep_segments(&facts.silences, total, spec.pad);
        if keeps.is_empty() {
            warn!(job_id = %job.id, "no loud segments found, nothing to write");
            return StepOutcome::Succeeded;
        }
        let xml = render_cut_list(Path::new(&spec.input), total, &keeps);
        let out = spec.output_path();

        match tokio::fs::write(&out, xml).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    path = %out.display(),
                    segments = keeps.len(),
                    "wrote cut list"
                );
                StepOutcome::Succeeded
            }
            Err(e) => {
                error!(job_id = %job.id, path = %out.display(), error = %e, "failed to write cut list");
                StepOutcome::Failed
            }
        }
    }

    async fn cleanup_artifacts(&self, job: &Job) {
        for path in &job.temp_artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(job_id = %job.id, path = %path.display(), "removed temp artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(job_id = %job.id, path = %path.display(), error = %e, "failed to remove temp artifact");
                }
            }
        }
    }
}

/// The input file the chain works on: the first `-i` argument of any
/// plain command step.
fn chain_input(job: &Job) -> Option<&str> {
    job.steps.iter().find_map(|step| match &step.action {
        StepAction::Run { command } => command.input_path(),
        _ => None,
    })
}

fn describe_step(step: &Step) -> String {
    match &step.action {
        StepAction::Run { command } => command.to_line(),
        StepAction::Derive { rule } => format!("derive: {}", rule.name()),
        StepAction::WriteCutList { spec } => {
            format!("write cut list: {}", spec.output_path().display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderq_models::derive::{DeriveRule, SceneSplitRule};

    use crate::events::EVENT_CAPACITY;

    fn executor() -> (
        ChainExecutor,
        broadcast::Receiver<QueueEvent>,
        watch::Sender<bool>,
    ) {
        let (events, rx) = broadcast::channel(EVENT_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let exec = ChainExecutor::new(events, cancel_rx, Duration::from_millis(200));
        (exec, rx, cancel_tx)
    }

    fn sh(script: &str) -> Step {
        Step::run(ToolCommand::new("sh", ["-c", script]))
    }

    fn drain(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_steps_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");

        let job = Job::new(
            "ordered",
            vec![
                sh(&format!("touch {}", a.display())),
                // Fails unless the first step already ran.
                sh(&format!("test -f {} && touch {}", a.display(), b.display())),
            ],
        );

        let (mut exec, mut rx, _cancel) = executor();
        let status = exec.run(&job).await;

        assert_eq!(status, JobStatus::Done);
        assert!(a.exists());
        assert!(b.exists());

        let started: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                QueueEvent::StepStarted { step, .. } => Some(step),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1]);
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_failing_step_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let never = dir.path().join("never");

        let job = Job::new(
            "fails in the middle",
            vec![
                sh("true"),
                sh("exit 3"),
                sh(&format!("touch {}", never.display())),
            ],
        );

        let (mut exec, _rx, _cancel) = executor();
        let status = exec.run(&job).await;

        assert_eq!(status, JobStatus::Error);
        assert!(!never.exists());
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_derive_with_no_facts_is_trivially_done() {
        // Analysis that finds no scene markers leaves the split step with
        // nothing to do; the chain still ends Done.
        let job = Job::new(
            "no scenes",
            vec![
                Step::analyze(ToolCommand::new("sh", ["-c", "echo frame counting output"])),
                Step::derive(DeriveRule::SceneSplit(SceneSplitRule {
                    input: "in.mp4".into(),
                    out_pattern: "scene_%03d.mp4".into(),
                })),
            ],
        );

        let (mut exec, _rx, _cancel) = executor();
        assert_eq!(exec.run(&job).await, JobStatus::Done);
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_silence_analysis_feeds_cut_list() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.mp4");
        let out = dir.path().join("list.xml");

        let job = Job::new(
            "cut list",
            vec![
                Step::analyze(ToolCommand::new(
                    "sh",
                    ["-c", "echo 'silence_start: 2.0'; echo 'silence_end: 5.0'"],
                )),
                Step::write_cut_list(
                    CutListSpec::new(input.to_string_lossy(), 0.1)
                        .with_output(out.to_string_lossy()),
                ),
            ],
        );

        let (mut exec, _rx, _cancel) = executor();
        assert_eq!(exec.run(&job).await, JobStatus::Done);

        let xml = std::fs::read_to_string(&out).unwrap();
        // No probed duration: the last silence end bounds the document,
        // leaving the head segment and the padded tail.
        assert!(xml.contains(r#"<clipitem id="clip-0">"#));
        assert!(xml.contains(r#"<clipitem id="clip-1">"#));
        assert!(xml.contains("<name>talk.mp4 Cut</name>"));
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_cancel_marks_chain_error() {
        let job = Job::new("long running", vec![sh("sleep 30")]);
        let (mut exec, _rx, cancel) = executor();

        let started = std::time::Instant::now();
        let run = tokio::spawn(async move { exec.run(&job).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.send(true).unwrap();

        let status = run.await.unwrap();
        assert_eq!(status, JobStatus::Error);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_artifacts_removed_on_both_paths() {
        let dir = tempfile::tempdir().unwrap();

        let leftover = dir.path().join("palette.png");
        std::fs::write(&leftover, b"png").unwrap();
        let job = Job::new("succeeds", vec![sh("true")]).with_artifacts([leftover.clone()]);
        let (mut exec, _rx, _cancel) = executor();
        assert_eq!(exec.run(&job).await, JobStatus::Done);
        assert!(!leftover.exists());

        let leftover = dir.path().join("transforms.trf");
        std::fs::write(&leftover, b"trf").unwrap();
        let job = Job::new("fails", vec![sh("exit 1")]).with_artifacts([leftover.clone()]);
        let (mut exec, _rx, _cancel) = executor();
        assert_eq!(exec.run(&job).await, JobStatus::Error);
        assert!(!leftover.exists());
    }
}
