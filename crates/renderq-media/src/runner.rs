//! External tool process supervision.
//!
//! One [`ToolRunner`] invocation spawns one child process, merges its
//! stdout and stderr into a single ordered line stream delivered while
//! the process runs, and resolves cancellation with a graceful quit
//! keystroke followed by a forced kill after a grace period.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use renderq_models::ToolCommand;

use crate::error::{MediaError, MediaResult};

/// How long a cancelled process gets to quit on its own before being
/// killed.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(1000);

/// Keystroke FFmpeg-family tools treat as a graceful quit request.
const QUIT_KEYSTROKE: &[u8] = b"q";

/// Outcome of one completed (or cancelled) tool run.
///
/// A non-zero exit lands here as data; only failures to locate or start
/// the tool surface as [`MediaError`].
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Exit code, `None` when the process died to a signal.
    pub exit_code: Option<i32>,
    /// The merged output, one line per `\n`.
    pub output: String,
    /// Wall time from spawn to exit.
    pub duration: Duration,
    /// Whether cancellation was requested during the run.
    pub cancelled: bool,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.cancelled
    }
}

/// Runs one external command with merged output streaming.
pub struct ToolRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    cancel_grace: Duration,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Set the cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set the grace period between the quit request and the kill.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Run the command, delivering each output line as it arrives.
    pub async fn run<F>(&self, cmd: &ToolCommand, mut on_line: F) -> MediaResult<RunResult>
    where
        F: FnMut(&str) + Send,
    {
        let program =
            which::which(&cmd.program).map_err(|_| MediaError::tool_not_found(&cmd.program))?;
        debug!(program = %cmd.program, "running: {}", cmd);

        let started = Instant::now();
        let mut child = Command::new(program)
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::spawn_failed(&cmd.program, e))?;

        let stdout = child.stdout.take().expect("stdout not captured");
        let stderr = child.stderr.take().expect("stderr not captured");

        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        let stdout_task = tokio::spawn(read_lines(stdout, line_tx.clone()));
        let stderr_task = tokio::spawn(read_lines(stderr, line_tx));

        let mut cancel_rx = self.cancel_rx.clone();
        let mut cancelled = false;
        let mut kill_deadline: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;
        let mut output = String::new();

        // Drain the merged stream until both pipes close (the process has
        // exited or is about to), reacting to the cancel flag as we go.
        loop {
            tokio::select! {
                maybe_line = line_rx.recv() => {
                    match maybe_line {
                        Some(line) => {
                            trace!(target: "renderq_media::tool", "{line}");
                            on_line(&line);
                            output.push_str(&line);
                            output.push('\n');
                        }
                        None => break,
                    }
                }
                _ = cancel_flagged(cancel_rx.as_mut()), if !cancelled => {
                    cancelled = true;
                    info!(program = %cmd.program, "cancelling, sending quit keystroke");
                    if let Some(stdin) = child.stdin.as_mut() {
                        let _ = stdin.write_all(QUIT_KEYSTROKE).await;
                        let _ = stdin.flush().await;
                    }
                    kill_deadline = Some(Box::pin(tokio::time::sleep(self.cancel_grace)));
                }
                _ = expired(kill_deadline.as_mut()) => {
                    warn!(
                        program = %cmd.program,
                        grace_ms = self.cancel_grace.as_millis() as u64,
                        "grace period expired, killing process"
                    );
                    kill_process(&mut child).await;
                    kill_deadline = None;
                }
            }
        }

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let result = RunResult {
            exit_code: status.code(),
            output,
            duration: started.elapsed(),
            cancelled,
        };
        debug!(
            program = %cmd.program,
            exit_code = ?result.exit_code,
            cancelled = result.cancelled,
            "tool exited"
        );
        Ok(result)
    }
}

/// Resolve when the cancel flag flips true; pend forever otherwise.
async fn cancel_flagged(rx: Option<&mut watch::Receiver<bool>>) {
    match rx {
        Some(rx) => loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone with the flag still false: no cancel can
                // ever arrive.
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

/// Resolve when the armed kill deadline passes; pend while unarmed.
async fn expired(deadline: Option<&mut std::pin::Pin<Box<tokio::time::Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn kill_process(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("failed to kill process: {e}");
    }
}

/// Forward lines from one pipe into the merged stream.
///
/// FFmpeg rewrites its status line with bare carriage returns, so CR, LF
/// and CRLF all terminate a line here.
async fn read_lines<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for &byte in &chunk[..n] {
                    if byte == b'\n' || byte == b'\r' {
                        if !pending.is_empty() {
                            let line = String::from_utf8_lossy(&pending).into_owned();
                            pending.clear();
                            if tx.send(line).await.is_err() {
                                return;
                            }
                        }
                    } else {
                        pending.push(byte);
                    }
                }
            }
            Err(_) => break,
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", ["-c", script])
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_run_merges_both_streams() {
        let runner = ToolRunner::new();
        let mut lines = Vec::new();
        let result = runner
            .run(&sh("echo to-stdout; echo to-stderr 1>&2"), |line| {
                lines.push(line.to_string())
            })
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.cancelled);
        assert!(lines.contains(&"to-stdout".to_string()));
        assert!(lines.contains(&"to-stderr".to_string()));
        assert!(result.output.contains("to-stdout"));
        assert!(result.output.contains("to-stderr"));
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_nonzero_exit_is_not_an_error() {
        let runner = ToolRunner::new();
        let result = runner.run(&sh("exit 3"), |_| {}).await.unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_before_spawning() {
        let runner = ToolRunner::new();
        let cmd = ToolCommand::new("renderq-no-such-tool-a4b1", Vec::<String>::new());
        let err = runner.run(&cmd, |_| {}).await.unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_carriage_return_rewrites_are_separate_lines() {
        let runner = ToolRunner::new();
        let mut lines = Vec::new();
        let result = runner
            .run(&sh(r#"printf 'time=00:00:01.00\rtime=00:00:02.00\rdone\n'"#), |line| {
                lines.push(line.to_string())
            })
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(
            lines,
            vec!["time=00:00:01.00", "time=00:00:02.00", "done"]
        );
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_cancel_escalates_to_kill() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runner = ToolRunner::new()
            .with_cancel(cancel_rx)
            .with_cancel_grace(Duration::from_millis(200));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        let started = std::time::Instant::now();
        // Ignores stdin entirely, so only the kill can end it.
        let result = runner.run(&sh("sleep 30"), |_| {}).await.unwrap();

        assert!(result.cancelled);
        assert!(!result.success());
        assert_eq!(result.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    #[cfg_attr(not(unix), ignore = "uses sh")]
    async fn test_cancel_graceful_quit_avoids_kill() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runner = ToolRunner::new()
            .with_cancel(cancel_rx)
            .with_cancel_grace(Duration::from_secs(30));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        // Exits zero as soon as one byte arrives on stdin.
        let result = runner
            .run(&sh("dd bs=1 count=1 >/dev/null 2>&1; exit 0"), |_| {})
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.exit_code, Some(0));
        // Cancelled runs never count as successful, even on exit 0.
        assert!(!result.success());
    }
}
