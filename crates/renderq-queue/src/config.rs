//! Queue configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Path of the persisted queue snapshot
    pub queue_file: PathBuf,
    /// How long a cancelled tool gets to quit gracefully before being killed
    pub cancel_grace: Duration,
    /// Default padding kept around silence boundaries, seconds
    pub silence_pad: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_file: PathBuf::from("render_queue.json"),
            cancel_grace: Duration::from_millis(1000),
            silence_pad: 0.1,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue_file: std::env::var("QUEUE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("render_queue.json")),
            cancel_grace: Duration::from_millis(
                std::env::var("CANCEL_GRACE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            silence_pad: std::env::var("SILENCE_PAD_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
        }
    }

    /// Use a different snapshot path.
    pub fn with_queue_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.queue_file = path.into();
        self
    }
}
