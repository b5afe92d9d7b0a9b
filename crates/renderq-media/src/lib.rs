//! External tool process supervision for renderq.
//!
//! Spawns one tool process per step, merges stdout/stderr into an
//! incremental line stream, parses progress and analysis tokens out of
//! it, and handles graceful-then-forced cancellation.

pub mod error;
pub mod probe;
pub mod progress;
pub mod runner;

pub use error::{MediaError, MediaResult};
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use progress::{parse_time_token, AnalysisCollector, ProgressTracker};
pub use runner::{RunResult, ToolRunner, DEFAULT_CANCEL_GRACE};
