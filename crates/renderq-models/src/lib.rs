//! Shared data models for the renderq queue.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, steps and tool commands
//! - Analysis facts scraped from tool output
//! - Derivation rules for data-dependent steps
//! - Cut-list (edit decision) documents
//! - Durable queue snapshot records

pub mod cutlist;
pub mod derive;
pub mod facts;
pub mod job;
pub mod snapshot;
pub mod step;
pub mod timecode;

// Re-export common types
pub use cutlist::{render_cut_list, CutListSpec};
pub use derive::{keep_segments, DeriveRule, SceneSplitRule, SilenceCutRule};
pub use facts::{AnalysisFacts, SilenceSpan};
pub use job::{Job, JobId, JobStatus};
pub use snapshot::QueueRecord;
pub use step::{CommandError, OutputKind, Step, StepAction, ToolCommand};
pub use timecode::{format_timecode, parse_timecode, TimecodeError};
