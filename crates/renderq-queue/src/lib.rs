//! Sequential render queue for external media tools.
//!
//! This crate provides:
//! - FIFO job scheduling with one chain running at a time
//! - Chain execution as an explicit step state machine
//! - Durable queue snapshots that survive restarts
//! - Progress events via a broadcast channel
//! - Ready-made recipes for the canonical multi-step chains

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod persist;
pub mod queue;
pub mod recipes;

pub use chain::{ChainExecutor, ChainState};
pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use events::QueueEvent;
pub use persist::QueueStore;
pub use queue::{JobQueue, JobView};
pub use recipes::{
    palette_gif, scene_split, silence_cut, silence_cutlist, stabilize, two_pass_encode, Recipe,
    DEFAULT_GIF_FPS, DEFAULT_GIF_WIDTH, DEFAULT_MIN_SILENCE, DEFAULT_NOISE_DB,
    DEFAULT_SCENE_THRESHOLD,
};
