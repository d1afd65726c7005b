//! # Blockstage
//!
//! Block-based scripting for a stage of at most two actors. Each actor runs
//! its own script concurrently under a shared play/pause/stop control;
//! motion is sub-stepped and, with hero mode on, a collision between the two
//! actors swaps their scripts.
//!
//! This crate re-exports the workspace libraries:
//!
//! - [`model`]: actors, blocks, scripts, playback and the actor store
//! - [`runtime`]: engine, collision, swap coordinator, orchestrator and [`Stage`]

pub use blockstage_core as model;
pub use blockstage_runtime as runtime;

pub use blockstage_core::{
    Actor, ActorId, Block, BlockInput, MessageKind, PlaybackState, Pose, Script, StageConfig,
    StageError, StageResult, StageSnapshot,
};
pub use blockstage_runtime::{RunEnding, RunReport, Stage, SwapStats};
