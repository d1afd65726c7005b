//! # Blockstage Core
//!
//! Data model and shared state for the blockstage scripting runtime: actors
//! and their snapshots, the block instruction set, scripts, the playback
//! controller and the actor state store.
//!
//! The runtime itself (engine, collision handling, orchestration) lives in
//! `blockstage-runtime`.

pub mod block;
pub mod config;
pub mod error;
pub mod playback;
pub mod script;
pub mod store;
pub mod types;

pub use block::{Action, Block, BlockInput, InputKind, Instruction};
pub use config::{ConfigError, SpawnLayout, StageConfig};
pub use error::{StageError, StageResult};
pub use playback::{Flow, FreezeToken, PlaybackController, PlaybackGate, PlaybackState, PlaybackStatus};
pub use script::{Exchange, Script, ScriptBook};
pub use store::{ActorStore, MAX_ACTORS, StageSnapshot};
pub use types::{Actor, ActorId, MessageKind, Pose, Speech, normalize_degrees};
