//! # Blockstage Runtime
//!
//! Executes block scripts for the actors of a stage:
//!
//! - [`engine`] interprets one actor's script as an async task
//! - [`collision`] is the box overlap test used during motion
//! - [`swap`] exchanges two actors' scripts when they collide in hero mode
//! - [`orchestrator`] runs every actor's engine for one run epoch
//! - [`stage`] is the facade the host drives
//!
//! ```no_run
//! use blockstage_core::{Block, Script, StageConfig};
//! use blockstage_runtime::Stage;
//!
//! # async fn example() -> Result<(), blockstage_core::StageError> {
//! let stage = Stage::new(StageConfig::default())?;
//! let hero = stage.add_actor("Freeza").await?;
//! stage
//!     .set_script(&hero, Script::new(vec![Block::move_steps(100.0)]))
//!     .await?;
//! stage.play();
//! stage.settled().await;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod collision;
pub mod engine;
pub mod orchestrator;
pub mod stage;
pub mod swap;

pub use activity::{ActivityGuard, ActivityTracker};
pub use collision::collides;
pub use engine::{RunEnding, RunOutcome, ScriptEngine};
pub use orchestrator::{Orchestrator, RunReport, TaskFailure};
pub use stage::Stage;
pub use swap::{PairKey, SwapCoordinator, SwapLock, SwapRecord, SwapStats};
