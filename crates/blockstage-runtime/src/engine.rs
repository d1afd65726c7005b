//! Script execution engine
//!
//! Interprets one actor's script as an async task. The task works on a
//! private copy of the actor (taken when the run was launched) and writes
//! every visible change through to the [`ActorStore`]. Playback is consulted
//! through a [`PlaybackGate`] at every block boundary, every repetition
//! boundary and every motion sub-step.
//!
//! Motion (`move`, `goto_xy`) is split into sub-steps no longer than
//! [`StageConfig::substep_limit`]. Each sub-step writes the new position,
//! runs the collision check (hero mode with exactly two actors) and then
//! waits one frame, except after the final sub-step.

use crate::collision::collides;
use crate::swap::SwapCoordinator;
use blockstage_core::{
    Actor, ActorId, ActorStore, Flow, Instruction, MessageKind, PlaybackGate, Pose, Script,
    Speech, StageConfig, StageResult, normalize_degrees,
};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnding {
    /// Every repetition ran to the end
    Completed,
    /// Playback stopped (reset, freeze, or a newer run took over)
    Halted,
    /// This task initiated a script swap and abandoned its script
    Swapped,
}

/// Result of one engine task
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub final_state: Actor,
    pub ending: RunEnding,
    /// Fully executed repetitions
    pub repetitions: u32,
}

type Step = ControlFlow<RunEnding>;

/// Per-actor script interpreter
#[derive(Clone)]
pub struct ScriptEngine {
    store: ActorStore,
    swaps: Arc<SwapCoordinator>,
    config: Arc<StageConfig>,
}

impl ScriptEngine {
    pub fn new(store: ActorStore, swaps: Arc<SwapCoordinator>, config: Arc<StageConfig>) -> Self {
        Self {
            store,
            swaps,
            config,
        }
    }

    /// Run `script` for the actor described by `initial`
    ///
    /// # Errors
    ///
    /// Fails with `StageError::ActorNotFound` if the actor disappears from
    /// the store while the script is still writing to it.
    pub async fn run(
        &self,
        script: Script,
        initial: Actor,
        gate: PlaybackGate,
    ) -> StageResult<RunOutcome> {
        info!(
            actor = %initial.id,
            epoch = gate.epoch(),
            script = %script.summary(),
            "Running script"
        );
        let mut run = ActorRun {
            engine: self,
            id: initial.id,
            state: initial,
            gate,
            repetitions: 0,
        };
        let ending = run.execute(&script).await?;
        debug!(actor = %run.id, ending = ?ending, repetitions = run.repetitions, "Script finished");
        Ok(RunOutcome {
            final_state: run.state,
            ending,
            repetitions: run.repetitions,
        })
    }
}

struct ActorRun<'a> {
    engine: &'a ScriptEngine,
    id: ActorId,
    state: Actor,
    gate: PlaybackGate,
    repetitions: u32,
}

impl ActorRun<'_> {
    fn config(&self) -> &StageConfig {
        &self.engine.config
    }

    async fn checkpoint(&mut self) -> Step {
        match self.gate.checkpoint().await {
            Flow::Continue => ControlFlow::Continue(()),
            Flow::Halt => ControlFlow::Break(RunEnding::Halted),
        }
    }

    async fn execute(&mut self, script: &Script) -> StageResult<RunEnding> {
        let total = self.config().repetitions;

        for repetition in 0..total {
            if let ControlFlow::Break(ending) = self.checkpoint().await {
                return Ok(ending);
            }

            for block in script.blocks() {
                if let ControlFlow::Break(ending) = self.checkpoint().await {
                    return Ok(ending);
                }

                if let ControlFlow::Break(ending) = self.apply(block.decode()).await? {
                    return Ok(ending);
                }
                self.engine.store.set_pose(&self.id, self.state.pose)?;

                if block.action.is_turn() {
                    tokio::time::sleep(self.config().turn_pacing).await;
                }

                if let ControlFlow::Break(ending) = self.checkpoint().await {
                    return Ok(ending);
                }
            }

            self.repetitions += 1;
            if repetition + 1 < total {
                if let ControlFlow::Break(ending) = self.checkpoint().await {
                    return Ok(ending);
                }
                tokio::time::sleep(self.config().repetition_delay).await;
            }
        }

        Ok(RunEnding::Completed)
    }

    async fn apply(&mut self, instruction: Instruction) -> StageResult<Step> {
        match instruction {
            Instruction::Move { steps } => {
                if steps == 0.0 {
                    return Ok(ControlFlow::Continue(()));
                }
                let origin = self.state.pose;
                let heading = origin.direction.to_radians();
                let end = (
                    origin.x + steps * heading.cos(),
                    origin.y - steps * heading.sin(),
                );
                self.glide(origin, end, steps.abs()).await
            }
            Instruction::GotoXy { x, y } => {
                let origin = self.state.pose;
                let distance = (x - origin.x).hypot(y - origin.y);
                if distance == 0.0 {
                    return Ok(ControlFlow::Continue(()));
                }
                self.glide(origin, (x, y), distance).await
            }
            Instruction::TurnCw { degrees } => {
                self.state.pose.direction = normalize_degrees(self.state.pose.direction - degrees);
                Ok(ControlFlow::Continue(()))
            }
            Instruction::TurnCcw { degrees } => {
                self.state.pose.direction = normalize_degrees(self.state.pose.direction + degrees);
                Ok(ControlFlow::Continue(()))
            }
            Instruction::Say { text, seconds } => self.speak(text, MessageKind::Say, seconds).await,
            Instruction::Think { text, seconds } => {
                self.speak(text, MessageKind::Think, seconds).await
            }
            Instruction::Unknown(action) => {
                trace!(actor = %self.id, action = %action, "Skipping unknown block");
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    /// Sub-stepped straight-line motion from `origin` to `end`
    async fn glide(&mut self, origin: Pose, end: (f64, f64), distance: f64) -> StageResult<Step> {
        let limit = self.config().substep_limit();
        let frame = self.config().frame_interval;
        let mut travelled = 0.0;

        while travelled < distance {
            if let ControlFlow::Break(ending) = self.checkpoint().await {
                return Ok(ControlFlow::Break(ending));
            }

            let remaining = distance - travelled;
            if limit >= remaining {
                travelled = distance;
                self.state.pose.x = end.0;
                self.state.pose.y = end.1;
            } else {
                travelled += limit;
                let fraction = travelled / distance;
                self.state.pose.x = origin.x + (end.0 - origin.x) * fraction;
                self.state.pose.y = origin.y + (end.1 - origin.y) * fraction;
            }
            self.engine.store.set_pose(&self.id, self.state.pose)?;

            if let ControlFlow::Break(ending) = self.check_collision().await {
                return Ok(ControlFlow::Break(ending));
            }

            if travelled < distance {
                tokio::time::sleep(frame).await;
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn check_collision(&self) -> Step {
        let snapshot = self.engine.store.snapshot();
        if !snapshot.hero_enabled || snapshot.len() != 2 {
            return ControlFlow::Continue(());
        }
        let Some(other) = snapshot.other_than(&self.id) else {
            return ControlFlow::Continue(());
        };
        if !collides(&self.state.pose, &other.pose, self.config().collision_box) {
            return ControlFlow::Continue(());
        }

        debug!(actor = %self.id, other = %other.id, "Collision detected");
        if self.engine.swaps.on_collision(self.id, other.id).await {
            info!(actor = %self.id, "Swap initiated, abandoning script");
            return ControlFlow::Break(RunEnding::Swapped);
        }
        debug!(actor = %self.id, "Swap already in progress, continuing");
        ControlFlow::Continue(())
    }

    async fn speak(&mut self, text: String, kind: MessageKind, seconds: f64) -> StageResult<Step> {
        let speech = Speech { text, kind };
        self.engine.store.set_message(&self.id, Some(speech.clone()))?;
        self.state.message = Some(speech);

        let duration = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX);
        tokio::time::sleep(duration).await;

        if self.gate.is_halted() {
            return Ok(ControlFlow::Break(RunEnding::Halted));
        }
        if let ControlFlow::Break(ending) = self.checkpoint().await {
            return Ok(ControlFlow::Break(ending));
        }

        self.engine.store.set_message(&self.id, None)?;
        self.state.message = None;
        Ok(ControlFlow::Continue(()))
    }
}
