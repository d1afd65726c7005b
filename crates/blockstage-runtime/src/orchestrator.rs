//! Run orchestration
//!
//! One orchestrator call per run epoch: launch an engine task for every actor
//! that has a non-empty script, wait for all of them, then close the run.

use crate::engine::{RunEnding, RunOutcome, ScriptEngine};
use blockstage_core::{
    ActorId, ActorStore, PlaybackController, ScriptBook, StageConfig, StageError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// An engine task that did not produce an outcome
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("Engine for actor {actor} failed: {source}")]
    Engine {
        actor: ActorId,
        #[source]
        source: StageError,
    },

    #[error("Engine task for actor {actor} panicked")]
    Panicked { actor: ActorId },

    #[error("Engine task for actor {actor} was cancelled")]
    Cancelled { actor: ActorId },
}

impl TaskFailure {
    pub fn actor(&self) -> ActorId {
        match self {
            TaskFailure::Engine { actor, .. }
            | TaskFailure::Panicked { actor }
            | TaskFailure::Cancelled { actor } => *actor,
        }
    }
}

/// Everything one run epoch produced
#[derive(Debug)]
pub struct RunReport {
    pub epoch: u64,
    pub outcomes: Vec<RunOutcome>,
    pub failures: Vec<TaskFailure>,
    /// The run ended naturally and set playback back to Stopped
    pub finished: bool,
}

impl RunReport {
    pub fn launched(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    pub fn swapped(&self) -> bool {
        self.outcomes.iter().any(|o| o.ending == RunEnding::Swapped)
    }
}

/// Launches and awaits the engine tasks of one run
pub struct Orchestrator {
    store: ActorStore,
    scripts: ScriptBook,
    playback: PlaybackController,
    engine: ScriptEngine,
    config: Arc<StageConfig>,
}

impl Orchestrator {
    pub fn new(
        store: ActorStore,
        scripts: ScriptBook,
        playback: PlaybackController,
        engine: ScriptEngine,
        config: Arc<StageConfig>,
    ) -> Self {
        Self {
            store,
            scripts,
            playback,
            engine,
            config,
        }
    }

    /// Run the current epoch, if playback is running
    pub async fn start(&self) -> Option<RunReport> {
        let status = self.playback.status();
        if !status.is_running() {
            return None;
        }
        self.run_epoch(status.epoch).await
    }

    /// Run epoch `epoch`; does nothing unless playback is running in it
    pub async fn run_epoch(&self, epoch: u64) -> Option<RunReport> {
        let status = self.playback.status();
        if !status.is_running() || status.epoch != epoch {
            return None;
        }

        let snapshot = self.store.snapshot();
        let mut actors = Vec::with_capacity(snapshot.len());
        let mut handles = Vec::with_capacity(snapshot.len());

        for actor in &snapshot.actors {
            let Some(script) = self.scripts.get(&actor.id).await else {
                continue;
            };
            if script.is_empty() {
                continue;
            }

            let engine = self.engine.clone();
            let initial = actor.clone();
            let gate = self.playback.gate(epoch, self.config.pause_recheck);
            actors.push(actor.id);
            handles.push(tokio::spawn(async move {
                engine.run(script, initial, gate).await
            }));
        }
        info!(epoch, tasks = handles.len(), "Run started");

        let results = futures::future::join_all(handles).await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (actor, result) in actors.into_iter().zip(results) {
            match result {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(source)) => {
                    warn!(actor = %actor, error = %source, code = source.error_code(), "Engine task failed");
                    failures.push(TaskFailure::Engine { actor, source });
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(actor = %actor, "Engine task panicked");
                    failures.push(TaskFailure::Panicked { actor });
                }
                Err(_) => {
                    warn!(actor = %actor, "Engine task cancelled");
                    failures.push(TaskFailure::Cancelled { actor });
                }
            }
        }

        let finished = self.playback.finish(epoch);
        info!(
            epoch,
            completed = outcomes.len(),
            failed = failures.len(),
            finished,
            "Run ended"
        );

        Some(RunReport {
            epoch,
            outcomes,
            failures,
            finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityTracker;
    use crate::swap::SwapCoordinator;
    use blockstage_core::{Block, PlaybackState, Pose, Script};
    use std::time::Duration;

    struct Harness {
        store: ActorStore,
        scripts: ScriptBook,
        playback: PlaybackController,
        orchestrator: Arc<Orchestrator>,
    }

    fn harness() -> Harness {
        let config = Arc::new(StageConfig {
            repetitions: 1,
            ..Default::default()
        });
        let store = ActorStore::new(config.spawn);
        let scripts = ScriptBook::new();
        let playback = PlaybackController::new();
        let swaps = Arc::new(SwapCoordinator::new(
            scripts.clone(),
            playback.clone(),
            ActivityTracker::new(),
            &config,
        ));
        let engine = ScriptEngine::new(store.clone(), swaps, Arc::clone(&config));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            scripts.clone(),
            playback.clone(),
            engine,
            config,
        ));
        Harness {
            store,
            scripts,
            playback,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_does_nothing_unless_running() {
        let h = harness();
        let a = h.store.add_actor("Freeza", None).unwrap();
        h.scripts.assign(a, Script::new(vec![Block::move_steps(10.0)])).await;

        assert!(h.orchestrator.start().await.is_none());
        h.playback.start();
        h.playback.pause();
        assert!(h.orchestrator.start().await.is_none());
        assert_eq!(h.store.actor(&a).unwrap().pose, Pose::new(60.0, 60.0, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_actors_with_scripts_and_finishes() {
        let h = harness();
        let a = h.store.add_actor("Freeza", None).unwrap();
        let b = h.store.add_actor("Goku", None).unwrap();
        h.scripts.assign(a, Script::new(vec![Block::move_steps(20.0)])).await;
        h.scripts.assign(b, Script::new(vec![])).await;

        h.playback.start();
        let report = h.orchestrator.start().await.unwrap();

        assert_eq!(report.launched(), 1);
        assert!(report.finished);
        assert!(!report.swapped());
        assert_eq!(report.outcomes[0].final_state.id, a);
        assert_eq!(h.playback.state(), PlaybackState::Stopped);
        assert_eq!(h.store.actor(&a).unwrap().pose.x, 80.0);
        assert_eq!(h.store.actor(&b).unwrap().pose.x, 460.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_at_end_is_not_overwritten() {
        let h = harness();
        let a = h.store.add_actor("Freeza", None).unwrap();
        h.scripts.assign(a, Script::new(vec![Block::say_for_secs("Hi", 1.0)])).await;
        h.playback.start();

        let playback = h.playback.clone();
        let orchestrator = Arc::clone(&h.orchestrator);
        let run = tokio::spawn(async move { orchestrator.start().await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        playback.pause();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!run.is_finished());

        playback.reset();
        let report = run.await.unwrap().unwrap();
        assert!(!report.finished);
        assert_eq!(report.outcomes[0].ending, RunEnding::Halted);
        assert_eq!(h.playback.state(), PlaybackState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_does_not_abort_sibling() {
        let h = harness();
        let a = h.store.add_actor("Freeza", Some(Pose::new(0.0, 0.0, 0.0))).unwrap();
        let b = h.store.add_actor("Goku", Some(Pose::new(0.0, 200.0, 0.0))).unwrap();
        h.scripts.assign(a, Script::new(vec![Block::say_for_secs("Bye", 0.1)])).await;
        h.scripts.assign(b, Script::new(vec![Block::move_steps(100.0)])).await;
        h.playback.start();

        let store = h.store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            store.remove_actor(&a).unwrap();
        });

        let report = h.orchestrator.start().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].actor(), a);
        assert!(matches!(
            report.failures[0],
            TaskFailure::Engine {
                source: StageError::ActorNotFound(_),
                ..
            }
        ));
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].ending, RunEnding::Completed);
        assert_eq!(h.store.actor(&b).unwrap().pose.x, 100.0);
        assert!(report.finished);
    }
}
