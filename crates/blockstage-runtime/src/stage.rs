//! Stage facade
//!
//! [`Stage`] wires the shared cells, the swap coordinator and the
//! orchestrator together and exposes the user controls: actor management,
//! script assignment, play/pause/reset and the hero toggle.
//!
//! A background driver watches the playback cell and launches the
//! orchestrator exactly once for every new run epoch, whether it was opened
//! by [`Stage::play`], [`Stage::toggle`] or a swap resume.

use crate::activity::ActivityTracker;
use crate::engine::ScriptEngine;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::swap::{PairKey, SwapCoordinator, SwapRecord, SwapStats};
use blockstage_core::{
    Actor, ActorId, ActorStore, PlaybackController, PlaybackState, PlaybackStatus, Pose, Script,
    ScriptBook, StageConfig, StageError, StageResult, StageSnapshot,
};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A stage with up to two actors and their scripts
///
/// Must be created inside a Tokio runtime.
pub struct Stage {
    config: Arc<StageConfig>,
    store: ActorStore,
    scripts: ScriptBook,
    playback: PlaybackController,
    activity: ActivityTracker,
    swaps: Arc<SwapCoordinator>,
    reports: Arc<RwLock<Vec<RunReport>>>,
    driver: JoinHandle<()>,
}

impl Stage {
    /// Create a stage and start its run driver
    ///
    /// # Errors
    ///
    /// Returns `StageError::InvalidConfig` if `config` fails validation.
    pub fn new(config: StageConfig) -> StageResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let store = ActorStore::new(config.spawn);
        let scripts = ScriptBook::new();
        let playback = PlaybackController::new();
        let activity = ActivityTracker::new();
        let swaps = Arc::new(SwapCoordinator::new(
            scripts.clone(),
            playback.clone(),
            activity.clone(),
            &config,
        ));
        let engine = ScriptEngine::new(store.clone(), Arc::clone(&swaps), Arc::clone(&config));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            scripts.clone(),
            playback.clone(),
            engine,
            Arc::clone(&config),
        ));
        let reports = Arc::new(RwLock::new(Vec::new()));

        let driver = tokio::spawn(drive(
            playback.subscribe(),
            orchestrator,
            activity.clone(),
            Arc::clone(&reports),
        ));

        Ok(Self {
            config,
            store,
            scripts,
            playback,
            activity,
            swaps,
            reports,
            driver,
        })
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Add an actor at the next spawn slot
    pub async fn add_actor(&self, name: &str) -> StageResult<ActorId> {
        self.add_actor_at(name, None).await
    }

    /// Add an actor, optionally at an explicit initial pose
    pub async fn add_actor_at(&self, name: &str, pose: Option<Pose>) -> StageResult<ActorId> {
        let id = self.store.add_actor(name, pose)?;
        self.scripts.assign(id, Script::default()).await;
        info!(actor = %id, name, "Actor added");
        Ok(id)
    }

    /// Remove an actor, its script and its initial pose
    pub async fn remove_actor(&self, id: &ActorId) -> StageResult<Actor> {
        let actor = self.store.remove_actor(id)?;
        self.scripts.remove(id).await;
        info!(actor = %id, name = %actor.name, "Actor removed");
        Ok(actor)
    }

    /// Drag an actor to `(x, y)`
    pub fn place_actor(&self, id: &ActorId, x: f64, y: f64) -> StageResult<()> {
        self.store.place_actor(id, x, y)?;
        Ok(())
    }

    /// Replace an actor's script
    pub async fn set_script(&self, id: &ActorId, script: Script) -> StageResult<()> {
        if self.store.actor(id).is_none() {
            return Err(StageError::ActorNotFound(*id));
        }
        debug!(actor = %id, script = %script.summary(), "Script assigned");
        self.scripts.assign(*id, script).await;
        Ok(())
    }

    pub async fn script(&self, id: &ActorId) -> Option<Script> {
        self.scripts.get(id).await
    }

    /// Start a run; returns false if playback was not stopped
    pub fn play(&self) -> bool {
        self.playback.start()
    }

    pub fn pause(&self) -> bool {
        self.playback.pause()
    }

    pub fn resume(&self) -> bool {
        self.playback.resume()
    }

    /// Start when stopped, otherwise flip between running and paused
    pub fn toggle(&self) -> PlaybackState {
        self.playback.toggle()
    }

    /// Stop, restore every actor's initial pose, clear bubbles, disable hero mode
    pub fn reset(&self) {
        self.playback.reset();
        self.store.reset();
        info!("Stage reset");
    }

    pub fn set_hero(&self, enabled: bool) {
        self.store.set_hero_enabled(enabled);
        info!(enabled, "Hero mode toggled");
    }

    pub fn hero_enabled(&self) -> bool {
        self.store.hero_enabled()
    }

    pub fn playback(&self) -> PlaybackStatus {
        self.playback.status()
    }

    pub fn snapshot(&self) -> Arc<StageSnapshot> {
        self.store.snapshot()
    }

    pub fn actor(&self, id: &ActorId) -> Option<Actor> {
        self.store.actor(id)
    }

    /// Render feed: every published stage snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<StageSnapshot>> {
        self.store.subscribe()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackStatus> {
        self.playback.subscribe()
    }

    pub async fn swap_stats(&self) -> SwapStats {
        self.swaps.stats().await
    }

    pub async fn swap_history(&self) -> Vec<SwapRecord> {
        self.swaps.history().await
    }

    pub async fn locked_pair(&self) -> Option<PairKey> {
        self.swaps.locked_pair().await
    }

    /// Number of runs that have ended
    pub async fn runs_completed(&self) -> usize {
        self.reports.read().await.len()
    }

    /// Take the reports of every run that ended so far
    pub async fn take_reports(&self) -> Vec<RunReport> {
        std::mem::take(&mut *self.reports.write().await)
    }

    /// Wait until playback is stopped and nothing is pending
    ///
    /// Pending work covers running engine tasks and scheduled swap
    /// continuations, so this also waits out a swap's resume and lock hold.
    pub async fn settled(&self) {
        let mut playback = self.playback.subscribe();
        let mut activity = self.activity.subscribe();
        loop {
            let stopped = playback.borrow_and_update().is_stopped();
            let idle = *activity.borrow_and_update() == 0;
            if stopped && idle {
                return;
            }
            tokio::select! {
                _ = playback.changed() => {}
                _ = activity.changed() => {}
            }
        }
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        // halts running engines and voids any pending swap resume
        self.playback.reset();
        self.driver.abort();
    }
}

/// Launch the orchestrator once per run epoch
async fn drive(
    mut playback: watch::Receiver<PlaybackStatus>,
    orchestrator: Arc<Orchestrator>,
    activity: ActivityTracker,
    reports: Arc<RwLock<Vec<RunReport>>>,
) {
    let mut launched_epoch = 0;
    loop {
        let status = *playback.borrow_and_update();
        if status.is_running() && status.epoch != launched_epoch {
            launched_epoch = status.epoch;
            debug!(epoch = status.epoch, "Launching run");

            let guard = activity.begin();
            let orchestrator = Arc::clone(&orchestrator);
            let reports = Arc::clone(&reports);
            tokio::spawn(async move {
                if let Some(report) = orchestrator.run_epoch(status.epoch).await {
                    reports.write().await.push(report);
                }
                drop(guard);
            });
        }

        if playback.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstage_core::Block;
    use std::time::Duration;

    fn quick_config() -> StageConfig {
        StageConfig {
            repetitions: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = Stage::new(StageConfig {
            repetitions: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(StageError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_actor_management() {
        let stage = Stage::new(StageConfig::default()).unwrap();
        let a = stage.add_actor("Freeza").await.unwrap();
        let b = stage.add_actor("Goku").await.unwrap();

        assert_eq!(stage.actor(&a).unwrap().pose, Pose::new(60.0, 60.0, 0.0));
        assert_eq!(stage.actor(&b).unwrap().pose, Pose::new(460.0, 60.0, 0.0));
        assert_eq!(stage.script(&a).await, Some(Script::default()));
        assert!(matches!(
            stage.add_actor("Vegeta").await,
            Err(StageError::ActorLimitReached { limit: 2 })
        ));

        stage.remove_actor(&a).await.unwrap();
        assert!(stage.script(&a).await.is_none());
        assert!(matches!(
            stage.set_script(&a, Script::default()).await,
            Err(StageError::ActorNotFound(_))
        ));
        assert!(matches!(
            stage.add_actor("Goku").await,
            Err(StageError::DuplicateActorName(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_runs_to_completion() {
        let stage = Stage::new(quick_config()).unwrap();
        let a = stage.add_actor("Freeza").await.unwrap();
        stage
            .set_script(&a, Script::new(vec![Block::move_steps(40.0), Block::turn_ccw(90.0)]))
            .await
            .unwrap();

        assert!(stage.play());
        stage.settled().await;

        let actor = stage.actor(&a).unwrap();
        assert_eq!(actor.pose, Pose::new(100.0, 60.0, 90.0));
        assert_eq!(stage.playback().state, PlaybackState::Stopped);
        assert_eq!(stage.runs_completed().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_from_pause_does_not_relaunch() {
        let stage = Stage::new(quick_config()).unwrap();
        let a = stage.add_actor("Freeza").await.unwrap();
        stage
            .set_script(&a, Script::new(vec![Block::move_steps(100.0)]))
            .await
            .unwrap();

        assert_eq!(stage.toggle(), PlaybackState::Running);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(stage.toggle(), PlaybackState::Paused);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(stage.toggle(), PlaybackState::Running);
        stage.settled().await;

        let reports = stage.take_reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].launched(), 1);
        assert_eq!(stage.actor(&a).unwrap().pose.x, 160.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_initial_poses() {
        let stage = Stage::new(quick_config()).unwrap();
        let a = stage.add_actor("Freeza").await.unwrap();
        stage.set_hero(true);
        stage
            .set_script(
                &a,
                Script::new(vec![Block::turn_cw(45.0), Block::say_for_secs("Hello!", 5.0)]),
            )
            .await
            .unwrap();
        stage.place_actor(&a, 200.0, 200.0).unwrap();

        stage.play();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let during = stage.actor(&a).unwrap();
        assert_eq!(during.pose.direction, 315.0);
        assert!(during.message.is_some());

        stage.reset();
        let after = stage.actor(&a).unwrap();
        assert_eq!(after.pose, Pose::new(60.0, 60.0, 0.0));
        assert!(after.message.is_none());
        assert!(!stage.hero_enabled());

        stage.settled().await;
        assert_eq!(stage.actor(&a).unwrap().pose, Pose::new(60.0, 60.0, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stage_halts_running_engines() {
        let stage = Stage::new(StageConfig::default()).unwrap();
        let a = stage.add_actor("Freeza").await.unwrap();
        stage
            .set_script(&a, Script::new(vec![Block::move_steps(100.0)]))
            .await
            .unwrap();
        let mut feed = stage.subscribe();

        stage.play();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stage);
        let x_at_drop = feed.borrow_and_update().actors[0].pose.x;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!feed.has_changed().unwrap_or(false));
        assert_eq!(feed.borrow().actors[0].pose.x, x_at_drop);
        assert!(x_at_drop < 1060.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stage_cancels_swap_resume() {
        let stage = Stage::new(StageConfig::default()).unwrap();
        let a = stage.add_actor("Freeza").await.unwrap();
        let b = stage.add_actor("Goku").await.unwrap();
        stage
            .set_script(&a, Script::new(vec![Block::move_steps(100.0)]))
            .await
            .unwrap();
        stage
            .set_script(&b, Script::new(vec![Block::move_steps(-100.0)]))
            .await
            .unwrap();
        stage.set_hero(true);
        let playback = stage.subscribe_playback();

        stage.play();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stage.swap_stats().await.initiated, 1);
        drop(stage);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(playback.borrow().is_stopped());
    }
}
