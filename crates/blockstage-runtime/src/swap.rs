//! Collision-triggered script swapping
//!
//! When two actors collide while hero mode is on, their scripts are
//! exchanged. Both engines usually detect the same collision, so the
//! coordinator deduplicates reports through a [`SwapLock`] keyed by the
//! unordered actor pair:
//!
//! 1. claim the lock for the pair (a second report for a held pair is a no-op)
//! 2. freeze playback so every engine winds down
//! 3. exchange the two scripts
//! 4. after `swap_resume_delay`, re-arm playback (a new run picks up the
//!    exchanged scripts)
//! 5. after a further `swap_lock_hold`, release the lock if it still holds
//!    this pair

use crate::activity::ActivityTracker;
use blockstage_core::{ActorId, Exchange, PlaybackController, ScriptBook, StageConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// Canonical, order-independent name of an actor pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PairKey {
    low: ActorId,
    high: ActorId,
}

impl PairKey {
    pub fn new(a: ActorId, b: ActorId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn members(&self) -> (ActorId, ActorId) {
        (self.low, self.high)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

#[derive(Debug, Clone, Copy)]
struct SwapLease {
    key: PairKey,
    claimed_at: Instant,
}

/// Single-slot lock guarding swaps for one pair at a time
#[derive(Debug, Default)]
pub struct SwapLock {
    active: Mutex<Option<SwapLease>>,
}

impl SwapLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lock for `key`
    ///
    /// Fails only when the lock already holds this exact pair.
    pub async fn try_claim(&self, key: PairKey) -> bool {
        let mut active = self.active.lock().await;
        if active.is_some_and(|lease| lease.key == key) {
            return false;
        }
        *active = Some(SwapLease {
            key,
            claimed_at: Instant::now(),
        });
        true
    }

    /// Release the lock if it still holds `key`
    pub async fn release_if_held(&self, key: &PairKey) -> bool {
        let mut active = self.active.lock().await;
        match *active {
            Some(lease) if lease.key == *key => {
                debug!(pair = %key, held_ms = lease.claimed_at.elapsed().as_millis() as u64, "Swap lock released");
                *active = None;
                true
            }
            _ => false,
        }
    }

    /// Pair currently holding the lock
    pub async fn holder(&self) -> Option<PairKey> {
        self.active.lock().await.map(|lease| lease.key)
    }
}

/// Swap statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwapStats {
    /// Swaps that claimed the lock
    pub initiated: u64,
    /// Reports dropped because the pair was already locked
    pub deduplicated: u64,
    /// Initiated swaps whose scripts were identical
    pub unchanged: u64,
}

/// One executed swap
#[derive(Debug, Clone, Serialize)]
pub struct SwapRecord {
    pub pair: PairKey,
    pub at: DateTime<Utc>,
    pub scripts_changed: bool,
}

/// Reacts to collisions reported by engine tasks
pub struct SwapCoordinator {
    scripts: ScriptBook,
    playback: PlaybackController,
    lock: Arc<SwapLock>,
    activity: ActivityTracker,
    resume_delay: Duration,
    lock_hold: Duration,
    stats: Arc<RwLock<SwapStats>>,
    history: Arc<RwLock<Vec<SwapRecord>>>,
}

impl SwapCoordinator {
    pub fn new(
        scripts: ScriptBook,
        playback: PlaybackController,
        activity: ActivityTracker,
        config: &StageConfig,
    ) -> Self {
        Self {
            scripts,
            playback,
            lock: Arc::new(SwapLock::new()),
            activity,
            resume_delay: config.swap_resume_delay,
            lock_hold: config.swap_lock_hold,
            stats: Arc::new(RwLock::new(SwapStats::default())),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Handle a collision between `a` and `b`
    ///
    /// Returns `true` when this call initiated a new swap; the reporting
    /// engine should then abandon its script.
    pub async fn on_collision(&self, a: ActorId, b: ActorId) -> bool {
        let key = PairKey::new(a, b);

        if !self.lock.try_claim(key).await {
            self.stats.write().await.deduplicated += 1;
            debug!(pair = %key, "Swap already in progress for pair");
            return false;
        }
        info!(pair = %key, "Swap lock claimed, freezing playback");

        let token = self.playback.freeze();
        let exchange = self.scripts.exchange(&a, &b).await;
        let scripts_changed = exchange == Exchange::Swapped;

        {
            let mut stats = self.stats.write().await;
            stats.initiated += 1;
            if !scripts_changed {
                stats.unchanged += 1;
            }
        }
        self.history.write().await.push(SwapRecord {
            pair: key,
            at: Utc::now(),
            scripts_changed,
        });

        let guard = self.activity.begin();
        let playback = self.playback.clone();
        let lock = Arc::clone(&self.lock);
        let resume_delay = self.resume_delay;
        let lock_hold = self.lock_hold;
        tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(resume_delay).await;
            if playback.resume_after_freeze(token) {
                info!(pair = %key, "Playback resumed after swap");
            } else {
                debug!(pair = %key, "Playback changed since swap, resume skipped");
            }

            tokio::time::sleep(lock_hold).await;
            if !lock.release_if_held(&key).await {
                debug!(pair = %key, "Swap lock already released or reclaimed");
            }
        });

        true
    }

    pub async fn stats(&self) -> SwapStats {
        self.stats.read().await.clone()
    }

    pub async fn history(&self) -> Vec<SwapRecord> {
        self.history.read().await.clone()
    }

    /// Pair currently holding the swap lock
    pub async fn locked_pair(&self) -> Option<PairKey> {
        self.lock.holder().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstage_core::{Block, PlaybackState, Script};

    struct Fixture {
        coordinator: SwapCoordinator,
        scripts: ScriptBook,
        playback: PlaybackController,
        activity: ActivityTracker,
        a: ActorId,
        b: ActorId,
    }

    async fn fixture() -> Fixture {
        let scripts = ScriptBook::new();
        let playback = PlaybackController::new();
        let activity = ActivityTracker::new();
        let coordinator = SwapCoordinator::new(
            scripts.clone(),
            playback.clone(),
            activity.clone(),
            &StageConfig::default(),
        );
        let a = ActorId::new();
        let b = ActorId::new();
        scripts
            .assign(a, Script::new(vec![Block::move_steps(100.0)]))
            .await;
        scripts
            .assign(b, Script::new(vec![Block::move_steps(-100.0)]))
            .await;
        playback.start();
        Fixture {
            coordinator,
            scripts,
            playback,
            activity,
            a,
            b,
        }
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = ActorId::new();
        let b = ActorId::new();
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_eq!(PairKey::new(a, b).to_string(), PairKey::new(b, a).to_string());
    }

    #[tokio::test]
    async fn test_lock_rejects_same_pair_only() {
        let lock = SwapLock::new();
        let (a, b, c) = (ActorId::new(), ActorId::new(), ActorId::new());
        assert!(lock.try_claim(PairKey::new(a, b)).await);
        assert!(!lock.try_claim(PairKey::new(b, a)).await);
        assert!(lock.try_claim(PairKey::new(a, c)).await);
        assert!(!lock.release_if_held(&PairKey::new(a, b)).await);
        assert!(lock.release_if_held(&PairKey::new(c, a)).await);
        assert!(lock.holder().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_freezes_exchanges_and_resumes() {
        let f = fixture().await;
        let epoch = f.playback.status().epoch;

        assert!(f.coordinator.on_collision(f.a, f.b).await);
        assert_eq!(f.playback.state(), PlaybackState::Stopped);
        assert_eq!(
            f.scripts.get(&f.a).await,
            Some(Script::new(vec![Block::move_steps(-100.0)]))
        );
        assert_eq!(
            f.scripts.get(&f.b).await,
            Some(Script::new(vec![Block::move_steps(100.0)]))
        );

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(f.playback.state(), PlaybackState::Running);
        assert_eq!(f.playback.status().epoch, epoch + 1);
        assert!(f.coordinator.locked_pair().await.is_some());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(f.coordinator.locked_pair().await.is_none());
        assert_eq!(f.activity.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_reports_swap_once_until_window_ends() {
        let f = fixture().await;

        assert!(f.coordinator.on_collision(f.a, f.b).await);
        assert!(!f.coordinator.on_collision(f.b, f.a).await);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!f.coordinator.on_collision(f.a, f.b).await);

        let stats = f.coordinator.stats().await;
        assert_eq!(stats.initiated, 1);
        assert_eq!(stats.deduplicated, 2);
        // one exchange: A holds B's original script
        assert_eq!(
            f.scripts.get(&f.a).await,
            Some(Script::new(vec![Block::move_steps(-100.0)]))
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(f.coordinator.on_collision(f.a, f.b).await);
        assert_eq!(f.coordinator.stats().await.initiated, 2);
        assert_eq!(f.coordinator.history().await.len(), 2);
        // second, independent exchange puts the scripts back
        assert_eq!(
            f.scripts.get(&f.a).await,
            Some(Script::new(vec![Block::move_steps(100.0)]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_resume_window_keeps_playback_stopped() {
        let f = fixture().await;
        assert!(f.coordinator.on_collision(f.a, f.b).await);
        f.playback.reset();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(f.playback.state(), PlaybackState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_scripts_still_lock_and_freeze() {
        let f = fixture().await;
        let same = Script::new(vec![Block::turn_cw(90.0)]);
        f.scripts.assign(f.a, same.clone()).await;
        f.scripts.assign(f.b, same).await;

        assert!(f.coordinator.on_collision(f.a, f.b).await);
        assert_eq!(f.playback.state(), PlaybackState::Stopped);
        let stats = f.coordinator.stats().await;
        assert_eq!(stats.unchanged, 1);
        assert!(!f.coordinator.history().await[0].scripts_changed);
    }
}
