//! # Stage Configuration
//!
//! Timing and geometry constants of the runtime. `StageConfig::default()`
//! yields the reference behavior; every value can be overridden from the
//! environment.
//!
//! ## Environment Variables
//!
//! - `BLOCKSTAGE_REPETITIONS` - Times each script is repeated (default: 10)
//! - `BLOCKSTAGE_REPETITION_DELAY_MS` - Delay between repetitions (default: 30)
//! - `BLOCKSTAGE_FRAME_INTERVAL_MS` - Delay between motion sub-steps (default: 16)
//! - `BLOCKSTAGE_PAUSE_RECHECK_MS` - Upper bound between pause re-checks (default: 100)
//! - `BLOCKSTAGE_TURN_PACING_MS` - Delay after each turn block (default: 1000)
//! - `BLOCKSTAGE_COLLISION_BOX` - Side of the square collision box (default: 48)
//! - `BLOCKSTAGE_MAX_SUBSTEP` - Upper bound of a motion sub-step (default: 10)
//! - `BLOCKSTAGE_SWAP_RESUME_MS` - Delay before playback resumes after a swap (default: 1000)
//! - `BLOCKSTAGE_SWAP_LOCK_HOLD_MS` - Extra time the swap lock is held after resuming (default: 2000)

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::types::Pose;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Where newly added actors appear
///
/// Slot `k` is at `(origin_x + (k % 2) * spacing, origin_y)`, facing 0°.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnLayout {
    pub origin_x: f64,
    pub origin_y: f64,
    pub spacing: f64,
}

impl Default for SpawnLayout {
    fn default() -> Self {
        Self {
            origin_x: 60.0,
            origin_y: 60.0,
            spacing: 400.0,
        }
    }
}

impl SpawnLayout {
    pub fn pose_for_slot(&self, slot: usize) -> Pose {
        let offset = if slot % 2 == 0 { 0.0 } else { self.spacing };
        Pose::new(self.origin_x + offset, self.origin_y, 0.0)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    /// How many times a whole script is run
    pub repetitions: u32,
    /// Pause between two repetitions (not after the last)
    pub repetition_delay: Duration,
    /// Pause between motion sub-steps (not after the last)
    pub frame_interval: Duration,
    /// Upper bound between re-checks while paused
    pub pause_recheck: Duration,
    /// Extra delay after `turn_cw` / `turn_ccw`
    pub turn_pacing: Duration,
    /// Side of the square collision box
    pub collision_box: f64,
    /// Upper bound for one motion sub-step
    pub max_substep: f64,
    /// Delay between a swap and playback resuming
    pub swap_resume_delay: Duration,
    /// How long the swap lock is still held once playback resumed
    pub swap_lock_hold: Duration,
    pub spawn: SpawnLayout,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            repetitions: 10,
            repetition_delay: Duration::from_millis(30),
            frame_interval: Duration::from_millis(16),
            pause_recheck: Duration::from_millis(100),
            turn_pacing: Duration::from_millis(1000),
            collision_box: 48.0,
            max_substep: 10.0,
            swap_resume_delay: Duration::from_millis(1000),
            swap_lock_hold: Duration::from_millis(2000),
            spawn: SpawnLayout::default(),
        }
    }
}

impl StageConfig {
    /// Largest distance covered by one motion sub-step
    pub fn substep_limit(&self) -> f64 {
        (self.collision_box / 2.0).min(self.max_substep)
    }

    /// Total time the swap lock is held after a swap
    pub fn swap_lock_window(&self) -> Duration {
        self.swap_resume_delay + self.swap_lock_hold
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(repetitions) = get_env_u32("BLOCKSTAGE_REPETITIONS")? {
            config.repetitions = repetitions;
        }
        if let Some(ms) = get_env_u64("BLOCKSTAGE_REPETITION_DELAY_MS")? {
            config.repetition_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = get_env_u64("BLOCKSTAGE_FRAME_INTERVAL_MS")? {
            config.frame_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = get_env_u64("BLOCKSTAGE_PAUSE_RECHECK_MS")? {
            config.pause_recheck = Duration::from_millis(ms);
        }
        if let Some(ms) = get_env_u64("BLOCKSTAGE_TURN_PACING_MS")? {
            config.turn_pacing = Duration::from_millis(ms);
        }
        if let Some(size) = get_env_f64("BLOCKSTAGE_COLLISION_BOX")? {
            config.collision_box = size;
        }
        if let Some(step) = get_env_f64("BLOCKSTAGE_MAX_SUBSTEP")? {
            config.max_substep = step;
        }
        if let Some(ms) = get_env_u64("BLOCKSTAGE_SWAP_RESUME_MS")? {
            config.swap_resume_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = get_env_u64("BLOCKSTAGE_SWAP_LOCK_HOLD_MS")? {
            config.swap_lock_hold = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repetitions == 0 {
            return Err(ConfigError::Validation(
                "repetitions must be at least 1".to_string(),
            ));
        }
        if !(self.collision_box.is_finite() && self.collision_box > 0.0) {
            return Err(ConfigError::Validation(format!(
                "collision_box must be positive, got {}",
                self.collision_box
            )));
        }
        if !(self.max_substep.is_finite() && self.max_substep > 0.0) {
            return Err(ConfigError::Validation(format!(
                "max_substep must be positive, got {}",
                self.max_substep
            )));
        }
        if self.pause_recheck.is_zero() {
            return Err(ConfigError::Validation(
                "pause_recheck must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u32 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_f64(key: &str) -> Result<Option<f64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid f64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
