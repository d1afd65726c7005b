//! Playback controller
//!
//! Process-wide tri-state run control. The state lives in a
//! [`tokio::sync::watch`] cell so every reader sees a whole, consistent
//! [`PlaybackStatus`] and waiters are woken on change instead of polling.
//!
//! Legal transitions:
//!
//! ```text
//! Stopped --start--> Running <--pause/resume--> Paused
//! Running --finish--> Stopped
//! any --reset/freeze--> Stopped
//! ```
//!
//! Each `Stopped -> Running` edge opens a new run epoch. Engine tasks hold a
//! [`PlaybackGate`] bound to the epoch they were launched in and treat any
//! other epoch as a stop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Run control state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Snapshot of the playback cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Incremented on every `Stopped -> Running` edge
    pub epoch: u64,
    /// Incremented on every write
    pub revision: u64,
}

impl PlaybackStatus {
    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlaybackState::Stopped
    }
}

/// Token returned by [`PlaybackController::freeze`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezeToken(u64);

/// Shared handle to the playback cell
#[derive(Debug, Clone)]
pub struct PlaybackController {
    tx: Arc<watch::Sender<PlaybackStatus>>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PlaybackStatus::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current status
    pub fn status(&self) -> PlaybackStatus {
        *self.tx.borrow()
    }

    pub fn state(&self) -> PlaybackState {
        self.status().state
    }

    /// Watch every status change
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.tx.subscribe()
    }

    /// Gate for an engine task launched in `epoch`
    pub fn gate(&self, epoch: u64, recheck: Duration) -> PlaybackGate {
        PlaybackGate {
            rx: self.tx.subscribe(),
            epoch,
            recheck,
        }
    }

    fn transition(&self, apply: impl FnOnce(&mut PlaybackStatus) -> bool) -> bool {
        self.tx.send_if_modified(|status| {
            let changed = apply(status);
            if changed {
                status.revision += 1;
                debug!(state = %status.state, epoch = status.epoch, "Playback transition");
            }
            changed
        })
    }

    /// `Stopped -> Running`, opening a new epoch
    pub fn start(&self) -> bool {
        self.transition(|status| {
            if status.state != PlaybackState::Stopped {
                return false;
            }
            status.state = PlaybackState::Running;
            status.epoch += 1;
            true
        })
    }

    /// `Running -> Paused`
    pub fn pause(&self) -> bool {
        self.transition(|status| {
            if status.state != PlaybackState::Running {
                return false;
            }
            status.state = PlaybackState::Paused;
            true
        })
    }

    /// `Paused -> Running`, keeping the epoch
    pub fn resume(&self) -> bool {
        self.transition(|status| {
            if status.state != PlaybackState::Paused {
                return false;
            }
            status.state = PlaybackState::Running;
            true
        })
    }

    /// Start when stopped, otherwise flip between running and paused
    pub fn toggle(&self) -> PlaybackState {
        self.transition(|status| {
            match status.state {
                PlaybackState::Stopped => {
                    status.state = PlaybackState::Running;
                    status.epoch += 1;
                }
                PlaybackState::Running => status.state = PlaybackState::Paused,
                PlaybackState::Paused => status.state = PlaybackState::Running,
            }
            true
        });
        self.state()
    }

    /// `Running -> Stopped` at the natural end of the run opened in `epoch`
    ///
    /// Does nothing if the run was paused, stopped, or superseded.
    pub fn finish(&self, epoch: u64) -> bool {
        self.transition(|status| {
            if status.state != PlaybackState::Running || status.epoch != epoch {
                return false;
            }
            status.state = PlaybackState::Stopped;
            true
        })
    }

    /// Unconditionally stop and clear pause
    pub fn reset(&self) {
        self.transition(|status| {
            status.state = PlaybackState::Stopped;
            true
        });
    }

    /// Quiesce every engine for a script exchange
    ///
    /// The returned token re-arms playback through
    /// [`PlaybackController::resume_after_freeze`], provided nothing else
    /// wrote to the cell in between.
    pub fn freeze(&self) -> FreezeToken {
        self.transition(|status| {
            status.state = PlaybackState::Stopped;
            true
        });
        FreezeToken(self.status().revision)
    }

    /// Re-arm playback after a freeze, opening a new epoch
    pub fn resume_after_freeze(&self, token: FreezeToken) -> bool {
        self.transition(|status| {
            if status.revision != token.0 || status.state != PlaybackState::Stopped {
                return false;
            }
            status.state = PlaybackState::Running;
            status.epoch += 1;
            true
        })
    }
}

/// Verdict of a playback checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Per-task view of the playback cell
#[derive(Debug, Clone)]
pub struct PlaybackGate {
    rx: watch::Receiver<PlaybackStatus>,
    epoch: u64,
    recheck: Duration,
}

impl PlaybackGate {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn halted(&self, status: &PlaybackStatus) -> bool {
        status.state == PlaybackState::Stopped || status.epoch != self.epoch
    }

    /// True when this task's run is over
    pub fn is_halted(&self) -> bool {
        let status = *self.rx.borrow();
        self.halted(&status)
    }

    /// Halt if stopped; while paused, suspend until running or stopped
    ///
    /// The pause wait wakes on every change of the cell and re-checks at
    /// least once per `recheck` interval.
    pub async fn checkpoint(&mut self) -> Flow {
        loop {
            let status = *self.rx.borrow_and_update();
            if self.halted(&status) {
                return Flow::Halt;
            }
            if status.state != PlaybackState::Paused {
                return Flow::Continue;
            }
            if let Ok(Err(_)) = tokio::time::timeout(self.recheck, self.rx.changed()).await {
                // controller dropped
                return Flow::Halt;
            }
        }
    }
}
