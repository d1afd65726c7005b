//! Error types for stage operations

use crate::config::ConfigError;
use crate::types::ActorId;
use thiserror::Error;

/// Result type for stage operations
pub type StageResult<T> = Result<T, StageError>;

/// Errors that can occur while managing actors or running scripts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// The stage already holds the maximum number of actors
    #[error("Actor limit reached: at most {limit} actors")]
    ActorLimitReached { limit: usize },

    /// An actor with this name is already on the stage
    #[error("Actor name already in use: {0}")]
    DuplicateActorName(String),

    /// The actor does not exist (never added, or removed mid-run)
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorId),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StageError {
    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            StageError::ActorLimitReached { .. } => "ACTOR_LIMIT_REACHED",
            StageError::DuplicateActorName(_) => "DUPLICATE_ACTOR_NAME",
            StageError::ActorNotFound(_) => "ACTOR_NOT_FOUND",
            StageError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

impl From<ConfigError> for StageError {
    fn from(err: ConfigError) -> Self {
        StageError::InvalidConfig(err.to_string())
    }
}
