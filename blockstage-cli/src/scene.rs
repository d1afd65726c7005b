//! Scene files
//!
//! A scene is a JSON document describing the actors of a stage and their
//! scripts:
//!
//! ```json
//! {
//!   "hero": true,
//!   "actors": [
//!     { "name": "Freeza", "x": 60, "y": 60,
//!       "script": [{ "action": "move", "inputs": [{ "type": "number", "value": 100 }] }] }
//!   ]
//! }
//! ```

use blockstage_core::{ActorId, MAX_ACTORS, Pose, Script, StageError};
use blockstage_runtime::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Failed to read scene file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scene JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scene has {count} actors, at most {limit} are supported")]
    TooManyActors { count: usize, limit: usize },

    #[error("Actor name appears twice in scene: {0}")]
    DuplicateName(String),

    #[error("Actor '{0}' has only one of x and y")]
    PartialPosition(String),

    #[error(transparent)]
    Stage(#[from] StageError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub hero: bool,
    #[serde(default)]
    pub actors: Vec<SceneActor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneActor {
    pub name: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub direction: Option<f64>,
    #[serde(default)]
    pub script: Script,
}

impl SceneActor {
    fn pose(&self) -> Result<Option<Pose>, SceneError> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Ok(Some(Pose::new(x, y, self.direction.unwrap_or(0.0)))),
            (None, None) => Ok(None),
            _ => Err(SceneError::PartialPosition(self.name.clone())),
        }
    }
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SceneError> {
        let scene: Scene = serde_json::from_str(raw)?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        if self.actors.len() > MAX_ACTORS {
            return Err(SceneError::TooManyActors {
                count: self.actors.len(),
                limit: MAX_ACTORS,
            });
        }
        let mut names = HashSet::new();
        for actor in &self.actors {
            if !names.insert(actor.name.as_str()) {
                return Err(SceneError::DuplicateName(actor.name.clone()));
            }
            actor.pose()?;
        }
        Ok(())
    }

    /// Populate `stage` with this scene's actors and scripts
    pub async fn install(&self, stage: &Stage) -> Result<Vec<ActorId>, SceneError> {
        let mut ids = Vec::with_capacity(self.actors.len());
        for actor in &self.actors {
            let id = stage.add_actor_at(&actor.name, actor.pose()?).await?;
            stage.set_script(&id, actor.script.clone()).await?;
            ids.push(id);
        }
        stage.set_hero(self.hero);
        Ok(ids)
    }
}
