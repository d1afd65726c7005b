//! Actor state store
//!
//! Holds the render-facing view of the stage. Every write publishes a new
//! immutable [`StageSnapshot`] through a watch channel (copy-on-write via
//! [`Arc::make_mut`]), so a reader that grabbed a snapshot never observes a
//! half-applied update.

use crate::config::SpawnLayout;
use crate::error::{StageError, StageResult};
use crate::types::{Actor, ActorId, Pose, Speech};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Maximum number of actors on the stage
pub const MAX_ACTORS: usize = 2;

/// Whole-stage view published to rendering
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageSnapshot {
    /// Incremented on every published change
    pub version: u64,
    /// Collision-triggered script swapping
    pub hero_enabled: bool,
    pub actors: Vec<Actor>,
    #[serde(skip)]
    initial_poses: HashMap<ActorId, Pose>,
}

impl StageSnapshot {
    pub fn actor(&self, id: &ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id == *id)
    }

    /// The first actor that is not `id`
    pub fn other_than(&self, id: &ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id != *id)
    }

    /// Pose recorded when the actor was added
    pub fn initial_pose(&self, id: &ActorId) -> Option<Pose> {
        self.initial_poses.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

/// Shared handle to the actor state store
#[derive(Debug, Clone)]
pub struct ActorStore {
    tx: Arc<watch::Sender<Arc<StageSnapshot>>>,
    spawn: SpawnLayout,
}

impl Default for ActorStore {
    fn default() -> Self {
        Self::new(SpawnLayout::default())
    }
}

impl ActorStore {
    pub fn new(spawn: SpawnLayout) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(StageSnapshot::default()));
        Self {
            tx: Arc::new(tx),
            spawn,
        }
    }

    /// Consistent view of the whole stage
    pub fn snapshot(&self) -> Arc<StageSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<StageSnapshot>> {
        self.tx.subscribe()
    }

    pub fn actor(&self, id: &ActorId) -> Option<Actor> {
        self.snapshot().actor(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a named actor
    ///
    /// Without an explicit pose the actor spawns at the next slot of the
    /// spawn layout. The pose is recorded as the actor's initial pose.
    pub fn add_actor(&self, name: &str, pose: Option<Pose>) -> StageResult<ActorId> {
        let mut outcome = Err(StageError::ActorLimitReached { limit: MAX_ACTORS });
        self.tx.send_if_modified(|current| {
            if current.actors.len() >= MAX_ACTORS {
                return false;
            }
            if current.actors.iter().any(|a| a.name == name) {
                outcome = Err(StageError::DuplicateActorName(name.to_string()));
                return false;
            }

            let id = ActorId::new();
            let pose = pose.unwrap_or_else(|| self.spawn.pose_for_slot(current.initial_poses.len()));
            let next = Arc::make_mut(current);
            next.initial_poses.insert(id, pose);
            next.actors.push(Actor::new(id, name, pose));
            next.version += 1;
            debug!(actor = %id, name, x = pose.x, y = pose.y, "Added actor");
            outcome = Ok(id);
            true
        });
        outcome
    }

    /// Remove an actor together with its recorded initial pose
    pub fn remove_actor(&self, id: &ActorId) -> StageResult<Actor> {
        let mut outcome = Err(StageError::ActorNotFound(*id));
        self.tx.send_if_modified(|current| {
            let Some(index) = current.actors.iter().position(|a| a.id == *id) else {
                return false;
            };
            let next = Arc::make_mut(current);
            outcome = Ok(next.actors.remove(index));
            next.initial_poses.remove(id);
            next.version += 1;
            true
        });
        outcome
    }

    fn update_actor(&self, id: &ActorId, apply: impl FnOnce(&mut Actor) -> bool) -> StageResult<bool> {
        let mut outcome = Err(StageError::ActorNotFound(*id));
        self.tx.send_if_modified(|current| {
            let Some(index) = current.actors.iter().position(|a| a.id == *id) else {
                return false;
            };
            let mut actor = current.actors[index].clone();
            let changed = apply(&mut actor);
            outcome = Ok(changed);
            if changed {
                let next = Arc::make_mut(current);
                next.actors[index] = actor;
                next.version += 1;
            }
            changed
        });
        outcome
    }

    /// Write an actor's pose; returns whether anything changed
    pub fn set_pose(&self, id: &ActorId, pose: Pose) -> StageResult<bool> {
        self.update_actor(id, |actor| {
            if actor.pose == pose {
                return false;
            }
            actor.pose = pose;
            true
        })
    }

    /// Move an actor without touching its heading or initial pose
    pub fn place_actor(&self, id: &ActorId, x: f64, y: f64) -> StageResult<bool> {
        self.update_actor(id, |actor| {
            if actor.pose.x == x && actor.pose.y == y {
                return false;
            }
            actor.pose.x = x;
            actor.pose.y = y;
            true
        })
    }

    /// Show or clear an actor's bubble
    pub fn set_message(&self, id: &ActorId, message: Option<Speech>) -> StageResult<bool> {
        self.update_actor(id, |actor| {
            if actor.message == message {
                return false;
            }
            actor.message = message;
            true
        })
    }

    pub fn set_hero_enabled(&self, enabled: bool) {
        self.tx.send_if_modified(|current| {
            if current.hero_enabled == enabled {
                return false;
            }
            let next = Arc::make_mut(current);
            next.hero_enabled = enabled;
            next.version += 1;
            true
        });
    }

    pub fn hero_enabled(&self) -> bool {
        self.tx.borrow().hero_enabled
    }

    /// Restore every actor's initial pose, clear bubbles, disable hero mode
    pub fn reset(&self) {
        self.tx.send_modify(|current| {
            let next = Arc::make_mut(current);
            let StageSnapshot {
                actors,
                initial_poses,
                hero_enabled,
                version,
            } = next;
            for actor in actors.iter_mut() {
                if let Some(pose) = initial_poses.get(&actor.id) {
                    actor.pose = *pose;
                }
                actor.message = None;
            }
            *hero_enabled = false;
            *version += 1;
        });
        debug!("Stage reset to initial poses");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    #[test]
    fn test_actor_cap_and_unique_names() {
        let store = ActorStore::default();
        store.add_actor("Freeza", None).unwrap();
        assert_eq!(
            store.add_actor("Freeza", None),
            Err(StageError::DuplicateActorName("Freeza".to_string()))
        );
        store.add_actor("Goku", None).unwrap();
        assert_eq!(
            store.add_actor("Vegeta", None),
            Err(StageError::ActorLimitReached { limit: 2 })
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_default_spawn_slots() {
        let store = ActorStore::default();
        let a = store.add_actor("Freeza", None).unwrap();
        let b = store.add_actor("Goku", None).unwrap();
        assert_eq!(store.actor(&a).unwrap().pose, Pose::new(60.0, 60.0, 0.0));
        assert_eq!(store.actor(&b).unwrap().pose, Pose::new(460.0, 60.0, 0.0));
    }

    #[test]
    fn test_remove_drops_initial_pose() {
        let store = ActorStore::default();
        let a = store.add_actor("Freeza", None).unwrap();
        let removed = store.remove_actor(&a).unwrap();
        assert_eq!(removed.name, "Freeza");
        assert!(store.snapshot().initial_pose(&a).is_none());
        assert_eq!(store.remove_actor(&a), Err(StageError::ActorNotFound(a)));
    }

    #[test]
    fn test_unchanged_pose_publishes_nothing() {
        let store = ActorStore::default();
        let a = store.add_actor("Freeza", None).unwrap();
        let version = store.snapshot().version;

        let pose = store.actor(&a).unwrap().pose;
        assert_eq!(store.set_pose(&a, pose), Ok(false));
        assert_eq!(store.snapshot().version, version);

        assert_eq!(store.set_pose(&a, Pose::new(1.0, 2.0, 3.0)), Ok(true));
        assert_eq!(store.snapshot().version, version + 1);
    }

    #[test]
    fn test_old_snapshots_stay_consistent() {
        let store = ActorStore::default();
        let a = store.add_actor("Freeza", None).unwrap();
        let before = store.snapshot();
        store.set_pose(&a, Pose::new(5.0, 5.0, 0.0)).unwrap();
        assert_eq!(before.actor(&a).unwrap().pose.x, 60.0);
        assert_eq!(store.snapshot().actor(&a).unwrap().pose.x, 5.0);
    }

    #[test]
    fn test_reset_restores_initial_pose_and_clears_state() {
        let store = ActorStore::default();
        let a = store.add_actor("Freeza", None).unwrap();
        store.set_hero_enabled(true);
        store.set_pose(&a, Pose::new(300.0, -20.0, 135.0)).unwrap();
        store.place_actor(&a, 10.0, 10.0).unwrap();
        store
            .set_message(
                &a,
                Some(Speech {
                    text: "Hello!".to_string(),
                    kind: MessageKind::Say,
                }),
            )
            .unwrap();

        store.reset();

        let actor = store.actor(&a).unwrap();
        assert_eq!(actor.pose, Pose::new(60.0, 60.0, 0.0));
        assert!(actor.message.is_none());
        assert!(!store.hero_enabled());
    }

    #[test]
    fn test_writes_to_missing_actor_fail() {
        let store = ActorStore::default();
        let ghost = ActorId::new();
        assert_eq!(
            store.set_pose(&ghost, Pose::default()),
            Err(StageError::ActorNotFound(ghost))
        );
    }
}
