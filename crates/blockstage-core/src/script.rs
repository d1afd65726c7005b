//! Scripts and their assignment to actors

use crate::block::Block;
use crate::types::ActorId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Ordered sequence of blocks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(Vec<Block>);

impl Script {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self(blocks)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma separated action names, for log lines
    pub fn summary(&self) -> String {
        if self.0.is_empty() {
            return "EMPTY".to_string();
        }
        self.0
            .iter()
            .map(|b| b.action.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Vec<Block>> for Script {
    fn from(blocks: Vec<Block>) -> Self {
        Self(blocks)
    }
}

impl FromIterator<Block> for Script {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of [`ScriptBook::exchange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// Both scripts were rewritten
    Swapped,
    /// The scripts were identical; nothing was written
    Unchanged,
}

/// Script assignment for every actor on the stage
///
/// Each actor owns exactly one script. Scripts are replaced wholesale, either
/// by the authoring side or by [`ScriptBook::exchange`].
#[derive(Debug, Clone, Default)]
pub struct ScriptBook {
    scripts: Arc<RwLock<HashMap<ActorId, Script>>>,
}

impl ScriptBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `script` to `actor`, replacing any previous one
    pub async fn assign(&self, actor: ActorId, script: Script) {
        let mut scripts = self.scripts.write().await;
        debug!(actor = %actor, blocks = script.len(), "Assigned script");
        scripts.insert(actor, script);
    }

    /// Drop an actor's script
    pub async fn remove(&self, actor: &ActorId) -> Option<Script> {
        self.scripts.write().await.remove(actor)
    }

    /// Point-in-time copy of an actor's script
    pub async fn get(&self, actor: &ActorId) -> Option<Script> {
        self.scripts.read().await.get(actor).cloned()
    }

    /// Total number of blocks across all scripts
    pub async fn total_blocks(&self) -> usize {
        self.scripts.read().await.values().map(Script::len).sum()
    }

    /// Exchange the scripts of two actors atomically
    ///
    /// A missing script counts as empty. When the exchange would not change
    /// anything the map is left untouched.
    pub async fn exchange(&self, a: &ActorId, b: &ActorId) -> Exchange {
        let mut scripts = self.scripts.write().await;
        let script_a = scripts.get(a).cloned().unwrap_or_default();
        let script_b = scripts.get(b).cloned().unwrap_or_default();

        if script_a == script_b {
            debug!(a = %a, b = %b, "Scripts identical, exchange skipped");
            return Exchange::Unchanged;
        }

        scripts.insert(*a, script_b);
        scripts.insert(*b, script_a);
        Exchange::Swapped
    }
}
