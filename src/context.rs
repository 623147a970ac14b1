//! Snapshots of player, NPC and world state supplied by collaborators, and
//! the per-turn variable context assembled from them.

use crate::conversation::ConversationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Quest progress as reported by the quest layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestProgress {
    pub status: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub progress: Value,
}

impl QuestProgress {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: Value::Null,
        }
    }
}

/// Player state as seen by dialogue content
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub level: i64,
    pub stats: BTreeMap<String, i64>,
    /// Item ids; duplicates represent stacked copies
    pub inventory: Vec<String>,
    pub flags: Vec<String>,
    pub quests: BTreeMap<String, QuestProgress>,
    pub skills: BTreeMap<String, i64>,
    pub currency: i64,
    pub faction_relations: BTreeMap<String, i64>,
}

impl PlayerSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level: 1,
            ..Self::default()
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Add a flag; returns false if it was already set
    pub fn add_flag(&mut self, flag: &str) -> bool {
        if self.has_flag(flag) {
            return false;
        }
        self.flags.push(flag.to_string());
        true
    }

    /// Remove a flag; returns false if it was not set
    pub fn remove_flag(&mut self, flag: &str) -> bool {
        let before = self.flags.len();
        self.flags.retain(|f| f != flag);
        self.flags.len() != before
    }

    pub fn item_count(&self, item_id: &str) -> usize {
        self.inventory.iter().filter(|id| *id == item_id).count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NpcSnapshot {
    pub id: String,
    pub name: String,
    pub flags: Vec<String>,
    pub stats: BTreeMap<String, i64>,
}

impl NpcSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldSnapshot {
    pub time: DateTime<Utc>,
    pub flags: Vec<String>,
    pub faction_relations: BTreeMap<String, i64>,
}

/// Everything the command layer hands the engine for one call.
///
/// The player snapshot comes back with any mutations actions applied
/// (flags, or whatever a custom hook touched) so the caller can persist them.
#[derive(Debug, Clone, Default)]
pub struct Participants {
    pub player: PlayerSnapshot,
    pub npc: NpcSnapshot,
    pub world: WorldSnapshot,
}

impl Participants {
    pub fn new(player: PlayerSnapshot, npc: NpcSnapshot) -> Self {
        Self {
            player,
            npc,
            world: WorldSnapshot::default(),
        }
    }

    pub fn with_world(mut self, world: WorldSnapshot) -> Self {
        self.world = world;
        self
    }
}

/// Conversation-local part of the variable context
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationSnapshot {
    pub id: String,
    pub tree_id: String,
    pub current_node_id: String,
    pub variables: BTreeMap<String, Value>,
    pub flags: Vec<String>,
    pub turn_count: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Ephemeral context conditions read and actions write, rebuilt every turn
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueContext {
    pub player: PlayerSnapshot,
    pub npc: NpcSnapshot,
    pub conversation: ConversationSnapshot,
    pub world: WorldSnapshot,
}

impl DialogueContext {
    pub fn assemble(state: &ConversationState, participants: &Participants) -> Self {
        Self {
            player: participants.player.clone(),
            npc: participants.npc.clone(),
            conversation: ConversationSnapshot {
                id: state.conversation_id.clone(),
                tree_id: state.tree_id.clone(),
                current_node_id: state.current_node_id.clone(),
                variables: state.variables.clone(),
                flags: state.flags.clone(),
                turn_count: state.turn_count,
                started_at: state.started_at,
                last_activity: state.last_activity,
            },
            world: participants.world.clone(),
        }
    }

    /// Copy conversation-level writes back into the durable state
    pub fn sync_into(&self, state: &mut ConversationState) {
        state.variables.clone_from(&self.conversation.variables);
        state.flags.clone_from(&self.conversation.flags);
    }

    /// Hand player-level writes back to the caller
    pub fn release_player(&self, participants: &mut Participants) {
        participants.player.clone_from(&self.player);
    }

    /// JSON projection used for placeholder lookup
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
