//! Durable per-conversation data

use crate::tree::DialogueTree;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Why a conversation stopped being active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Content reached an end node or an empty target
    Completed,
    /// The player or the command layer asked to end it
    Explicit,
    Timeout,
    ProviderUnregistered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: String,
    pub player_id: String,
    pub npc_id: String,
    pub provider_id: String,
    pub tree_id: String,
    pub current_node_id: String,
    pub variables: BTreeMap<String, Value>,
    pub flags: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub turn_count: u32,
    /// Node ids in the order they were entered
    pub history: Vec<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl ConversationState {
    /// Fresh state positioned at the tree's start node, with the tree's
    /// default variables copied in
    pub fn new(
        player_id: impl Into<String>,
        npc_id: impl Into<String>,
        provider_id: impl Into<String>,
        tree: &DialogueTree,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            player_id: player_id.into(),
            npc_id: npc_id.into(),
            provider_id: provider_id.into(),
            tree_id: tree.id.clone(),
            current_node_id: tree.start_node_id.clone(),
            variables: tree.variables.clone(),
            flags: Vec::new(),
            started_at: now,
            last_activity: now,
            turn_count: 0,
            history: Vec::new(),
            is_active: true,
            end_reason: None,
        }
    }

    /// Idle for longer than `timeout` as of `now`
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }

    /// Record a player turn
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        self.turn_count = self.turn_count.saturating_add(1);
    }

    /// Mark the conversation inactive. Only the first call has any effect.
    pub fn finish(&mut self, reason: EndReason) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.end_reason = Some(reason);
        true
    }
}
