//! Dialogue tree content model
//!
//! Trees are authored as JSON documents (`camelCase` keys) and are immutable
//! while conversations walk them. Edits replace a tree wholesale.

use crate::error::ContentError;
use crate::rules::{Action, Condition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A named graph of dialogue nodes with one designated start node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueTree {
    pub id: String,
    pub name: String,
    pub start_node_id: String,
    pub nodes: BTreeMap<String, DialogueNode>,
    /// Default conversation variables, copied into each new conversation
    pub variables: BTreeMap<String, Value>,
    pub metadata: Value,
}

/// A unit of NPC message content
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueNode {
    pub id: String,
    pub message: String,
    pub choices: Vec<DialogueChoice>,
    /// Gate for the node's arrival effects (variable overrides and actions)
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub is_end: bool,
    /// Followed when the node has no choices, or a chosen choice names no target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,
    /// Variable overrides applied on arrival
    pub variables: BTreeMap<String, Value>,
}

/// A player-selectable, optionally gated edge leaving a node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueChoice {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,
}

impl DialogueTree {
    pub fn node(&self, node_id: &str) -> Option<&DialogueNode> {
        self.nodes.get(node_id)
    }

    pub fn start_node(&self) -> Option<&DialogueNode> {
        self.node(&self.start_node_id)
    }

    /// NPCs the tree names for itself under `metadata.npcIds`
    pub fn declared_npcs(&self) -> Vec<String> {
        self.metadata
            .get("npcIds")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse and validate a tree document
    pub fn from_json(document: &str) -> Result<Self, ContentError> {
        let tree: Self = serde_json::from_str(document)?;
        tree.validate()?;
        Ok(tree)
    }

    /// Check structural integrity.
    ///
    /// Only dangling references are rejected; cycles between nodes are a
    /// normal content pattern (looping menus, repeated questions).
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.id.trim().is_empty() {
            return Err(ContentError::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(ContentError::MissingField("name"));
        }
        if self.start_node_id.trim().is_empty() {
            return Err(ContentError::MissingField("startNodeId"));
        }
        if self.nodes.is_empty() {
            return Err(ContentError::MissingField("nodes"));
        }
        if !self.nodes.contains_key(&self.start_node_id) {
            return Err(ContentError::StartNodeMissing {
                tree_id: self.id.clone(),
                node_id: self.start_node_id.clone(),
            });
        }

        for (key, node) in &self.nodes {
            if &node.id != key {
                return Err(ContentError::NodeIdMismatch {
                    tree_id: self.id.clone(),
                    key: key.clone(),
                    declared: node.id.clone(),
                });
            }
            if node.message.trim().is_empty() {
                return Err(ContentError::EmptyMessage {
                    tree_id: self.id.clone(),
                    node_id: key.clone(),
                });
            }
            if let Some(next) = &node.next_node_id {
                self.check_reference(key, next)?;
            }
            for choice in &node.choices {
                if let Some(next) = &choice.next_node_id {
                    self.check_reference(&format!("{key}/{}", choice.id), next)?;
                }
            }
        }

        Ok(())
    }

    fn check_reference(&self, from: &str, target: &str) -> Result<(), ContentError> {
        // An empty target is an explicit "end here"
        if target.is_empty() || self.nodes.contains_key(target) {
            Ok(())
        } else {
            Err(ContentError::DanglingReference {
                tree_id: self.id.clone(),
                from: from.to_string(),
                target: target.to_string(),
            })
        }
    }
}
