//! Error types for the dialogue engine

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the engine
pub type DialogueResult<T> = Result<T, DialogueError>;

/// Errors raised to callers of the engine.
///
/// Lookup, ownership and timeout failures are loud. Failures while evaluating
/// content (conditions, actions, placeholders) never show up here; they are
/// logged and replaced by a safe default where they happen.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("no dialogue tree mapped for npc {npc_id}")]
    NoTreeMapped { npc_id: String },

    #[error("dialogue tree not found: {0}")]
    TreeNotFound(String),

    #[error("node {node_id} not found in tree {tree_id}")]
    NodeNotFound { tree_id: String, node_id: String },

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("conversation {conversation_id} does not belong to player {player_id}")]
    OwnershipMismatch {
        conversation_id: String,
        player_id: String,
    },

    #[error("conversation {0} timed out")]
    Timeout(String),

    #[error("player {player_id} already has {limit} active conversations")]
    QuotaExceeded { player_id: String, limit: usize },

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("no provider can handle npc {npc_id}")]
    NoProviderAvailable { npc_id: String },

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Coarse classification of a [`DialogueError`] for the command layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Content,
    Lookup,
    Ownership,
    Timeout,
    Quota,
    Persistence,
}

impl DialogueError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoTreeMapped { .. }
            | Self::TreeNotFound(_)
            | Self::NodeNotFound { .. }
            | Self::ConversationNotFound(_)
            | Self::ProviderNotFound(_)
            | Self::NoProviderAvailable { .. } => ErrorClass::Lookup,
            Self::OwnershipMismatch { .. } => ErrorClass::Ownership,
            Self::Timeout(_) => ErrorClass::Timeout,
            Self::QuotaExceeded { .. } => ErrorClass::Quota,
            Self::DuplicateProvider(_) | Self::Content(_) => ErrorClass::Content,
            Self::Persistence(_) => ErrorClass::Persistence,
        }
    }

    /// Whether the player can sensibly retry after this error (e.g. by ending
    /// another conversation first)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Quota | ErrorClass::Timeout | ErrorClass::Ownership
        )
    }
}

/// A dialogue tree document that failed to load or validate
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tree document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("tree is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("tree {tree_id}: start node {node_id} does not exist")]
    StartNodeMissing { tree_id: String, node_id: String },

    #[error("tree {tree_id}: node keyed {key} declares id {declared}")]
    NodeIdMismatch {
        tree_id: String,
        key: String,
        declared: String,
    },

    #[error("tree {tree_id}: node {node_id} has no message text")]
    EmptyMessage { tree_id: String, node_id: String },

    #[error("tree {tree_id}: {from} points at missing node {target}")]
    DanglingReference {
        tree_id: String,
        from: String,
        target: String,
    },
}

/// Failures from a conversation store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("state encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_classify_as_lookup() {
        let err = DialogueError::NoTreeMapped {
            npc_id: "smith".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::Lookup);
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "no dialogue tree mapped for npc smith");
    }

    #[test]
    fn quota_is_recoverable() {
        let err = DialogueError::QuotaExceeded {
            player_id: "p1".to_string(),
            limit: 3,
        };
        assert_eq!(err.class(), ErrorClass::Quota);
        assert!(err.is_recoverable());
    }

    #[test]
    fn content_error_converts() {
        let err: DialogueError = ContentError::MissingField("startNodeId").into();
        assert_eq!(err.class(), ErrorClass::Content);
        assert!(err.to_string().contains("startNodeId"));
    }
}
