//! Conversation store schema

/// Active conversations, one row each; `state` is the JSON-encoded
/// `ConversationState`
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS active_conversations (
    conversation_id TEXT PRIMARY KEY,
    player_id TEXT NOT NULL,
    npc_id TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    state TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_active_conversations_player ON active_conversations(player_id);
";
