//! Dialogue providers: the pluggable strategies that run conversations

mod canned;
mod loader;

pub use canned::CannedProvider;
pub use loader::{load_directory, load_tree_file, LoadReport};

use crate::clock::Clock;
use crate::config::{DialogueConfig, EngineSettings};
use crate::context::Participants;
use crate::conversation::{ConversationArena, ConversationState, EndReason};
use crate::error::DialogueResult;
use crate::events::EventBus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A choice as shown to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceView {
    pub id: String,
    pub text: String,
    /// 1-based position among the choices shown
    pub index: usize,
}

/// What one start or continue call hands back to the command layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueResponse {
    pub conversation_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceView>>,
    pub is_complete: bool,
    pub state: ConversationState,
    pub variables: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    CannedBranching,
    Generative,
    Custom,
}

/// Shared services a provider needs for one call.
///
/// Providers hold only their own content; everything conversation-scoped
/// lives in the manager and is reached through this context.
#[derive(Clone)]
pub struct ProviderContext {
    pub arena: Arc<ConversationArena>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<EngineSettings>,
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProviderContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Remove and end a conversation through the shared termination path
    pub async fn end_conversation(&self, conversation_id: &str, reason: EndReason) -> bool {
        self.arena
            .end(conversation_id, reason, &self.events, self.now())
            .await
            .is_some()
    }
}

/// A strategy for running conversations with some set of NPCs
#[async_trait]
pub trait DialogueProvider: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Load content and apply configuration. Called once before registration.
    async fn initialize(&self, config: &DialogueConfig) -> DialogueResult<()>;

    fn can_handle(&self, npc_id: &str) -> bool;

    /// Start a conversation. A non-terminal conversation is added to the
    /// context's arena before this returns.
    async fn start_conversation(
        &self,
        ctx: &ProviderContext,
        participants: &mut Participants,
    ) -> DialogueResult<DialogueResponse>;

    async fn continue_conversation(
        &self,
        ctx: &ProviderContext,
        participants: &mut Participants,
        conversation_id: &str,
        input: &str,
    ) -> DialogueResult<DialogueResponse>;

    /// End a conversation this provider owns; returns whether anything ended
    async fn end_conversation(&self, ctx: &ProviderContext, conversation_id: &str) -> bool {
        match ctx.arena.snapshot(conversation_id).await {
            Some(state) if state.provider_id == self.id() => {
                ctx.end_conversation(conversation_id, EndReason::Explicit).await
            }
            _ => false,
        }
    }

    async fn conversation_state(
        &self,
        ctx: &ProviderContext,
        conversation_id: &str,
    ) -> Option<ConversationState> {
        ctx.arena
            .snapshot(conversation_id)
            .await
            .filter(|s| s.provider_id == self.id())
    }
}
