//! Canned branching dialogue: authored trees walked by player choice

use super::loader::load_directory;
use super::{DialogueProvider, DialogueResponse, ProviderContext, ProviderKind};
use crate::config::DialogueConfig;
use crate::context::{DialogueContext, Participants};
use crate::conversation::{conclude, ConversationState, EndReason, Turn};
use crate::error::{ContentError, DialogueError, DialogueResult};
use crate::events::{DialogueEvent, EventKind};
use crate::rules::{ActionExecutor, ConditionEvaluator, CustomActionHook, NoopHook, RandomSource};
use crate::tree::DialogueTree;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

pub const CANNED_PROVIDER_ID: &str = "canned";

pub struct CannedProvider {
    id: String,
    name: String,
    trees: RwLock<HashMap<String, Arc<DialogueTree>>>,
    /// NPC id → tree id
    npc_trees: RwLock<HashMap<String, String>>,
    hook: Arc<dyn CustomActionHook>,
    random: Option<RandomSource>,
}

impl fmt::Debug for CannedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CannedProvider")
            .field("id", &self.id)
            .field("trees", &self.tree_ids())
            .finish_non_exhaustive()
    }
}

impl Default for CannedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedProvider {
    pub fn new() -> Self {
        Self {
            id: CANNED_PROVIDER_ID.to_string(),
            name: "Canned Branching Dialogue".to_string(),
            trees: RwLock::new(HashMap::new()),
            npc_trees: RwLock::new(HashMap::new()),
            hook: Arc::new(NoopHook),
            random: None,
        }
    }

    /// Register under a different id, e.g. to run two content sets side by side
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_custom_hook(mut self, hook: Arc<dyn CustomActionHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_random_source(mut self, random: RandomSource) -> Self {
        self.random = Some(random);
        self
    }

    /// Validate `tree` and install it, replacing any tree with the same id.
    /// Returns the tree it replaced.
    pub fn replace_tree(
        &self,
        tree: DialogueTree,
    ) -> Result<Option<Arc<DialogueTree>>, ContentError> {
        tree.validate()?;
        tracing::info!(provider = %self.id, tree_id = %tree.id, "Installing dialogue tree");
        Ok(self
            .trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tree.id.clone(), Arc::new(tree)))
    }

    pub fn tree(&self, tree_id: &str) -> Option<Arc<DialogueTree>> {
        self.trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tree_id)
            .cloned()
    }

    pub fn tree_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn set_tree_mapping(&self, npc_id: impl Into<String>, tree_id: impl Into<String>) {
        self.npc_trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(npc_id.into(), tree_id.into());
    }

    pub fn remove_tree_mapping(&self, npc_id: &str) -> Option<String> {
        self.npc_trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(npc_id)
    }

    fn mapped_tree(&self, npc_id: &str) -> DialogueResult<Arc<DialogueTree>> {
        let tree_id = self
            .npc_trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(npc_id)
            .cloned()
            .ok_or_else(|| DialogueError::NoTreeMapped {
                npc_id: npc_id.to_string(),
            })?;
        self.tree(&tree_id)
            .ok_or(DialogueError::TreeNotFound(tree_id))
    }

    fn executor(&self, ctx: &ProviderContext) -> ActionExecutor {
        let mut evaluator = ConditionEvaluator::new(ctx.clock.clone());
        if let Some(random) = &self.random {
            evaluator = evaluator.with_random_source(random.clone());
        }
        ActionExecutor::new(evaluator, ctx.events.clone(), self.hook.clone())
    }
}

#[async_trait]
impl DialogueProvider for CannedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CannedBranching
    }

    async fn initialize(&self, config: &DialogueConfig) -> DialogueResult<()> {
        let dir = &config.content_dir;
        if tokio::fs::try_exists(dir).await.unwrap_or(false) {
            let (trees, _) = load_directory(dir).await?;
            for tree in trees {
                for npc_id in tree.declared_npcs() {
                    self.set_tree_mapping(npc_id, tree.id.clone());
                }
                self.replace_tree(tree)?;
            }
        } else {
            tracing::warn!(
                dir = %dir.display(),
                "Content directory not found, starting with no trees"
            );
        }

        // Config mappings win over what trees declare
        for (npc_id, tree_id) in &config.npc_trees {
            self.set_tree_mapping(npc_id.clone(), tree_id.clone());
        }
        Ok(())
    }

    fn can_handle(&self, npc_id: &str) -> bool {
        self.npc_trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(npc_id)
    }

    async fn start_conversation(
        &self,
        ctx: &ProviderContext,
        participants: &mut Participants,
    ) -> DialogueResult<DialogueResponse> {
        let tree = self.mapped_tree(&participants.npc.id)?;
        let now = ctx.now();
        let mut state = ConversationState::new(
            &participants.player.id,
            &participants.npc.id,
            &self.id,
            &tree,
            now,
        );

        tracing::info!(
            conv_id = %state.conversation_id,
            player_id = %state.player_id,
            npc_id = %state.npc_id,
            tree_id = %tree.id,
            "Conversation started"
        );
        ctx.events.publish(DialogueEvent::from_state(
            &state,
            now,
            EventKind::ConversationStarted {
                provider_id: self.id.clone(),
                tree_id: tree.id.clone(),
                node_id: tree.start_node_id.clone(),
            },
        ));

        let executor = self.executor(ctx);
        let mut dctx = DialogueContext::assemble(&state, participants);
        let response = Turn {
            tree: &tree,
            executor: &executor,
            events: &ctx.events,
            settings: &ctx.settings,
            now,
        }
        .begin(&mut state, &mut dctx)?;
        dctx.release_player(participants);

        if state.is_active {
            ctx.arena.insert(state).await;
        }
        Ok(response)
    }

    async fn continue_conversation(
        &self,
        ctx: &ProviderContext,
        participants: &mut Participants,
        conversation_id: &str,
        input: &str,
    ) -> DialogueResult<DialogueResponse> {
        let not_found = || DialogueError::ConversationNotFound(conversation_id.to_string());
        let cell = ctx.arena.get(conversation_id).await.ok_or_else(not_found)?;
        let mut state = cell.lock().await;

        if !state.is_active || state.provider_id != self.id {
            return Err(not_found());
        }
        if state.player_id != participants.player.id {
            return Err(DialogueError::OwnershipMismatch {
                conversation_id: conversation_id.to_string(),
                player_id: participants.player.id.clone(),
            });
        }

        let now = ctx.now();
        if state.is_expired(now, ctx.settings.conversation_timeout) {
            tracing::info!(conv_id = %conversation_id, "Conversation idle past timeout");
            ctx.arena.remove(conversation_id).await;
            conclude(&mut state, EndReason::Timeout, &ctx.events, now);
            return Err(DialogueError::Timeout(conversation_id.to_string()));
        }
        // A turn that cannot run must not count as activity
        let tree = self
            .tree(&state.tree_id)
            .ok_or_else(|| DialogueError::TreeNotFound(state.tree_id.clone()))?;
        if tree.node(&state.current_node_id).is_none() {
            tracing::warn!(
                conv_id = %conversation_id,
                tree_id = %tree.id,
                node_id = %state.current_node_id,
                "Current node no longer exists"
            );
            return Err(DialogueError::NodeNotFound {
                tree_id: tree.id.clone(),
                node_id: state.current_node_id.clone(),
            });
        }
        state.touch(now);

        let executor = self.executor(ctx);
        let mut dctx = DialogueContext::assemble(&state, participants);
        let response = Turn {
            tree: &tree,
            executor: &executor,
            events: &ctx.events,
            settings: &ctx.settings,
            now,
        }
        .advance(&mut state, &mut dctx, input)?;
        dctx.release_player(participants);

        tracing::debug!(
            conv_id = %conversation_id,
            node_id = %state.current_node_id,
            turn = state.turn_count,
            complete = response.is_complete,
            "Turn processed"
        );
        if !state.is_active {
            ctx.arena.remove(conversation_id).await;
        }
        Ok(response)
    }
}
