//! Top-level orchestration: provider registry, quotas, timeouts, lifecycle

mod maintenance;

use crate::clock::{Clock, SystemClock};
use crate::config::{DialogueConfig, EngineSettings};
use crate::context::Participants;
use crate::conversation::{ConversationArena, ConversationState, EndReason};
use crate::error::{DialogueError, DialogueResult};
use crate::events::{DialogueEvent, EventBus, EventKind};
use crate::provider::{CannedProvider, DialogueProvider, DialogueResponse, ProviderContext};
use crate::store::{ConversationStore, SqliteConversationStore};
use maintenance::MaintenanceHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Entry point for the command layer.
///
/// Owns the conversation arena and lends it to providers per call. Typically
/// held in an `Arc` so the maintenance task can reach it.
pub struct DialogueManager {
    config: DialogueConfig,
    providers: RwLock<HashMap<String, Arc<dyn DialogueProvider>>>,
    default_provider: RwLock<Option<String>>,
    arena: Arc<ConversationArena>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    settings: Arc<EngineSettings>,
    store: Option<Arc<dyn ConversationStore>>,
    /// Serialises starts so the per-player quota cannot be raced
    start_gate: Mutex<()>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl std::fmt::Debug for DialogueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DialogueManager {
    pub fn new(config: DialogueConfig) -> Self {
        Self {
            events: EventBus::new(config.event_capacity),
            settings: Arc::new(config.settings()),
            default_provider: RwLock::new(config.default_provider.clone()),
            config,
            providers: RwLock::new(HashMap::new()),
            arena: Arc::new(ConversationArena::new()),
            clock: Arc::new(SystemClock),
            store: None,
            start_gate: Mutex::new(()),
            maintenance: Mutex::new(None),
        }
    }

    /// Build a manager, attaching the SQLite store when persistence is enabled
    pub fn open(config: DialogueConfig) -> DialogueResult<Self> {
        let store = if config.persistence.enabled {
            let store = SqliteConversationStore::open(&config.persistence.database_path)?;
            tracing::info!(
                path = %config.persistence.database_path.display(),
                "Conversation persistence enabled"
            );
            Some(Arc::new(store) as Arc<dyn ConversationStore>)
        } else {
            None
        };
        let manager = Self::new(config);
        Ok(match store {
            Some(store) => manager.with_store(store),
            None => manager,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.events.subscribe()
    }

    fn context(&self) -> ProviderContext {
        ProviderContext {
            arena: self.arena.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Initialize and register `providers`, or the canned provider built from
    /// config when none are given. Then restore saved conversations and, with
    /// a store attached, start the maintenance task.
    pub async fn initialize(
        self: &Arc<Self>,
        providers: Vec<Arc<dyn DialogueProvider>>,
    ) -> DialogueResult<()> {
        let providers = if providers.is_empty() {
            vec![Arc::new(CannedProvider::new()) as Arc<dyn DialogueProvider>]
        } else {
            providers
        };

        for provider in providers {
            provider.initialize(&self.config).await?;
            self.register_provider(provider).await?;
        }

        if let Some(id) = self.default_provider().await {
            if !self.providers.read().await.contains_key(&id) {
                return Err(DialogueError::ProviderNotFound(id));
            }
        }

        let restored = self.restore().await?;
        if restored > 0 {
            tracing::info!(count = restored, "Restored saved conversations");
        }

        if self.store.is_some() {
            self.start_maintenance().await;
        }
        Ok(())
    }

    pub async fn register_provider(
        &self,
        provider: Arc<dyn DialogueProvider>,
    ) -> DialogueResult<()> {
        let id = provider.id().to_string();
        let mut providers = self.providers.write().await;
        if providers.contains_key(&id) {
            return Err(DialogueError::DuplicateProvider(id));
        }
        tracing::info!(
            provider = %id,
            name = %provider.name(),
            kind = ?provider.kind(),
            "Registered dialogue provider"
        );
        providers.insert(id.clone(), provider);

        let mut default = self.default_provider.write().await;
        if default.is_none() {
            *default = Some(id);
        }
        Ok(())
    }

    /// Remove a provider after ending every conversation it owns. Returns how
    /// many conversations were ended.
    pub async fn unregister_provider(&self, provider_id: &str) -> DialogueResult<usize> {
        // No start may pick the provider between leaving the registry and the sweep
        let _gate = self.start_gate.lock().await;
        {
            let mut providers = self.providers.write().await;
            if providers.remove(provider_id).is_none() {
                return Err(DialogueError::ProviderNotFound(provider_id.to_string()));
            }
            let mut default = self.default_provider.write().await;
            if default.as_deref() == Some(provider_id) {
                let mut remaining: Vec<_> = providers.keys().cloned().collect();
                remaining.sort();
                *default = remaining.into_iter().next();
            }
        }

        let ids = self.arena.ids_for_provider(provider_id).await;
        let now = self.clock.now();
        let mut ended = 0;
        for id in &ids {
            if self
                .arena
                .end(id, EndReason::ProviderUnregistered, &self.events, now)
                .await
                .is_some()
            {
                ended += 1;
            }
        }

        tracing::info!(provider = %provider_id, ended, "Unregistered dialogue provider");
        Ok(ended)
    }

    pub async fn set_default_provider(&self, provider_id: &str) -> DialogueResult<()> {
        if !self.providers.read().await.contains_key(provider_id) {
            return Err(DialogueError::ProviderNotFound(provider_id.to_string()));
        }
        *self.default_provider.write().await = Some(provider_id.to_string());
        Ok(())
    }

    pub async fn default_provider(&self) -> Option<String> {
        self.default_provider.read().await.clone()
    }

    pub async fn provider(&self, provider_id: &str) -> Option<Arc<dyn DialogueProvider>> {
        self.providers.read().await.get(provider_id).cloned()
    }

    pub async fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.providers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Explicit id, else the default if it can handle the NPC, else the first
    /// provider (by id) that can. With no taker the default still gets the
    /// call so it can report why.
    async fn resolve_provider(
        &self,
        npc_id: &str,
        explicit: Option<&str>,
    ) -> DialogueResult<Arc<dyn DialogueProvider>> {
        let providers = self.providers.read().await;
        if let Some(id) = explicit {
            return providers
                .get(id)
                .cloned()
                .ok_or_else(|| DialogueError::ProviderNotFound(id.to_string()));
        }

        let default = self
            .default_provider
            .read()
            .await
            .as_deref()
            .and_then(|id| providers.get(id))
            .cloned();
        if let Some(provider) = default.as_ref().filter(|p| p.can_handle(npc_id)) {
            return Ok(provider.clone());
        }

        let mut ids: Vec<_> = providers.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| providers.get(id))
            .find(|p| p.can_handle(npc_id))
            .cloned()
            .or(default)
            .ok_or_else(|| DialogueError::NoProviderAvailable {
                npc_id: npc_id.to_string(),
            })
    }

    pub async fn start_conversation(
        &self,
        participants: &mut Participants,
        provider_id: Option<&str>,
    ) -> DialogueResult<DialogueResponse> {
        let _gate = self.start_gate.lock().await;
        let player_id = participants.player.id.clone();
        self.expire_for_player(&player_id).await;

        let limit = self.config.max_conversations_per_player;
        let active = self.arena.count_for_player(&player_id).await;
        if active >= limit {
            tracing::warn!(player_id = %player_id, active, limit, "Conversation quota reached");
            return Err(DialogueError::QuotaExceeded { player_id, limit });
        }

        let provider = self
            .resolve_provider(&participants.npc.id, provider_id)
            .await?;
        provider
            .start_conversation(&self.context(), participants)
            .await
    }

    /// End the player's conversations that have gone idle, so they stop
    /// counting against the quota
    async fn expire_for_player(&self, player_id: &str) {
        let now = self.clock.now();
        for state in self.arena.for_player(player_id).await {
            if state.is_expired(now, self.settings.conversation_timeout) {
                self.arena
                    .end(&state.conversation_id, EndReason::Timeout, &self.events, now)
                    .await;
            }
        }
    }

    pub async fn continue_conversation(
        &self,
        participants: &mut Participants,
        conversation_id: &str,
        input: &str,
    ) -> DialogueResult<DialogueResponse> {
        let state = self
            .arena
            .snapshot(conversation_id)
            .await
            .ok_or_else(|| DialogueError::ConversationNotFound(conversation_id.to_string()))?;
        if state.player_id != participants.player.id {
            return Err(DialogueError::OwnershipMismatch {
                conversation_id: conversation_id.to_string(),
                player_id: participants.player.id.clone(),
            });
        }

        let now = self.clock.now();
        if state.is_expired(now, self.settings.conversation_timeout) {
            self.arena
                .end(conversation_id, EndReason::Timeout, &self.events, now)
                .await;
            return Err(DialogueError::Timeout(conversation_id.to_string()));
        }

        let provider = self
            .provider(&state.provider_id)
            .await
            .ok_or_else(|| DialogueError::ProviderNotFound(state.provider_id.clone()))?;
        let response = provider
            .continue_conversation(&self.context(), participants, conversation_id, input)
            .await?;
        if response.is_complete {
            self.arena.remove(conversation_id).await;
        }
        Ok(response)
    }

    /// End a conversation; ending an unknown or finished one does nothing
    pub async fn end_conversation(&self, conversation_id: &str) -> bool {
        let Some(state) = self.arena.snapshot(conversation_id).await else {
            return false;
        };
        let ctx = self.context();
        match self.provider(&state.provider_id).await {
            Some(provider) => provider.end_conversation(&ctx, conversation_id).await,
            None => ctx.end_conversation(conversation_id, EndReason::Explicit).await,
        }
    }

    pub async fn get_player_conversations(&self, player_id: &str) -> Vec<ConversationState> {
        self.arena.for_player(player_id).await
    }

    pub async fn get_conversation_state(&self, conversation_id: &str) -> Option<ConversationState> {
        self.arena.snapshot(conversation_id).await
    }

    /// Hand an active conversation to another provider that can run its NPC
    pub async fn switch_provider(
        &self,
        conversation_id: &str,
        provider_id: &str,
    ) -> DialogueResult<ConversationState> {
        let target = self
            .provider(provider_id)
            .await
            .ok_or_else(|| DialogueError::ProviderNotFound(provider_id.to_string()))?;
        let cell = self
            .arena
            .get(conversation_id)
            .await
            .ok_or_else(|| DialogueError::ConversationNotFound(conversation_id.to_string()))?;
        let mut state = cell.lock().await;
        if !target.can_handle(&state.npc_id) {
            return Err(DialogueError::NoProviderAvailable {
                npc_id: state.npc_id.clone(),
            });
        }
        if state.provider_id == provider_id {
            return Ok(state.clone());
        }

        let from = std::mem::replace(&mut state.provider_id, provider_id.to_string());
        tracing::info!(
            conv_id = %conversation_id,
            from = %from,
            to = %provider_id,
            "Switched provider"
        );
        self.events.publish(DialogueEvent::from_state(
            &state,
            self.clock.now(),
            EventKind::ProviderSwitched {
                from,
                to: provider_id.to_string(),
            },
        ));
        Ok(state.clone())
    }

    /// End conversations idle past the timeout; returns how many ended
    pub async fn cleanup_inactive_conversations(&self) -> usize {
        self.arena
            .sweep_expired(self.clock.now(), self.settings.conversation_timeout, &self.events)
            .await
            .len()
    }

    /// Save every active conversation; returns how many were saved
    pub async fn autosave(&self) -> DialogueResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let states = self.arena.snapshots().await;
        store.replace_active(&states).await?;
        Ok(states.len())
    }

    async fn restore(&self) -> DialogueResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let now = self.clock.now();
        let providers = self.providers.read().await;
        let mut restored = 0;
        for state in store.load_active().await? {
            if !state.is_active || state.is_expired(now, self.settings.conversation_timeout) {
                continue;
            }
            if !providers.contains_key(&state.provider_id) {
                tracing::warn!(
                    conv_id = %state.conversation_id,
                    provider = %state.provider_id,
                    "Dropping saved conversation for unknown provider"
                );
                continue;
            }
            self.arena.insert(state).await;
            restored += 1;
        }
        Ok(restored)
    }

    /// Start the periodic cleanup and autosave task if it is not running
    pub async fn start_maintenance(self: &Arc<Self>) {
        let mut slot = self.maintenance.lock().await;
        if slot.is_none() {
            *slot = Some(MaintenanceHandle::spawn(
                Arc::downgrade(self),
                self.config.cleanup_interval(),
            ));
        }
    }

    pub async fn is_maintenance_running(&self) -> bool {
        self.maintenance
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.join.is_finished())
    }

    /// Stop the maintenance task and save one last time
    pub async fn shutdown(&self) -> DialogueResult<()> {
        let handle = self.maintenance.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        let saved = self.autosave().await?;
        tracing::info!(saved, "Dialogue manager shut down");
        Ok(())
    }
}
