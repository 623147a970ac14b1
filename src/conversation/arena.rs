//! Manager-owned table of active conversations

use super::state::{ConversationState, EndReason};
use crate::events::{DialogueEvent, EventBus, EventKind};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one conversation; holding the lock is holding the turn
pub type ConversationCell = Arc<Mutex<ConversationState>>;

#[derive(Debug)]
struct ArenaEntry {
    player_id: String,
    cell: ConversationCell,
}

/// Active conversations keyed by id.
///
/// The map lock is only held for lookups and membership changes. Turn work
/// happens under the per-conversation mutex, so turns on different
/// conversations never contend and turns on the same one are serialised.
#[derive(Debug, Default)]
pub struct ConversationArena {
    entries: RwLock<HashMap<String, ArenaEntry>>,
}

impl ConversationArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, state: ConversationState) -> ConversationCell {
        let id = state.conversation_id.clone();
        let player_id = state.player_id.clone();
        let cell = Arc::new(Mutex::new(state));
        self.entries.write().await.insert(
            id,
            ArenaEntry {
                player_id,
                cell: cell.clone(),
            },
        );
        cell
    }

    pub async fn get(&self, conversation_id: &str) -> Option<ConversationCell> {
        self.entries
            .read()
            .await
            .get(conversation_id)
            .map(|e| e.cell.clone())
    }

    /// Drop from the table without touching the state itself
    pub async fn remove(&self, conversation_id: &str) -> Option<ConversationCell> {
        self.entries
            .write()
            .await
            .remove(conversation_id)
            .map(|e| e.cell)
    }

    pub async fn contains(&self, conversation_id: &str) -> bool {
        self.entries.read().await.contains_key(conversation_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of one conversation's state; waits for any turn in flight
    pub async fn snapshot(&self, conversation_id: &str) -> Option<ConversationState> {
        let cell = self.get(conversation_id).await?;
        let state = cell.lock().await.clone();
        Some(state)
    }

    pub async fn snapshots(&self) -> Vec<ConversationState> {
        let cells: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .map(|e| e.cell.clone())
            .collect();
        let mut states = Vec::with_capacity(cells.len());
        for cell in cells {
            states.push(cell.lock().await.clone());
        }
        states.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        states
    }

    pub async fn for_player(&self, player_id: &str) -> Vec<ConversationState> {
        let cells: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.player_id == player_id)
            .map(|e| e.cell.clone())
            .collect();
        let mut states = Vec::with_capacity(cells.len());
        for cell in cells {
            states.push(cell.lock().await.clone());
        }
        states.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        states
    }

    /// Number of conversations a player holds, across every provider
    pub async fn count_for_player(&self, player_id: &str) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.player_id == player_id)
            .count()
    }

    pub async fn ids_for_provider(&self, provider_id: &str) -> Vec<String> {
        let cells: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.cell.clone()))
            .collect();
        let mut ids = Vec::new();
        for (id, cell) in cells {
            if cell.lock().await.provider_id == provider_id {
                ids.push(id);
            }
        }
        ids
    }

    /// Remove a conversation and end it with `reason`.
    ///
    /// Returns the final state, or `None` if the id was not in the table.
    /// An in-flight turn finishes before the end is applied.
    pub async fn end(
        &self,
        conversation_id: &str,
        reason: EndReason,
        events: &EventBus,
        now: DateTime<Utc>,
    ) -> Option<ConversationState> {
        let cell = self.remove(conversation_id).await?;
        let mut state = cell.lock().await;
        conclude(&mut state, reason, events, now);
        Some(state.clone())
    }

    /// End every conversation idle past `timeout`, skipping any whose turn
    /// lock is currently held. Returns the ids that were ended.
    pub async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
        events: &EventBus,
    ) -> Vec<String> {
        let cells: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.cell.clone()))
            .collect();

        let mut ended = Vec::new();
        for (id, cell) in cells {
            let Ok(mut state) = cell.try_lock() else {
                tracing::debug!(conv_id = %id, "Turn in flight, skipping sweep");
                continue;
            };
            if state.is_active && !state.is_expired(now, timeout) {
                continue;
            }
            self.entries.write().await.remove(&id);
            conclude(&mut state, EndReason::Timeout, events, now);
            ended.push(id);
        }
        ended
    }
}

/// The single termination path: mark inactive and announce it, once
pub(crate) fn conclude(
    state: &mut ConversationState,
    reason: EndReason,
    events: &EventBus,
    now: DateTime<Utc>,
) -> bool {
    if !state.finish(reason) {
        return false;
    }
    tracing::info!(
        conv_id = %state.conversation_id,
        player_id = %state.player_id,
        reason = ?reason,
        turns = state.turn_count,
        "Conversation ended"
    );
    events.publish(DialogueEvent::from_state(
        state,
        now,
        EventKind::ConversationEnded { reason },
    ));
    true
}
