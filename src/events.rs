//! Dialogue lifecycle events and the broadcast bus that carries them

use crate::context::DialogueContext;
use crate::conversation::{ConversationState, EndReason};
use crate::rules::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One published event, addressed by conversation, player and NPC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueEvent {
    pub conversation_id: String,
    pub player_id: String,
    pub npc_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum EventKind {
    ConversationStarted {
        provider_id: String,
        tree_id: String,
        node_id: String,
    },
    ConversationContinued {
        node_id: String,
        input: String,
    },
    ConversationEnded {
        reason: EndReason,
    },
    DialogueNodeReached {
        node_id: String,
    },
    DialogueChoiceMade {
        node_id: String,
        choice_id: String,
    },
    DialogueActionExecuted {
        action: Action,
        /// Projection of the variable context after the action ran
        context: Value,
    },
    DialogueVariableChanged {
        name: String,
        previous: Option<Value>,
        value: Value,
    },
    ProviderSwitched {
        from: String,
        to: String,
    },
}

impl EventKind {
    /// Wire name of the event type
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationStarted { .. } => "CONVERSATION_STARTED",
            Self::ConversationContinued { .. } => "CONVERSATION_CONTINUED",
            Self::ConversationEnded { .. } => "CONVERSATION_ENDED",
            Self::DialogueNodeReached { .. } => "DIALOGUE_NODE_REACHED",
            Self::DialogueChoiceMade { .. } => "DIALOGUE_CHOICE_MADE",
            Self::DialogueActionExecuted { .. } => "DIALOGUE_ACTION_EXECUTED",
            Self::DialogueVariableChanged { .. } => "DIALOGUE_VARIABLE_CHANGED",
            Self::ProviderSwitched { .. } => "PROVIDER_SWITCHED",
        }
    }
}

impl DialogueEvent {
    pub fn from_state(
        state: &ConversationState,
        timestamp: DateTime<Utc>,
        kind: EventKind,
    ) -> Self {
        Self {
            conversation_id: state.conversation_id.clone(),
            player_id: state.player_id.clone(),
            npc_id: state.npc_id.clone(),
            timestamp,
            kind,
        }
    }

    /// Event raised while a turn is running, stamped with the turn's time
    pub fn from_context(ctx: &DialogueContext, kind: EventKind) -> Self {
        Self {
            conversation_id: ctx.conversation.id.clone(),
            player_id: ctx.player.id.clone(),
            npc_id: ctx.npc.id.clone(),
            timestamp: ctx.conversation.last_activity,
            kind,
        }
    }
}

/// Fan-out of [`DialogueEvent`]s to any number of subscribers.
///
/// Publishing never blocks a turn. Slow subscribers lag and lose the oldest
/// events rather than holding the engine back.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DialogueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: DialogueEvent) {
        tracing::debug!(
            conv_id = %event.conversation_id,
            event = event.kind.name(),
            "Publishing dialogue event"
        );
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
