//! Branching NPC dialogue engine
//!
//! Content-defined dialogue trees are walked turn by turn for each
//! (player, NPC) pair. Conditions gate choices, actions apply side effects and
//! announce them on an event bus, and `{{path}}` placeholders in NPC text are
//! filled from the player, NPC, conversation and world state.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod events;
pub mod manager;
pub mod provider;
pub mod rules;
pub mod store;
pub mod tree;

#[cfg(test)]
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DialogueConfig, EngineSettings, PersistenceConfig};
pub use context::{
    DialogueContext, NpcSnapshot, Participants, PlayerSnapshot, QuestProgress, WorldSnapshot,
};
pub use conversation::{ConversationState, EndReason, NumericSelection};
pub use error::{ContentError, DialogueError, DialogueResult, ErrorClass, StoreError};
pub use events::{DialogueEvent, EventBus, EventKind};
pub use manager::DialogueManager;
pub use provider::{
    CannedProvider, ChoiceView, DialogueProvider, DialogueResponse, ProviderContext, ProviderKind,
};
pub use rules::{Action, ActionKind, Check, Condition, CustomActionHook, Operator};
pub use store::{ConversationStore, MemoryConversationStore, SqliteConversationStore};
pub use tree::{DialogueChoice, DialogueNode, DialogueTree};
