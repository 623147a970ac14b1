//! Conversation state, the arena that owns it, and the turn state machine

mod arena;
mod matching;
mod state;
mod turn;

#[cfg(test)]
mod proptests;

pub use arena::{ConversationArena, ConversationCell};
pub(crate) use arena::conclude;
pub use matching::{select_choice, NumericSelection};
pub use state::{ConversationState, EndReason};
pub use turn::Turn;
