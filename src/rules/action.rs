//! Side effects applied when a node is reached or a choice is taken

use super::condition::{Condition, ConditionEvaluator};
use crate::context::DialogueContext;
use crate::events::{DialogueEvent, EventBus, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An action as authored in content, with an optional gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            condition: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    SetVariable {
        target: String,
        #[serde(default)]
        value: Value,
    },
    GiveItem {
        target: String,
        #[serde(default = "one")]
        quantity: u32,
    },
    TakeItem {
        target: String,
        #[serde(default = "one")]
        quantity: u32,
    },
    AddFlag {
        target: String,
    },
    RemoveFlag {
        target: String,
    },
    StartQuest {
        target: String,
    },
    CompleteQuest {
        target: String,
    },
    /// Delegated to the provider's [`CustomActionHook`]
    Custom {
        target: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetVariable { .. } => "set_variable",
            Self::GiveItem { .. } => "give_item",
            Self::TakeItem { .. } => "take_item",
            Self::AddFlag { .. } => "add_flag",
            Self::RemoveFlag { .. } => "remove_flag",
            Self::StartQuest { .. } => "start_quest",
            Self::CompleteQuest { .. } => "complete_quest",
            Self::Custom { .. } => "custom",
            Self::Unknown => "unknown",
        }
    }
}

/// Extension point for `custom` actions
pub trait CustomActionHook: Send + Sync {
    fn run(&self, name: &str, params: &Value, ctx: &mut DialogueContext) -> Result<(), String>;
}

/// Hook used when a provider does not supply one
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl CustomActionHook for NoopHook {
    fn run(&self, name: &str, _params: &Value, _ctx: &mut DialogueContext) -> Result<(), String> {
        tracing::debug!(action = %name, "No custom action hook installed, ignoring");
        Ok(())
    }
}

#[derive(Debug, Error)]
enum ActionError {
    #[error("unknown action type")]
    UnknownType,
    #[error("custom action {name} failed: {message}")]
    Hook { name: String, message: String },
}

/// Applies actions to a [`DialogueContext`].
///
/// Inventory and quest actions are not applied here. They are announced on
/// the event bus for the owning system to pick up.
#[derive(Clone)]
pub struct ActionExecutor {
    evaluator: ConditionEvaluator,
    events: EventBus,
    hook: Arc<dyn CustomActionHook>,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor").finish_non_exhaustive()
    }
}

impl ActionExecutor {
    pub fn new(
        evaluator: ConditionEvaluator,
        events: EventBus,
        hook: Arc<dyn CustomActionHook>,
    ) -> Self {
        Self {
            evaluator,
            events,
            hook,
        }
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    /// Run one action. Returns whether it was applied; a failed gate or a
    /// failing action both come back as `false` and never as an error.
    pub fn execute(&self, action: &Action, ctx: &mut DialogueContext) -> bool {
        if !self.evaluator.allows(action.condition.as_ref(), ctx) {
            tracing::debug!(
                conv_id = %ctx.conversation.id,
                action = action.kind.name(),
                "Action gate not met, skipping"
            );
            return false;
        }

        match self.apply(&action.kind, ctx) {
            Ok(()) => {
                self.events.publish(DialogueEvent::from_context(
                    ctx,
                    EventKind::DialogueActionExecuted {
                        action: action.clone(),
                        context: ctx.to_value().unwrap_or(Value::Null),
                    },
                ));
                true
            }
            Err(e) => {
                tracing::warn!(
                    conv_id = %ctx.conversation.id,
                    action = action.kind.name(),
                    error = %e,
                    "Action failed, skipping"
                );
                false
            }
        }
    }

    /// Run actions in order, carrying on past failures; returns how many applied
    pub fn execute_all(&self, actions: &[Action], ctx: &mut DialogueContext) -> usize {
        actions.iter().filter(|a| self.execute(a, ctx)).count()
    }

    fn apply(&self, kind: &ActionKind, ctx: &mut DialogueContext) -> Result<(), ActionError> {
        match kind {
            ActionKind::SetVariable { target, value } => {
                set_variable(&self.events, ctx, target, value.clone());
                Ok(())
            }
            ActionKind::AddFlag { target } => {
                ctx.player.add_flag(target);
                Ok(())
            }
            ActionKind::RemoveFlag { target } => {
                ctx.player.remove_flag(target);
                Ok(())
            }
            ActionKind::GiveItem { .. }
            | ActionKind::TakeItem { .. }
            | ActionKind::StartQuest { .. }
            | ActionKind::CompleteQuest { .. } => Ok(()),
            ActionKind::Custom { target, value } => {
                self.hook
                    .run(target, value, ctx)
                    .map_err(|message| ActionError::Hook {
                        name: target.clone(),
                        message,
                    })
            }
            ActionKind::Unknown => Err(ActionError::UnknownType),
        }
    }
}

/// Write a conversation variable, announcing it when the value changes
pub(crate) fn set_variable(events: &EventBus, ctx: &mut DialogueContext, name: &str, value: Value) {
    let previous = ctx
        .conversation
        .variables
        .insert(name.to_string(), value.clone());
    if previous.as_ref() != Some(&value) {
        events.publish(DialogueEvent::from_context(
            ctx,
            EventKind::DialogueVariableChanged {
                name: name.to_string(),
                previous,
                value,
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::QuestProgress;
    use crate::testing::{drain, test_context, RecordingHook};
    use serde_json::json;

    fn executor(events: &EventBus) -> ActionExecutor {
        ActionExecutor::new(
            ConditionEvaluator::new(Arc::new(ManualClock::default())),
            events.clone(),
            Arc::new(NoopHook),
        )
    }

    fn parse(value: Value) -> Action {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_set_variable_emits_change_once() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let mut ctx = test_context();
        let exec = executor(&events);
        let action = parse(json!({"type": "set_variable", "target": "price", "value": 30}));

        assert!(exec.execute(&action, &mut ctx));
        assert!(exec.execute(&action, &mut ctx));
        assert_eq!(ctx.conversation.variables.get("price"), Some(&json!(30)));

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            names,
            vec![
                "DIALOGUE_VARIABLE_CHANGED",
                "DIALOGUE_ACTION_EXECUTED",
                "DIALOGUE_ACTION_EXECUTED"
            ]
        );
    }

    #[test]
    fn test_flags_are_idempotent() {
        let events = EventBus::new(16);
        let mut ctx = test_context();
        let exec = executor(&events);
        let add = parse(json!({"type": "add_flag", "target": "met_smith"}));
        let remove = parse(json!({"type": "remove_flag", "target": "met_smith"}));

        exec.execute(&add, &mut ctx);
        exec.execute(&add, &mut ctx);
        assert_eq!(ctx.player.flags, vec!["met_smith".to_string()]);

        exec.execute(&remove, &mut ctx);
        assert!(exec.execute(&remove, &mut ctx));
        assert!(ctx.player.flags.is_empty());
    }

    #[test]
    fn test_give_item_only_announces() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let mut ctx = test_context();
        let action = parse(json!({"type": "give_item", "target": "iron_sword"}));

        assert!(executor(&events).execute(&action, &mut ctx));
        assert!(ctx.player.inventory.is_empty());

        let emitted = drain(&mut rx);
        assert_eq!(emitted.len(), 1);
        match &emitted[0].kind {
            EventKind::DialogueActionExecuted { action, context } => {
                assert_eq!(
                    action.kind,
                    ActionKind::GiveItem {
                        target: "iron_sword".to_string(),
                        quantity: 1
                    }
                );
                assert_eq!(context.pointer("/player/id"), Some(&json!("p1")));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(emitted[0].player_id, "p1");
    }

    #[test]
    fn test_take_item_and_quest_actions_only_announce() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let exec = executor(&events);
        let mut ctx = test_context();
        ctx.player.inventory = vec!["ore".into()];
        ctx.player
            .quests
            .insert("deep_mine".to_string(), QuestProgress::with_status("active"));
        let before = ctx.player.clone();

        for doc in [
            json!({"type": "take_item", "target": "ore", "quantity": 1}),
            json!({"type": "start_quest", "target": "smuggler"}),
            json!({"type": "complete_quest", "target": "deep_mine"}),
        ] {
            let action = parse(doc);
            assert!(exec.execute(&action, &mut ctx));
            assert_eq!(ctx.player, before);

            let emitted = drain(&mut rx);
            assert_eq!(emitted.len(), 1, "{}", action.kind.name());
            match &emitted[0].kind {
                EventKind::DialogueActionExecuted { action: announced, .. } => {
                    assert_eq!(announced, &action);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_gated_action_skipped() {
        let events = EventBus::new(16);
        let mut ctx = test_context();
        let action = parse(json!({
            "type": "add_flag",
            "target": "discount",
            "condition": {"type": "level", "operator": "greater_than", "value": 10}
        }));
        assert!(!executor(&events).execute(&action, &mut ctx));
        assert!(ctx.player.flags.is_empty());
    }

    #[test]
    fn test_custom_hook_runs_and_failures_are_skipped() {
        let events = EventBus::new(16);
        let hook = Arc::new(RecordingHook::failing_on("explode"));
        let exec = ActionExecutor::new(
            ConditionEvaluator::new(Arc::new(ManualClock::default())),
            events,
            hook.clone(),
        );
        let mut ctx = test_context();
        let actions = vec![
            parse(json!({"type": "custom", "target": "explode"})),
            parse(json!({"type": "custom", "target": "wave", "value": {"times": 2}})),
            parse(json!({"type": "teleport", "target": "moon"})),
            parse(json!({"type": "add_flag", "target": "waved"})),
        ];

        assert_eq!(exec.execute_all(&actions, &mut ctx), 2);
        assert_eq!(hook.calls(), vec!["explode".to_string(), "wave".to_string()]);
        assert!(ctx.player.has_flag("waved"));
    }
}
