//! The turn state machine: entering nodes, selecting choices, ending

use super::arena::conclude;
use super::matching::select_choice;
use super::state::{ConversationState, EndReason};
use crate::config::EngineSettings;
use crate::context::DialogueContext;
use crate::error::{DialogueError, DialogueResult};
use crate::events::{DialogueEvent, EventBus, EventKind};
use crate::provider::{ChoiceView, DialogueResponse};
use crate::rules::{set_variable, ActionExecutor, VariableResolver};
use crate::tree::{DialogueChoice, DialogueNode, DialogueTree};
use chrono::{DateTime, Utc};

/// Everything one turn reads. Constructed per call while the conversation's
/// lock is held; never stored.
pub struct Turn<'a> {
    pub tree: &'a DialogueTree,
    pub executor: &'a ActionExecutor,
    pub events: &'a EventBus,
    pub settings: &'a EngineSettings,
    pub now: DateTime<Utc>,
}

impl Turn<'_> {
    /// Enter the start node of a freshly created conversation
    pub fn begin(
        &self,
        state: &mut ConversationState,
        ctx: &mut DialogueContext,
    ) -> DialogueResult<DialogueResponse> {
        let start = state.current_node_id.clone();
        let node = self.enter(state, ctx, &start)?;
        if node.is_end {
            tracing::debug!(conv_id = %state.conversation_id, "Start node is an end node");
            conclude(state, EndReason::Completed, self.events, self.now);
        }
        Ok(self.respond(state, ctx, node))
    }

    /// Apply one line of player input
    pub fn advance(
        &self,
        state: &mut ConversationState,
        ctx: &mut DialogueContext,
        input: &str,
    ) -> DialogueResult<DialogueResponse> {
        let node = self.node(&state.current_node_id)?;
        let eligible = self.eligible(node, ctx);

        let target = if eligible.is_empty() {
            node.next_node_id.clone()
        } else {
            let Some(choice) = select_choice(input, &eligible, self.settings.numeric_selection)
            else {
                tracing::debug!(
                    conv_id = %state.conversation_id,
                    node_id = %node.id,
                    "Input matched no choice"
                );
                let mut response = self.respond(state, ctx, node);
                response
                    .message
                    .push_str(&self.settings.not_understood_suffix);
                return Ok(response);
            };

            self.executor.execute_all(&choice.actions, ctx);
            self.events.publish(DialogueEvent::from_context(
                ctx,
                EventKind::DialogueChoiceMade {
                    node_id: node.id.clone(),
                    choice_id: choice.id.clone(),
                },
            ));
            choice
                .next_node_id
                .clone()
                .or_else(|| node.next_node_id.clone())
        };

        let Some(target) = target.filter(|t| !t.is_empty()) else {
            return Ok(self.farewell(state, ctx));
        };

        let next = self.enter(state, ctx, &target)?;
        if next.is_end {
            conclude(state, EndReason::Completed, self.events, self.now);
        } else {
            self.events.publish(DialogueEvent::from_context(
                ctx,
                EventKind::ConversationContinued {
                    node_id: target.clone(),
                    input: input.to_string(),
                },
            ));
        }
        Ok(self.respond(state, ctx, next))
    }

    fn node(&self, node_id: &str) -> DialogueResult<&DialogueNode> {
        self.tree
            .node(node_id)
            .ok_or_else(|| DialogueError::NodeNotFound {
                tree_id: self.tree.id.clone(),
                node_id: node_id.to_string(),
            })
    }

    /// Move to `node_id` and run its arrival effects if its conditions hold
    fn enter(
        &self,
        state: &mut ConversationState,
        ctx: &mut DialogueContext,
        node_id: &str,
    ) -> DialogueResult<&DialogueNode> {
        let node = self.node(node_id)?;
        state.current_node_id = node_id.to_string();
        state.history.push(node_id.to_string());
        ctx.conversation.current_node_id = node_id.to_string();

        if self.executor.evaluator().evaluate_all(&node.conditions, ctx) {
            for (name, value) in &node.variables {
                set_variable(self.events, ctx, name, value.clone());
            }
            self.executor.execute_all(&node.actions, ctx);
        } else {
            tracing::debug!(
                conv_id = %state.conversation_id,
                node_id = %node_id,
                "Node conditions not met, skipping arrival effects"
            );
        }

        self.events.publish(DialogueEvent::from_context(
            ctx,
            EventKind::DialogueNodeReached {
                node_id: node_id.to_string(),
            },
        ));
        Ok(node)
    }

    fn eligible<'t>(
        &self,
        node: &'t DialogueNode,
        ctx: &DialogueContext,
    ) -> Vec<&'t DialogueChoice> {
        node.choices
            .iter()
            .filter(|c| self.executor.evaluator().allows(c.condition.as_ref(), ctx))
            .collect()
    }

    fn farewell(&self, state: &mut ConversationState, ctx: &DialogueContext) -> DialogueResponse {
        ctx.sync_into(state);
        conclude(state, EndReason::Completed, self.events, self.now);
        DialogueResponse {
            conversation_id: state.conversation_id.clone(),
            message: VariableResolver::resolve(&self.settings.farewell_message, ctx),
            choices: None,
            is_complete: true,
            state: state.clone(),
            variables: state.variables.clone(),
        }
    }

    /// Render `node` for the player and fold the turn's writes into `state`
    fn respond(
        &self,
        state: &mut ConversationState,
        ctx: &DialogueContext,
        node: &DialogueNode,
    ) -> DialogueResponse {
        ctx.sync_into(state);
        let message = VariableResolver::resolve(&node.message, ctx);
        let choices = if state.is_active {
            let views: Vec<ChoiceView> = self
                .eligible(node, ctx)
                .into_iter()
                .enumerate()
                .map(|(i, choice)| ChoiceView {
                    id: choice.id.clone(),
                    text: VariableResolver::resolve(&choice.text, ctx),
                    index: i + 1,
                })
                .collect();
            (!views.is_empty()).then_some(views)
        } else {
            None
        };

        DialogueResponse {
            conversation_id: state.conversation_id.clone(),
            message,
            choices,
            is_complete: !state.is_active,
            state: state.clone(),
            variables: state.variables.clone(),
        }
    }
}
