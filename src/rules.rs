//! Content rules: conditions, actions and placeholder substitution

mod action;
mod compare;
mod condition;
mod resolver;

#[cfg(test)]
mod proptests;

pub use action::{Action, ActionExecutor, ActionKind, CustomActionHook, NoopHook};
pub(crate) use action::set_variable;
pub use compare::{compare_values, Operator};
pub use condition::{Check, Condition, ConditionEvaluator, RandomSource};
pub use resolver::VariableResolver;
