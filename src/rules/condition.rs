//! Typed predicates over player, world and conversation state

use super::compare::{compare_values, Operator};
use crate::clock::Clock;
use crate::context::DialogueContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A condition as authored in content: a check plus an optional negation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(flatten)]
    pub check: Check,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

impl Condition {
    pub fn new(check: Check) -> Self {
        Self {
            check,
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

fn has() -> Operator {
    Operator::Has
}

fn greater_than() -> Operator {
    Operator::GreaterThan
}

/// The closed set of checks content may use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// `conversation.variables[target]`
    Variable {
        target: String,
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    /// Membership of `target` in `player.flags`
    Flag {
        target: String,
        #[serde(default = "has")]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    /// Membership or count of `target` in the player's inventory
    Item {
        target: String,
        #[serde(default = "has")]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    /// `player.quests[target].status`
    Quest {
        target: String,
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    Stat {
        target: String,
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    Skill {
        target: String,
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    Level {
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    /// Milliseconds elapsed since the timestamp named by `target`
    Time {
        target: String,
        #[serde(default = "greater_than")]
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
    /// Passes with probability `value` (0.5 when absent)
    Random {
        #[serde(default)]
        value: Option<f64>,
    },
    /// A `type` this engine does not know
    #[serde(other)]
    Unknown,
}

impl Check {
    /// The comparison operator, for checks that have one
    pub fn operator(&self) -> Option<Operator> {
        match self {
            Self::Variable { operator, .. }
            | Self::Flag { operator, .. }
            | Self::Item { operator, .. }
            | Self::Quest { operator, .. }
            | Self::Stat { operator, .. }
            | Self::Skill { operator, .. }
            | Self::Level { operator, .. }
            | Self::Time { operator, .. } => Some(*operator),
            Self::Random { .. } | Self::Unknown => None,
        }
    }
}

#[derive(Debug, Error)]
enum EvalError {
    #[error("unknown condition type")]
    UnknownType,
    #[error("no timestamp for {0}")]
    BadTimestamp(String),
}

/// Source of uniform samples in `[0, 1)` for `random` conditions
pub type RandomSource = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Evaluates conditions; never fails, never panics on content
#[derive(Clone)]
pub struct ConditionEvaluator {
    clock: Arc<dyn Clock>,
    random: RandomSource,
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionEvaluator").finish_non_exhaustive()
    }
}

impl ConditionEvaluator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            random: Arc::new(rand::random::<f64>),
        }
    }

    pub fn with_random_source(mut self, random: RandomSource) -> Self {
        self.random = random;
        self
    }

    /// Evaluate one condition. An unknown type or an unreadable timestamp
    /// counts as `false` whether or not the condition is negated. An unknown
    /// operator compares as `false` and is then negated like any other result.
    pub fn evaluate(&self, condition: &Condition, ctx: &DialogueContext) -> bool {
        if let Some(operator) = condition.check.operator().filter(|op| !op.is_known()) {
            tracing::warn!(
                conv_id = %ctx.conversation.id,
                operator = ?operator,
                check = ?condition.check,
                "Unknown condition operator, comparing as false"
            );
        }
        match self.check(&condition.check, ctx) {
            Ok(result) => result != condition.negate,
            Err(e) => {
                tracing::warn!(
                    conv_id = %ctx.conversation.id,
                    error = %e,
                    check = ?condition.check,
                    "Condition could not be evaluated, treating as false"
                );
                false
            }
        }
    }

    /// Conjunction; an empty list passes
    pub fn evaluate_all(&self, conditions: &[Condition], ctx: &DialogueContext) -> bool {
        conditions.iter().all(|c| self.evaluate(c, ctx))
    }

    /// Evaluate an optional gate; absence passes
    pub fn allows(&self, condition: Option<&Condition>, ctx: &DialogueContext) -> bool {
        condition.map_or(true, |c| self.evaluate(c, ctx))
    }

    fn check(&self, check: &Check, ctx: &DialogueContext) -> Result<bool, EvalError> {
        match check {
            Check::Variable {
                target,
                operator,
                value,
            } => {
                *operator;
                Ok(compare_values(
                    ctx.conversation.variables.get(target),
                    value,
                    *operator,
                ))
            }
            Check::Flag {
                target,
                operator,
                value,
            } => {
                let present = ctx.player.has_flag(target);
                Ok(match *operator {
                    Operator::Has => present,
                    Operator::NotHas => !present,
                    op => compare_values(Some(&Value::Bool(present)), value, op),
                })
            }
            Check::Item {
                target,
                operator,
                value,
            } => {
                let count = ctx.player.item_count(target);
                Ok(match *operator {
                    Operator::Has => count > 0,
                    Operator::NotHas => count == 0,
                    op => compare_values(Some(&Value::from(count)), value, op),
                })
            }
            Check::Quest {
                target,
                operator,
                value,
            } => {
                let op = *operator;
                match ctx.player.quests.get(target) {
                    Some(quest) => Ok(compare_values(
                        Some(&Value::String(quest.status.clone())),
                        value,
                        op,
                    )),
                    None => Ok(matches!(op, Operator::NotHas | Operator::NotEquals)),
                }
            }
            Check::Stat {
                target,
                operator,
                value,
            } => {
                let stat = ctx.player.stats.get(target).map(|v| Value::from(*v));
                Ok(compare_values(stat.as_ref(), value, *operator))
            }
            Check::Skill {
                target,
                operator,
                value,
            } => {
                let skill = ctx.player.skills.get(target).map(|v| Value::from(*v));
                Ok(compare_values(skill.as_ref(), value, *operator))
            }
            Check::Level { operator, value } => Ok(compare_values(
                Some(&Value::from(ctx.player.level)),
                value,
                *operator,
            )),
            Check::Time {
                target,
                operator,
                value,
            } => {
                let op = *operator;
                let since = timestamp(target, ctx)?;
                let elapsed = (self.clock.now() - since).num_milliseconds();
                Ok(compare_values(Some(&Value::from(elapsed)), value, op))
            }
            Check::Random { value } => Ok((self.random)() < value.unwrap_or(0.5)),
            Check::Unknown => Err(EvalError::UnknownType),
        }
    }
}

/// Resolve a `time` target: a conversation timestamp, a conversation variable
/// holding epoch milliseconds, or a literal epoch-milliseconds number.
fn timestamp(target: &str, ctx: &DialogueContext) -> Result<DateTime<Utc>, EvalError> {
    match target {
        "startedAt" | "started_at" => Ok(ctx.conversation.started_at),
        "lastActivity" | "last_activity" => Ok(ctx.conversation.last_activity),
        other => ctx
            .conversation
            .variables
            .get(other)
            .and_then(Value::as_i64)
            .or_else(|| other.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| EvalError::BadTimestamp(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::QuestProgress;
    use crate::testing::test_context;
    use chrono::Duration;
    use serde_json::json;

    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(ManualClock::default()))
    }

    fn parse(value: Value) -> Condition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_variable_equals() {
        let mut ctx = test_context();
        ctx.conversation
            .variables
            .insert("mood".to_string(), json!("happy"));
        let cond = parse(json!({"type": "variable", "target": "mood", "value": "happy"}));
        assert!(evaluator().evaluate(&cond, &ctx));
        let cond = parse(json!({"type": "variable", "target": "mood", "value": "sad"}));
        assert!(!evaluator().evaluate(&cond, &ctx));
    }

    #[test]
    fn test_negate_inverts() {
        let ctx = test_context();
        let cond = parse(json!({"type": "flag", "target": "outlaw", "negate": true}));
        assert!(evaluator().evaluate(&cond, &ctx));
    }

    #[test]
    fn test_flag_membership() {
        let mut ctx = test_context();
        ctx.player.flags.push("met_smith".to_string());
        let has = parse(json!({"type": "flag", "target": "met_smith"}));
        let not_has = parse(json!({"type": "flag", "target": "met_smith", "operator": "not_has"}));
        assert!(evaluator().evaluate(&has, &ctx));
        assert!(!evaluator().evaluate(&not_has, &ctx));
    }

    #[test]
    fn test_item_membership_and_count() {
        let mut ctx = test_context();
        ctx.player.inventory = vec!["coin".into(), "coin".into(), "coin".into()];
        let has = parse(json!({"type": "item", "target": "coin"}));
        let many = parse(json!({
            "type": "item", "target": "coin", "operator": "greater_than", "value": 2
        }));
        let missing = parse(json!({"type": "item", "target": "sword"}));
        assert!(evaluator().evaluate(&has, &ctx));
        assert!(evaluator().evaluate(&many, &ctx));
        assert!(!evaluator().evaluate(&missing, &ctx));
    }

    #[test]
    fn test_quest_status_and_absent_quest() {
        let mut ctx = test_context();
        ctx.player
            .quests
            .insert("rats".to_string(), QuestProgress::with_status("active"));
        let active = parse(json!({"type": "quest", "target": "rats", "value": "active"}));
        assert!(evaluator().evaluate(&active, &ctx));

        let absent_eq = parse(json!({"type": "quest", "target": "dragon", "value": "active"}));
        let absent = |operator: &str, value: Value| {
            parse(json!({
                "type": "quest", "target": "dragon", "operator": operator, "value": value
            }))
        };
        let absent_ne = absent("not_equals", json!("active"));
        let absent_not_has = absent("not_has", json!("x"));
        let absent_not_in = absent("not_in", json!(["done"]));
        assert!(!evaluator().evaluate(&absent_eq, &ctx));
        assert!(evaluator().evaluate(&absent_ne, &ctx));
        assert!(evaluator().evaluate(&absent_not_has, &ctx));
        assert!(!evaluator().evaluate(&absent_not_in, &ctx));
    }

    #[test]
    fn test_stat_skill_level() {
        let mut ctx = test_context();
        ctx.player.level = 5;
        ctx.player.stats.insert("strength".to_string(), 14);
        ctx.player.skills.insert("smithing".to_string(), 3);
        let e = evaluator();
        let check = |doc: Value| e.evaluate(&parse(doc), &ctx);
        assert!(check(json!({"type": "level", "operator": "greater_than", "value": 4})));
        assert!(check(json!({"type": "stat", "target": "strength", "value": 14})));
        assert!(check(json!({
            "type": "skill", "target": "smithing", "operator": "less_than", "value": 5
        })));
        assert!(!check(json!({
            "type": "skill", "target": "alchemy", "operator": "less_than", "value": 5
        })));
    }

    #[test]
    fn test_time_since_start() {
        let clock = Arc::new(ManualClock::default());
        let mut ctx = test_context();
        ctx.conversation.started_at = clock.now();
        let e = ConditionEvaluator::new(clock.clone());
        let cond = parse(json!({"type": "time", "target": "startedAt", "value": 60_000}));
        assert!(!e.evaluate(&cond, &ctx));
        clock.advance(Duration::minutes(2));
        assert!(e.evaluate(&cond, &ctx));
    }

    #[test]
    fn test_time_with_bad_target_fails_closed() {
        let ctx = test_context();
        let cond = parse(json!({"type": "time", "target": "whenever", "value": 0, "negate": true}));
        assert!(!evaluator().evaluate(&cond, &ctx));
    }

    #[test]
    fn test_random_uses_source() {
        let ctx = test_context();
        let always = evaluator().with_random_source(Arc::new(|| 0.0));
        let never = evaluator().with_random_source(Arc::new(|| 0.99));
        let cond = parse(json!({"type": "random"}));
        assert!(always.evaluate(&cond, &ctx));
        assert!(!never.evaluate(&cond, &ctx));
        let likely = parse(json!({"type": "random", "value": 1.0}));
        assert!(never.evaluate(&likely, &ctx));
    }

    #[test]
    fn test_unknown_type_is_false_even_negated() {
        let ctx = test_context();
        let cond = parse(json!({"type": "horoscope", "target": "leo", "negate": true}));
        assert_eq!(cond.check, Check::Unknown);
        assert!(!evaluator().evaluate(&cond, &ctx));
    }

    #[test]
    fn test_unknown_operator_compares_false_then_negates() {
        let ctx = test_context();
        let plain = parse(json!({"type": "level", "operator": "about", "value": 1}));
        let negated = parse(json!({
            "type": "level", "operator": "about", "value": 1, "negate": true
        }));
        assert_eq!(plain.check.operator(), Some(Operator::Unknown));
        assert!(!evaluator().evaluate(&plain, &ctx));
        assert!(evaluator().evaluate(&negated, &ctx));

        let flag = parse(json!({
            "type": "flag", "target": "outlaw", "operator": "roughly", "negate": true
        }));
        let quest = parse(json!({
            "type": "quest", "target": "dragon", "operator": "roughly", "negate": true
        }));
        assert!(evaluator().evaluate(&flag, &ctx));
        assert!(evaluator().evaluate(&quest, &ctx));
    }

    #[test]
    fn test_allows_absent_gate() {
        let ctx = test_context();
        assert!(evaluator().allows(None, &ctx));
        assert!(evaluator().evaluate_all(&[], &ctx));
    }
}
