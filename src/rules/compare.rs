//! Operator semantics shared by every value-reading condition

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Has,
    NotHas,
    In,
    NotIn,
    /// Anything content names that the engine does not know
    #[serde(other)]
    Unknown,
}

impl Operator {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// Compare an observed value with the value content expects.
///
/// `actual` is `None` when the value is absent from the context. An absent
/// value equals nothing (not even `null`) and contains nothing, so the
/// negative operators are the only ones that can hold for it.
pub fn compare_values(actual: Option<&Value>, expected: &Value, operator: Operator) -> bool {
    match operator {
        Operator::Equals => actual.is_some_and(|a| loosely_equal(a, expected)),
        Operator::NotEquals => !actual.is_some_and(|a| loosely_equal(a, expected)),
        Operator::GreaterThan => {
            actual.is_some_and(|a| order(a, expected) == Some(Ordering::Greater))
        }
        Operator::LessThan => actual.is_some_and(|a| order(a, expected) == Some(Ordering::Less)),
        Operator::Has => actual.is_some_and(|a| contains(a, expected)),
        Operator::NotHas => !actual.is_some_and(|a| contains(a, expected)),
        Operator::In => actual.is_some_and(|a| contains(expected, a)),
        Operator::NotIn => !actual.is_some_and(|a| contains(expected, a)),
        Operator::Unknown => false,
    }
}

/// Equality that treats `5` and `5.0` as the same number
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Whether `haystack` holds `needle`: array element, substring, or object key
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::String(text) => needle.as_str().is_some_and(|n| text.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
        _ => false,
    }
}
