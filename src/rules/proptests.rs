//! Property-based tests for condition operators and placeholder substitution

use super::*;
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Generators
// ============================================================================

fn arb_known_operator() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Equals),
        Just(Operator::NotEquals),
        Just(Operator::GreaterThan),
        Just(Operator::LessThan),
        Just(Operator::Has),
        Just(Operator::NotHas),
        Just(Operator::In),
        Just(Operator::NotIn),
    ]
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Positive and negative operators are exact complements
    #[test]
    fn prop_negative_operators_complement(
        actual in proptest::option::of(arb_scalar()),
        expected in arb_scalar(),
    ) {
        let a = actual.as_ref();
        prop_assert_ne!(
            compare_values(a, &expected, Operator::Equals),
            compare_values(a, &expected, Operator::NotEquals)
        );
        prop_assert_ne!(
            compare_values(a, &expected, Operator::Has),
            compare_values(a, &expected, Operator::NotHas)
        );
    }

    /// Nothing is both greater and less than the same value
    #[test]
    fn prop_ordering_is_exclusive(a in any::<i32>(), b in any::<i32>()) {
        let (a, b) = (json!(a), json!(b));
        prop_assert!(
            !(compare_values(Some(&a), &b, Operator::GreaterThan)
                && compare_values(Some(&a), &b, Operator::LessThan))
        );
    }

    /// An absent value satisfies only negative operators
    #[test]
    fn prop_absent_only_satisfies_negatives(op in arb_known_operator(), expected in arb_scalar()) {
        let holds = compare_values(None, &expected, op);
        let negative = matches!(op, Operator::NotEquals | Operator::NotHas | Operator::NotIn);
        prop_assert_eq!(holds, negative);
    }

    /// Text without placeholders passes through unchanged
    #[test]
    fn prop_plain_text_untouched(text in "[a-zA-Z0-9 .,!?{}]{0,60}") {
        prop_assume!(!text.contains("{{"));
        let root = json!({"player": {"name": "Ada"}});
        prop_assert_eq!(VariableResolver::resolve_value(&text, &root), text);
    }

    /// Unresolvable paths leave the placeholder exactly as written
    #[test]
    fn prop_unknown_path_left_verbatim(key in "[a-z]{1,10}", prefix in "[a-zA-Z ]{0,20}") {
        let root = json!({"known": 1});
        prop_assume!(key != "known");
        let text = format!("{prefix}{{{{{key}.missing}}}}");
        prop_assert_eq!(VariableResolver::resolve_value(&text, &root), text);
    }

    /// Known string values are substituted raw
    #[test]
    fn prop_known_string_substituted(name in "[a-zA-Z]{1,16}") {
        let root = json!({"player": {"name": name.clone()}});
        prop_assert_eq!(
            VariableResolver::resolve_value("Hello {{player.name}}", &root),
            format!("Hello {name}")
        );
    }
}
