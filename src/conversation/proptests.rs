//! Property-based tests for choice selection and conversation lifecycle

use super::*;
use crate::testing::greet_tree;
use crate::tree::DialogueChoice;
use chrono::{Duration, Utc};
use proptest::prelude::*;

fn arb_choices() -> impl Strategy<Value = Vec<DialogueChoice>> {
    proptest::collection::vec("[a-z]{3,10}( [a-z]{3,10}){0,3}", 1..8).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| DialogueChoice {
                id: (i + 1).to_string(),
                text,
                ..DialogueChoice::default()
            })
            .collect()
    })
}

proptest! {
    /// Ordinal n always picks the nth eligible choice
    #[test]
    fn prop_ordinal_picks_nth(choices in arb_choices(), pick in 0usize..10) {
        let eligible: Vec<_> = choices.iter().collect();
        let picked = select_choice(&(pick + 1).to_string(), &eligible, NumericSelection::Ordinal);
        prop_assert_eq!(picked.map(|c| c.id.clone()), choices.get(pick).map(|c| c.id.clone()));
    }

    /// Words of two characters or fewer never select anything
    #[test]
    fn prop_short_words_never_match(
        choices in arb_choices(),
        input in "[a-z]{1,2}( [a-z]{1,2}){0,3}",
    ) {
        let eligible: Vec<_> = choices.iter().collect();
        prop_assert!(select_choice(&input, &eligible, NumericSelection::Ordinal).is_none());
    }

    /// Any choice's full text selects a choice whose text shares a word with it
    #[test]
    fn prop_text_selects_some_choice(choices in arb_choices(), idx in 0usize..8) {
        let idx = idx % choices.len();
        let eligible: Vec<_> = choices.iter().collect();
        let input = choices[idx].text.to_uppercase();
        let picked = select_choice(&input, &eligible, NumericSelection::Ordinal);
        prop_assert!(picked.is_some());
        let picked = picked.unwrap();
        prop_assert!(choices.iter().position(|c| c.id == picked.id).unwrap() <= idx);
    }

    /// However often it is asked, a conversation finishes exactly once
    #[test]
    fn prop_finish_is_once(attempts in 1usize..6) {
        let mut state = ConversationState::new("p1", "smith", "canned", &greet_tree(), Utc::now());
        let successes = (0..attempts).filter(|_| state.finish(EndReason::Explicit)).count();
        prop_assert_eq!(successes, 1);
        prop_assert!(!state.is_active);
    }

    /// Turns never make a conversation look idle
    #[test]
    fn prop_touch_resets_idle(idle_minutes in 0i64..120, timeout_minutes in 1i64..60) {
        let start = Utc::now();
        let mut state = ConversationState::new("p1", "smith", "canned", &greet_tree(), start);
        let now = start + Duration::minutes(idle_minutes);
        state.touch(now);
        prop_assert!(!state.is_expired(now, Duration::minutes(timeout_minutes)));
    }
}
