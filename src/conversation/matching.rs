//! Mapping free-text player input onto a choice

use crate::tree::DialogueChoice;
use serde::{Deserialize, Serialize};

/// How an integer input picks a choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericSelection {
    /// The nth eligible choice as displayed, counting from 1
    #[default]
    Ordinal,
    /// The choice whose id parses to the same integer
    ChoiceId,
}

/// Pick a choice from `eligible` (already filtered and in display order).
///
/// Integer input is resolved by `policy` and never falls through to text
/// matching. Otherwise any input word longer than two characters that appears
/// inside a choice's text selects it; the first such choice wins.
pub fn select_choice<'a>(
    input: &str,
    eligible: &[&'a DialogueChoice],
    policy: NumericSelection,
) -> Option<&'a DialogueChoice> {
    let normalized = input.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    if let Ok(number) = normalized.parse::<i64>() {
        return match policy {
            NumericSelection::Ordinal => usize::try_from(number)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| eligible.get(i))
                .copied(),
            NumericSelection::ChoiceId => eligible
                .iter()
                .find(|c| c.id.trim().parse::<i64>().ok() == Some(number))
                .copied(),
        };
    }

    let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();
    if words.is_empty() {
        return None;
    }

    eligible
        .iter()
        .find(|choice| {
            let text = choice.text.to_lowercase();
            words.iter().any(|w| text.contains(w))
        })
        .copied()
}
