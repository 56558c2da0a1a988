// ============================================
// Interaction Tracker
// ============================================
//
// Per-user like/dislike history. Recording the same (item, label) twice is a
// no-op; an item may carry both labels if the user changed their mind, in
// which case it counts on both sides of the preference split.

use crate::models::{Interaction, ItemId, Label};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

#[derive(Default)]
pub struct InteractionTracker {
    by_user: DashMap<String, Vec<Interaction>>,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the interaction was already recorded
    pub fn record(&self, user_id: &str, item_id: ItemId, label: Label) -> bool {
        let interaction = Interaction::new(item_id, label);
        let mut history = self.by_user.entry(user_id.to_string()).or_default();

        if history.contains(&interaction) {
            return false;
        }

        debug!(
            user_id = user_id,
            item_id = %interaction.item_id,
            label = ?interaction.label,
            "Interaction recorded"
        );
        history.push(interaction);
        true
    }

    /// Interactions in recording order
    pub fn interactions(&self, user_id: &str) -> Vec<Interaction> {
        self.by_user
            .get(user_id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }
}

/// Interactions divided into the two preference sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSplit {
    pub liked: Vec<ItemId>,
    pub disliked: Vec<ItemId>,
    /// Every id mentioned by an interaction, excluded from the candidates
    pub input_ids: Vec<ItemId>,
}

/// Split by label, keeping first-seen order and dropping repeats
pub fn split_labels(interactions: &[Interaction]) -> LabelSplit {
    let mut split = LabelSplit::default();
    let mut seen_liked = HashSet::new();
    let mut seen_disliked = HashSet::new();
    let mut seen_input = HashSet::new();

    for interaction in interactions {
        let id = &interaction.item_id;
        let inserted = match interaction.label {
            Label::Liked => seen_liked.insert(id.clone()),
            Label::Disliked => seen_disliked.insert(id.clone()),
        };
        if inserted {
            match interaction.label {
                Label::Liked => split.liked.push(id.clone()),
                Label::Disliked => split.disliked.push(id.clone()),
            }
        }
        if seen_input.insert(id.clone()) {
            split.input_ids.push(id.clone());
        }
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let tracker = InteractionTracker::new();

        assert!(tracker.record("u1", ItemId::from("1"), Label::Liked));
        assert!(!tracker.record("u1", ItemId::from("1"), Label::Liked));
        assert!(tracker.record("u1", ItemId::from("1"), Label::Disliked));

        assert_eq!(tracker.interactions("u1").len(), 2);
        assert!(tracker.interactions("u2").is_empty());
    }

    #[test]
    fn test_unknown_user_has_no_history() {
        assert!(InteractionTracker::new().interactions("nobody").is_empty());
    }

    #[test]
    fn test_split_labels() {
        let interactions = vec![
            Interaction::liked("3"),
            Interaction::disliked("4"),
            Interaction::liked("3"),
            Interaction::disliked("3"),
        ];

        let split = split_labels(&interactions);

        assert_eq!(split.liked, vec![ItemId::from("3")]);
        assert_eq!(split.disliked, vec![ItemId::from("4"), ItemId::from("3")]);
        assert_eq!(split.input_ids, vec![ItemId::from("3"), ItemId::from("4")]);
    }
}
