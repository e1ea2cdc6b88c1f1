use std::collections::BTreeMap;

use pairsort_core::{Choice, ItemId};
use pairsort_engine::Comparison;
use rand::Rng;

/// Answers comparisons from a hidden score table. Higher score ranks
/// higher; scores within `tolerance` of each other count as a tie.
#[derive(Debug, Clone, Default)]
pub struct ScoreOracle {
    scores: BTreeMap<ItemId, i64>,
    tolerance: i64,
}

impl ScoreOracle {
    pub fn new(scores: impl IntoIterator<Item = (u32, i64)>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|(id, score)| (ItemId::new(id), score))
                .collect(),
            tolerance: 0,
        }
    }

    /// Random scores in `0..levels` for ids `0..count`. Few levels means
    /// many ties.
    pub fn random<R: Rng>(count: u32, levels: i64, rng: &mut R) -> Self {
        Self::new((0..count).map(|id| (id, rng.gen_range(0..levels))))
    }

    pub fn with_tolerance(mut self, tolerance: i64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn score(&self, item_id: ItemId) -> i64 {
        self.scores.get(&item_id).copied().unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.scores.keys().copied().collect()
    }

    pub fn judge(&self, comparison: Comparison) -> Choice {
        let diff = self.score(comparison.item_a) - self.score(comparison.item_b);
        if diff.abs() <= self.tolerance {
            Choice::Equal
        } else if diff > 0 {
            Choice::Greater
        } else {
            Choice::Less
        }
    }

    /// The grouping a correct sort must produce with zero tolerance: one
    /// group per distinct score, highest first, members in ascending id order.
    pub fn expected_groups(&self) -> Vec<Vec<ItemId>> {
        let mut by_score: BTreeMap<i64, Vec<ItemId>> = BTreeMap::new();
        for (id, score) in &self.scores {
            by_score.entry(*score).or_default().push(*id);
        }
        by_score.into_values().rev().collect()
    }
}
