use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::groups::GroupRegistry;
use crate::ids::{GroupId, ItemId};

/// The caller's verdict on a pending comparison, from the point of view of
/// the item being positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    /// The active item outranks the opponent.
    Greater,
    /// The opponent outranks the active item.
    Less,
    /// Both belong in the same tie group.
    Equal,
}

impl Choice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greater => "greater",
            Self::Less => "less",
            Self::Equal => "equal",
        }
    }
}

/// Inclusive index window into `ranked_order`. `low > high` means the
/// insertion point (`low`) has been found but not committed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub low: i64,
    pub high: i64,
}

impl SearchBounds {
    pub fn covering(len: usize) -> Self {
        Self {
            low: 0,
            high: len as i64 - 1,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.low > self.high
    }

    pub fn mid(&self) -> i64 {
        (self.low + self.high).div_euclid(2)
    }
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self { low: 0, high: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortState {
    /// Best-known total order, most important group first.
    pub ranked_order: Vec<GroupId>,
    pub unranked: VecDeque<ItemId>,
    pub active_item: Option<ItemId>,
    pub bounds: SearchBounds,
    pub is_complete: bool,
}

impl SortState {
    pub fn remaining(&self) -> usize {
        self.unranked.len() + usize::from(self.active_item.is_some())
    }
}

/// What kind of mutation a history entry precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionTag {
    Compare(Choice),
    Remove(ItemId),
}

impl DecisionTag {
    pub fn is_comparison(&self) -> bool {
        matches!(self, Self::Compare(_))
    }
}

/// Independent deep copy of everything a decision can mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: SortState,
    pub groups: GroupRegistry,
    pub removed: BTreeSet<ItemId>,
}

impl Snapshot {
    pub fn capture(state: &SortState, groups: &GroupRegistry, removed: &BTreeSet<ItemId>) -> Self {
        Self {
            state: state.clone(),
            groups: groups.clone(),
            removed: removed.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tag: DecisionTag,
    pub snapshot: Snapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_mid_floors() {
        let b = SearchBounds { low: 0, high: 3 };
        assert_eq!(b.mid(), 1);
        let b = SearchBounds { low: 2, high: 2 };
        assert_eq!(b.mid(), 2);
        assert!(!b.is_resolved());
        assert!(SearchBounds { low: 1, high: 0 }.is_resolved());
    }

    #[test]
    fn covering_empty_order_is_resolved() {
        let b = SearchBounds::covering(0);
        assert_eq!(b, SearchBounds { low: 0, high: -1 });
        assert!(b.is_resolved());
    }

    #[test]
    fn snapshot_is_independent_of_source() {
        let mut groups = GroupRegistry::new();
        let g = groups.create_singleton(ItemId::new(1)).unwrap();
        let mut state = SortState {
            ranked_order: vec![g],
            ..SortState::default()
        };
        let removed = BTreeSet::new();

        let snap = Snapshot::capture(&state, &groups, &removed);
        state.ranked_order.clear();
        groups.create_singleton(ItemId::new(2)).unwrap();

        assert_eq!(snap.state.ranked_order, vec![g]);
        assert_eq!(snap.groups.group_count(), 1);
    }
}
