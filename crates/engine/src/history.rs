use std::collections::VecDeque;

use pairsort_core::{DecisionTag, HistoryEntry, Snapshot};
use tracing::warn;

/// Linear undo stack of full pre-decision snapshots. There is no redo side:
/// a new decision after an undo simply builds on the restored state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStack {
    entries: VecDeque<HistoryEntry>,
    limit: Option<usize>,
}

impl HistoryStack {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    /// Rebuild from persisted entries, oldest first. The limit is applied
    /// immediately.
    pub fn from_entries(entries: Vec<HistoryEntry>, limit: Option<usize>) -> Self {
        let mut stack = Self::new(limit);
        for entry in entries {
            stack.push_entry(entry);
        }
        stack
    }

    pub fn push(&mut self, tag: DecisionTag, snapshot: Snapshot) {
        self.push_entry(HistoryEntry { tag, snapshot });
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        // Enforce depth limit by dropping oldest entry
        if let Some(limit) = self.limit
            && self.entries.len() > limit
        {
            self.entries.pop_front();
            warn!(limit, "history limit reached, oldest entry dropped");
        }
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_tag(&self) -> Option<DecisionTag> {
        self.entries.back().map(|e| e.tag)
    }

    /// Comparison verdicts still on the stack. Removals don't count, and
    /// undone verdicts are gone with their entries.
    pub fn decision_count(&self) -> usize {
        self.entries.iter().filter(|e| e.tag.is_comparison()).count()
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairsort_core::{Choice, GroupRegistry, ItemId, SortState};
    use std::collections::BTreeSet;

    fn snapshot(marker: u32) -> Snapshot {
        let state = SortState {
            unranked: [ItemId::new(marker)].into_iter().collect(),
            ..SortState::default()
        };
        Snapshot::capture(&state, &GroupRegistry::new(), &BTreeSet::new())
    }

    #[test]
    fn pop_returns_most_recent() {
        let mut stack = HistoryStack::new(None);
        stack.push(DecisionTag::Compare(Choice::Less), snapshot(1));
        stack.push(DecisionTag::Remove(ItemId::new(4)), snapshot(2));

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.last_tag(), Some(DecisionTag::Remove(ItemId::new(4))));
        assert_eq!(stack.decision_count(), 1);

        let top = stack.pop().unwrap();
        assert_eq!(top.snapshot, snapshot(2));
        assert_eq!(stack.pop().unwrap().snapshot, snapshot(1));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn limit_drops_oldest() {
        let mut stack = HistoryStack::new(Some(2));
        for n in 0..5 {
            stack.push(DecisionTag::Compare(Choice::Greater), snapshot(n));
        }
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap().snapshot, snapshot(4));
        assert_eq!(stack.pop().unwrap().snapshot, snapshot(3));
    }
}
