pub mod config;
pub mod error;
pub mod history;
pub mod materialize;
pub mod progress;

pub use config::EngineConfig;
pub use error::EngineError;
pub use history::HistoryStack;
pub use materialize::{ItemStatus, RankStyle, RankedEntry};
pub use progress::ProgressEstimate;

use std::collections::BTreeSet;

use pairsort_core::{
    Choice, CoreError, DecisionTag, GroupId, GroupRegistry, HistoryEntry, Item, ItemId, ItemStore,
    PersistedSession, SearchBounds, Snapshot, SortState,
    ids::{BackupId, SessionId},
    session::{PersistedHistoryEntry, PersistedItem, PersistedRegistry, SESSION_FORMAT_VERSION},
};
use pairsort_storage::{SessionStore, StorageError};
use tracing::{debug, info, warn};

use crate::progress::ProgressInputs;

/// A pairwise question for the caller: how does `item_a` (the item being
/// placed) compare with `item_b` (the representative of a ranked group)?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub item_a: ItemId,
    pub item_b: ItemId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done,
    NeedsComparison(Comparison),
}

/// Pending comparison plus the tie groups on each side, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonView {
    pub comparison: Comparison,
    pub group_a: Vec<ItemId>,
    pub group_b: Vec<ItemId>,
    /// Index into the ranked order being probed.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored {
        tag: DecisionTag,
        /// Comparison pending again after the restore, if any.
        comparison: Option<Comparison>,
    },
    NothingToUndo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    Live,
    Backup(BackupId),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    index: usize,
    opponent_group: GroupId,
    comparison: Comparison,
}

/// Incremental binary-insertion sort over tie groups.
///
/// The caller owns the engine and drives it: `advance` yields the next
/// comparison, `record_decision` answers it. All mutation goes through
/// `record_decision`, `remove`, `restore` and `undo`; the first two push a
/// full snapshot onto the history stack before touching anything.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    items: ItemStore,
    state: SortState,
    groups: GroupRegistry,
    removed: BTreeSet<ItemId>,
    history: HistoryStack,
}

impl Engine {
    /// Start a ranking over bare ids. The first id seeds the ranked order;
    /// the rest queue up in the given order.
    pub fn initialize(item_ids: &[ItemId]) -> Result<Self, EngineError> {
        let items = item_ids.iter().copied().map(Item::bare).collect();
        Self::with_items(items, EngineConfig::default())
    }

    pub fn with_items(items: Vec<Item>, config: EngineConfig) -> Result<Self, EngineError> {
        let store = ItemStore::new(items).map_err(|e| match e {
            CoreError::InvalidInput(msg) => EngineError::InvalidInput(msg),
            CoreError::DuplicateItem(id) => {
                EngineError::InvalidInput(format!("item id {id} appears more than once"))
            }
            other => EngineError::Core(other),
        })?;
        Self::from_store(store, config)
    }

    /// Start a ranking over an already-built store, keeping its order and
    /// annotations.
    pub fn from_store(items: ItemStore, config: EngineConfig) -> Result<Self, EngineError> {
        let ids = items.ids();
        let Some((first, rest)) = ids.split_first() else {
            return Err(EngineError::InvalidInput("item list is empty".into()));
        };

        let mut groups = GroupRegistry::new();
        for item_id in &ids {
            groups.create_singleton(*item_id)?;
        }
        let first_group = groups
            .group_of(*first)
            .ok_or_else(|| EngineError::Precondition(format!("item {first} has no group")))?;

        let state = SortState {
            ranked_order: vec![first_group],
            unranked: rest.iter().copied().collect(),
            active_item: None,
            bounds: SearchBounds::default(),
            is_complete: false,
        };
        info!(items = ids.len(), "ranking initialized");

        Ok(Self {
            history: HistoryStack::new(config.history_limit),
            config,
            items,
            state,
            groups,
            removed: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Driving the sort
    // ========================================================================

    /// Run the state machine until it needs a comparison or has nothing left
    /// to place. Resolved insertions are committed along the way.
    pub fn advance(&mut self) -> Result<Step, EngineError> {
        loop {
            if self.state.active_item.is_none() {
                match self.state.unranked.pop_front() {
                    Some(item_id) => {
                        self.state.active_item = Some(item_id);
                        self.state.bounds = SearchBounds::covering(self.state.ranked_order.len());
                        debug!(item = %item_id, "new item to place");
                    }
                    None => {
                        if !self.state.is_complete {
                            info!(groups = self.state.ranked_order.len(), "ranking complete");
                        }
                        self.state.is_complete = true;
                        return Ok(Step::Done);
                    }
                }
            }

            if self.state.bounds.is_resolved() {
                self.commit_active()?;
                continue;
            }

            let pending = self
                .pending()?
                .ok_or_else(|| EngineError::Precondition("no item is being placed".into()))?;
            debug!(
                item_a = %pending.comparison.item_a,
                item_b = %pending.comparison.item_b,
                group = %pending.opponent_group,
                "comparison needed"
            );
            return Ok(Step::NeedsComparison(pending.comparison));
        }
    }

    /// Apply the caller's verdict on the pending comparison, then advance.
    pub fn record_decision(&mut self, choice: Choice) -> Result<Step, EngineError> {
        let pending = self.pending()?.ok_or_else(|| {
            EngineError::Precondition("record_decision called with no comparison pending".into())
        })?;
        let active = pending.comparison.item_a;
        let active_group = self
            .groups
            .group_of(active)
            .ok_or_else(|| EngineError::Precondition(format!("item {active} has no group")))?;

        self.snapshot(DecisionTag::Compare(choice));
        let mid = pending.index as i64;
        match choice {
            Choice::Greater => self.state.bounds.high = mid - 1,
            Choice::Less => self.state.bounds.low = mid + 1,
            Choice::Equal => {
                let merged = self.groups.merge(pending.opponent_group, active_group)?;
                self.state.ranked_order[pending.index] = merged;
                self.state.active_item = None;
                debug!(
                    item_a = %active,
                    item_b = %pending.comparison.item_b,
                    group = %merged,
                    "items tied, groups merged"
                );
            }
        }
        debug!(choice = choice.as_str(), bounds = ?self.state.bounds, "decision recorded");
        self.advance()
    }

    /// Take an item out of the ranking. Works mid-search, including on the
    /// item being placed. Undoable.
    pub fn remove(&mut self, item_id: ItemId) -> Result<Step, EngineError> {
        self.require_known(item_id)?;
        if self.removed.contains(&item_id) {
            return Err(EngineError::Precondition(format!("item {item_id} is already removed")));
        }

        self.snapshot(DecisionTag::Remove(item_id));
        self.removed.insert(item_id);
        if self.state.active_item == Some(item_id) {
            self.state.active_item = None;
        }
        self.state.unranked.retain(|id| *id != item_id);

        if let Some((group_id, true)) = self.groups.detach(item_id)
            && let Some(index) = self.state.ranked_order.iter().position(|g| *g == group_id)
        {
            self.state.ranked_order.remove(index);
            if self.state.active_item.is_some() {
                self.shift_bounds_after_removal(index);
            }
        }
        debug!(item = %item_id, "item removed from ranking");
        self.advance()
    }

    /// Put a removed item back at the end of the queue in a fresh singleton
    /// group. Not recorded in history: an undo after a restore rolls back
    /// whatever came before it.
    pub fn restore(&mut self, item_id: ItemId) -> Result<(), EngineError> {
        self.require_known(item_id)?;
        if !self.removed.contains(&item_id) {
            return Err(EngineError::Precondition(format!("item {item_id} is not removed")));
        }
        self.groups.create_singleton(item_id)?;
        self.removed.remove(&item_id);
        self.state.unranked.push_back(item_id);
        self.state.is_complete = false;
        debug!(item = %item_id, "item restored to ranking");
        Ok(())
    }

    /// Roll back the most recent comparison or removal.
    pub fn undo(&mut self) -> Result<UndoOutcome, EngineError> {
        let Some(entry) = self.history.pop() else {
            debug!("nothing to undo");
            return Ok(UndoOutcome::NothingToUndo);
        };
        if let Err(e) = check_invariants(
            &entry.snapshot.state,
            &entry.snapshot.groups,
            &entry.snapshot.removed,
            &self.items,
        ) {
            warn!(tag = ?entry.tag, error = %e, "history entry is corrupt, left in place");
            self.history.push(entry.tag, entry.snapshot);
            return Err(e);
        }
        let HistoryEntry { tag, snapshot } = entry;
        self.state = snapshot.state;
        self.groups = snapshot.groups;
        self.removed = snapshot.removed;
        debug!(?tag, depth = self.history.depth(), "undid last action");

        let comparison = self.pending()?.map(|p| p.comparison);
        Ok(UndoOutcome::Restored { tag, comparison })
    }

    /// Set or clear (with empty text) an item's annotation. Allowed at any
    /// time and never recorded in history.
    pub fn annotate(&mut self, item_id: ItemId, text: &str) -> Result<(), EngineError> {
        self.require_known(item_id)?;
        self.items.annotate(item_id, text)?;
        Ok(())
    }

    fn snapshot(&mut self, tag: DecisionTag) {
        let snapshot = Snapshot::capture(&self.state, &self.groups, &self.removed);
        self.history.push(tag, snapshot);
    }

    fn require_known(&self, item_id: ItemId) -> Result<(), EngineError> {
        if self.items.contains(item_id) {
            Ok(())
        } else {
            Err(EngineError::UnknownItem(item_id))
        }
    }

    /// The comparison implied by the current bounds, or `None` when no
    /// search is in progress.
    fn pending(&self) -> Result<Option<Pending>, EngineError> {
        let Some(active) = self.state.active_item else {
            return Ok(None);
        };
        if self.state.bounds.is_resolved() {
            return Ok(None);
        }
        let mid = self.state.bounds.mid();
        let index = usize::try_from(mid).map_err(|_| EngineError::corrupt(None, mid))?;
        let group_id = *self
            .state
            .ranked_order
            .get(index)
            .ok_or_else(|| EngineError::corrupt(None, mid))?;
        let opponent = self
            .groups
            .representative(group_id)
            .ok_or_else(|| EngineError::corrupt(Some(group_id), mid))?;
        Ok(Some(Pending {
            index,
            opponent_group: group_id,
            comparison: Comparison {
                item_a: active,
                item_b: opponent,
            },
        }))
    }

    fn commit_active(&mut self) -> Result<(), EngineError> {
        let Some(item_id) = self.state.active_item else {
            return Ok(());
        };
        let group_id = self
            .groups
            .group_of(item_id)
            .ok_or_else(|| EngineError::Precondition(format!("item {item_id} has no group")))?;
        let low = self.state.bounds.low;
        let index = usize::try_from(low)
            .ok()
            .filter(|i| *i <= self.state.ranked_order.len())
            .ok_or_else(|| EngineError::corrupt(Some(group_id), low))?;
        self.state.ranked_order.insert(index, group_id);
        self.state.active_item = None;
        debug!(item = %item_id, index, "item placed");
        Ok(())
    }

    /// Keep the search window on the same candidate groups after the ranked
    /// group at `index` disappeared.
    fn shift_bounds_after_removal(&mut self, index: usize) {
        let index = index as i64;
        let bounds = &mut self.state.bounds;
        if index < bounds.low {
            bounds.low -= 1;
            bounds.high -= 1;
        } else if index <= bounds.high {
            bounds.high -= 1;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_complete(&self) -> bool {
        self.state.is_complete
    }

    pub fn state(&self) -> &SortState {
        &self.state
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn ranked_groups(&self) -> &[GroupId] {
        &self.state.ranked_order
    }

    pub fn removed_items(&self) -> &BTreeSet<ItemId> {
        &self.removed
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(item_id)
    }

    pub fn annotation(&self, item_id: ItemId) -> Option<&str> {
        self.items.annotation(item_id)
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.depth()
    }

    pub fn last_history_tag(&self) -> Option<DecisionTag> {
        self.history.last_tag()
    }

    /// Independent copy of the mutable ranking state.
    pub fn snapshot_state(&self) -> Snapshot {
        Snapshot::capture(&self.state, &self.groups, &self.removed)
    }

    /// Read-only view of the pending comparison with both tie groups.
    pub fn current_comparison(&self) -> Result<Option<ComparisonView>, EngineError> {
        let Some(pending) = self.pending()? else {
            return Ok(None);
        };
        let group_a = self
            .groups
            .group_of(pending.comparison.item_a)
            .and_then(|g| self.groups.members(g))
            .map(<[ItemId]>::to_vec)
            .unwrap_or_default();
        let group_b = self
            .groups
            .members(pending.opponent_group)
            .map(<[ItemId]>::to_vec)
            .unwrap_or_default();
        Ok(Some(ComparisonView {
            comparison: pending.comparison,
            group_a,
            group_b,
            index: pending.index,
        }))
    }

    pub fn estimate_progress(&self) -> ProgressEstimate {
        let placed = self
            .state
            .ranked_order
            .iter()
            .map(|g| self.groups.size(*g))
            .sum();
        let inputs = ProgressInputs {
            active_total: self.items.len().saturating_sub(self.removed.len()),
            placed,
            decisions: self.history.decision_count(),
            groups: self.state.ranked_order.len(),
            remaining_items: self.state.remaining(),
        };
        progress::estimate(
            inputs,
            self.config.estimate_min_decisions,
            self.config.estimate_min_groups,
        )
    }

    /// Ranked list in the configured style. Usable mid-sort for partial
    /// export.
    pub fn materialize(&self, include_unplaced: bool) -> Result<Vec<RankedEntry>, EngineError> {
        self.materialize_with_style(include_unplaced, self.config.rank_style)
    }

    pub fn materialize_with_style(
        &self,
        include_unplaced: bool,
        style: RankStyle,
    ) -> Result<Vec<RankedEntry>, EngineError> {
        materialize::materialize(
            &self.state,
            &self.groups,
            &self.removed,
            &self.items,
            include_unplaced,
            style,
        )
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check every structural invariant. Used when loading persisted state;
    /// a failure means the session cannot be trusted.
    pub fn validate(&self) -> Result<(), EngineError> {
        check_invariants(&self.state, &self.groups, &self.removed, &self.items)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn to_session(&self) -> PersistedSession {
        PersistedSession {
            version: SESSION_FORMAT_VERSION,
            items: self.items.items().iter().map(PersistedItem::from).collect(),
            annotations: self
                .items
                .annotations()
                .iter()
                .map(|(id, text)| (*id, text.clone()))
                .collect(),
            state: self.state.clone(),
            groups: PersistedRegistry::from(&self.groups),
            removed: self.removed.iter().copied().collect(),
            history: self.history.entries().map(PersistedHistoryEntry::from).collect(),
        }
    }

    /// Rebuild an engine from persisted state, rejecting anything that
    /// violates the ranking invariants.
    pub fn from_session(session: PersistedSession, config: EngineConfig) -> Result<Self, EngineError> {
        let mut items = ItemStore::new(session.items.into_iter().map(Item::from).collect())?;
        items.load_annotations(session.annotations)?;
        let groups = GroupRegistry::try_from(session.groups)?;
        let history = session
            .history
            .into_iter()
            .map(HistoryEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let removed = session.removed.into_iter().collect();
        for (depth, entry) in history.iter().enumerate() {
            let snapshot = &entry.snapshot;
            if let Err(e) =
                check_invariants(&snapshot.state, &snapshot.groups, &snapshot.removed, &items)
            {
                warn!(depth, error = %e, "persisted history entry failed validation");
                return Err(e);
            }
        }

        let engine = Self {
            history: HistoryStack::from_entries(history, config.history_limit),
            config,
            items,
            state: session.state,
            groups,
            removed,
        };
        if let Err(e) = engine.validate() {
            warn!(error = %e, "persisted session failed validation");
            return Err(e);
        }
        Ok(engine)
    }

    /// Write the current state to a store. Timing is the caller's business.
    pub fn save<S: SessionStore>(&self, store: &mut S, session_id: SessionId) -> Result<(), EngineError> {
        store.save_session(session_id, &self.to_session())?;
        Ok(())
    }

    pub fn load<S: SessionStore>(
        store: &S,
        session_id: SessionId,
        config: EngineConfig,
    ) -> Result<Option<Self>, EngineError> {
        match store.load_session(session_id)? {
            Some(session) => Ok(Some(Self::from_session(session, config)?)),
            None => Ok(None),
        }
    }
}

/// Structural invariants shared by the live state and every history snapshot.
fn check_invariants(
    state: &SortState,
    groups: &GroupRegistry,
    removed: &BTreeSet<ItemId>,
    items: &ItemStore,
) -> Result<(), EngineError> {
    let invalid = |msg: String| EngineError::Core(CoreError::InvalidData(msg));

    let mut ranked = BTreeSet::new();
    for (index, group_id) in state.ranked_order.iter().enumerate() {
        if !groups.contains(*group_id) {
            return Err(EngineError::corrupt(Some(*group_id), index as i64));
        }
        if !ranked.insert(*group_id) {
            return Err(invalid(format!("group {group_id} ranked twice")));
        }
    }

    let mut queued = BTreeSet::new();
    for item_id in state.active_item.iter().chain(state.unranked.iter()) {
        if !items.contains(*item_id) {
            return Err(invalid(format!("queued item {item_id} is unknown")));
        }
        if !queued.insert(*item_id) {
            return Err(invalid(format!("item {item_id} queued twice")));
        }
        let group_id = groups
            .group_of(*item_id)
            .ok_or_else(|| invalid(format!("queued item {item_id} has no group")))?;
        if ranked.contains(&group_id) {
            return Err(invalid(format!("queued item {item_id} is already ranked")));
        }
    }

    for item in items.items() {
        let grouped = groups.group_of(item.id);
        let is_removed = removed.contains(&item.id);
        match (grouped, is_removed) {
            (Some(_), true) => {
                return Err(invalid(format!("removed item {} is still grouped", item.id)));
            }
            (None, false) => {
                return Err(invalid(format!("item {} has no group", item.id)));
            }
            (Some(group_id), false) => {
                if !ranked.contains(&group_id) && !queued.contains(&item.id) {
                    return Err(invalid(format!(
                        "item {} is neither ranked nor queued",
                        item.id
                    )));
                }
            }
            (None, true) => {}
        }
    }
    if removed.iter().any(|id| !items.contains(*id)) {
        return Err(invalid("removed set contains unknown items".into()));
    }
    if groups.item_to_group().len() + removed.len() != items.len() {
        return Err(invalid("registry covers items outside the store".into()));
    }

    if state.active_item.is_some() {
        let bounds = state.bounds;
        let len = state.ranked_order.len() as i64;
        let in_range = if bounds.is_resolved() {
            (0..=len).contains(&bounds.low)
        } else {
            bounds.low >= 0 && bounds.high < len
        };
        if !in_range {
            return Err(invalid(format!("search bounds {bounds:?} out of range")));
        }
    }

    if state.is_complete && (state.active_item.is_some() || !state.unranked.is_empty()) {
        return Err(invalid("ranking marked complete with items still queued".into()));
    }
    Ok(())
}

fn is_corruption(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::CorruptState { .. }
            | EngineError::Core(_)
            | EngineError::Storage(StorageError::ChecksumMismatch(_))
            | EngineError::Storage(StorageError::Core(_))
            | EngineError::Storage(StorageError::Serialization(_))
    )
}

/// Load a session, falling back to its backups (newest first) when the live
/// copy is corrupt. A usable backup is promoted to the live slot. Returns
/// `None` when nothing was ever saved under `session_id`.
pub fn recover_session<S: SessionStore>(
    store: &mut S,
    session_id: SessionId,
    config: EngineConfig,
) -> Result<Option<(Engine, RecoverySource)>, EngineError> {
    let live_err = match Engine::load(store, session_id, config.clone()) {
        Ok(Some(engine)) => return Ok(Some((engine, RecoverySource::Live))),
        Ok(None) => None,
        Err(e) if is_corruption(&e) => Some(e),
        Err(e) => return Err(e),
    };

    for backup in store.list_backups(session_id)? {
        let candidate = match store.load_backup(backup.backup_id) {
            Ok(Some(session)) => Engine::from_session(session, config.clone()),
            Ok(None) => continue,
            Err(e) => Err(EngineError::from(e)),
        };
        match candidate {
            Ok(engine) => {
                store.restore_backup(backup.backup_id)?;
                info!(%session_id, backup_id = %backup.backup_id, "session recovered from backup");
                return Ok(Some((engine, RecoverySource::Backup(backup.backup_id))));
            }
            Err(e) if is_corruption(&e) => {
                warn!(backup_id = %backup.backup_id, error = %e, "backup unusable");
            }
            Err(e) => return Err(e),
        }
    }

    match live_err {
        Some(e) => Err(e),
        None => Ok(None),
    }
}
