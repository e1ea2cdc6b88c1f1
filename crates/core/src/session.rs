use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::groups::GroupRegistry;
use crate::ids::{GroupId, ItemId};
use crate::item::Item;
use crate::state::{DecisionTag, HistoryEntry, Snapshot, SortState};

pub const SESSION_FORMAT_VERSION: u32 = 1;

// Every map below is written as an ordered list of pairs so the layout
// survives formats without a native map type.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedItem {
    pub id: ItemId,
    pub fields: Vec<(String, FieldValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRegistry {
    pub groups: Vec<(GroupId, Vec<ItemId>)>,
    pub item_to_group: Vec<(ItemId, GroupId)>,
    pub next_group: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub state: SortState,
    pub groups: PersistedRegistry,
    pub removed: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHistoryEntry {
    pub tag: DecisionTag,
    pub snapshot: PersistedSnapshot,
}

/// Full engine state in the shape handed to a persistence adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u32,
    pub items: Vec<PersistedItem>,
    pub annotations: Vec<(ItemId, String)>,
    pub state: SortState,
    pub groups: PersistedRegistry,
    pub removed: Vec<ItemId>,
    /// Oldest entry first.
    pub history: Vec<PersistedHistoryEntry>,
}

impl PersistedSession {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        let session: Self =
            rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))?;
        if session.version != SESSION_FORMAT_VERSION {
            return Err(CoreError::InvalidData(format!(
                "unsupported session format version {}",
                session.version
            )));
        }
        Ok(session)
    }
}

impl From<&Item> for PersistedItem {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            fields: item
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl From<PersistedItem> for Item {
    fn from(item: PersistedItem) -> Self {
        Item::new(item.id, item.fields.into_iter().collect())
    }
}

impl From<&GroupRegistry> for PersistedRegistry {
    fn from(reg: &GroupRegistry) -> Self {
        Self {
            groups: reg
                .groups()
                .iter()
                .map(|(g, members)| (*g, members.clone()))
                .collect(),
            item_to_group: reg.item_to_group().iter().map(|(i, g)| (*i, *g)).collect(),
            next_group: reg.next_group(),
        }
    }
}

impl TryFrom<PersistedRegistry> for GroupRegistry {
    type Error = CoreError;

    fn try_from(reg: PersistedRegistry) -> Result<Self, CoreError> {
        GroupRegistry::from_parts(reg.groups, reg.item_to_group, reg.next_group)
    }
}

impl From<&Snapshot> for PersistedSnapshot {
    fn from(snap: &Snapshot) -> Self {
        Self {
            state: snap.state.clone(),
            groups: PersistedRegistry::from(&snap.groups),
            removed: snap.removed.iter().copied().collect(),
        }
    }
}

impl TryFrom<PersistedSnapshot> for Snapshot {
    type Error = CoreError;

    fn try_from(snap: PersistedSnapshot) -> Result<Self, CoreError> {
        Ok(Self {
            state: snap.state,
            groups: GroupRegistry::try_from(snap.groups)?,
            removed: snap.removed.into_iter().collect(),
        })
    }
}

impl From<&HistoryEntry> for PersistedHistoryEntry {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            tag: entry.tag,
            snapshot: PersistedSnapshot::from(&entry.snapshot),
        }
    }
}

impl TryFrom<PersistedHistoryEntry> for HistoryEntry {
    type Error = CoreError;

    fn try_from(entry: PersistedHistoryEntry) -> Result<Self, CoreError> {
        Ok(Self {
            tag: entry.tag,
            snapshot: Snapshot::try_from(entry.snapshot)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Choice;
    use std::collections::BTreeSet;

    fn sample() -> PersistedSession {
        let mut groups = GroupRegistry::new();
        let g0 = groups.create_singleton(ItemId::new(0)).unwrap();
        let g1 = groups.create_singleton(ItemId::new(1)).unwrap();
        let state = SortState {
            ranked_order: vec![g0],
            unranked: [ItemId::new(1)].into_iter().collect(),
            ..SortState::default()
        };
        let snapshot = Snapshot::capture(&state, &groups, &BTreeSet::new());
        let merged = groups.merge(g0, g1).unwrap();
        let after = SortState {
            ranked_order: vec![merged],
            ..SortState::default()
        };

        let mut fields = std::collections::BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::from("Spotlight"));

        PersistedSession {
            version: SESSION_FORMAT_VERSION,
            items: vec![
                PersistedItem::from(&Item::new(ItemId::new(0), fields)),
                PersistedItem::from(&Item::bare(ItemId::new(1))),
            ],
            annotations: vec![(ItemId::new(0), "needs budget".into())],
            state: after,
            groups: PersistedRegistry::from(&groups),
            removed: Vec::new(),
            history: vec![PersistedHistoryEntry::from(&HistoryEntry {
                tag: DecisionTag::Compare(Choice::Equal),
                snapshot,
            })],
        }
    }

    #[test]
    fn msgpack_preserves_nested_history() {
        let session = sample();
        let bytes = session.to_msgpack().unwrap();
        let back = PersistedSession::from_msgpack(&bytes).unwrap();
        assert_eq!(back, session);

        let entry = HistoryEntry::try_from(back.history[0].clone()).unwrap();
        assert_eq!(entry.snapshot.groups.group_count(), 2);
    }

    #[test]
    fn unknown_version_rejected() {
        let mut session = sample();
        session.version = 99;
        let bytes = session.to_msgpack().unwrap();
        assert!(matches!(
            PersistedSession::from_msgpack(&bytes),
            Err(CoreError::InvalidData(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_a_serialization_error() {
        assert!(matches!(
            PersistedSession::from_msgpack(&[0xc1, 0x00, 0x12]),
            Err(CoreError::Serialization(_))
        ));
    }
}
