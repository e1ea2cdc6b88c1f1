use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::ids::{GroupId, ItemId};

/// Partition of the non-removed items into tie groups.
///
/// Two maps are kept in lockstep: group -> members (insertion order) and
/// item -> group. A group with no members never survives a mutation. Merges
/// always allocate a fresh id instead of growing one of the inputs, so ids held
/// by older snapshots keep meaning what they meant when captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRegistry {
    groups: BTreeMap<GroupId, Vec<ItemId>>,
    item_to_group: BTreeMap<ItemId, GroupId>,
    next_group: u64,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> GroupId {
        let id = GroupId::from_raw(self.next_group);
        self.next_group += 1;
        id
    }

    /// Create a singleton group for an item that is not currently grouped.
    pub fn create_singleton(&mut self, item_id: ItemId) -> Result<GroupId, CoreError> {
        if self.item_to_group.contains_key(&item_id) {
            return Err(CoreError::InvalidData(format!(
                "item {item_id} already belongs to a group"
            )));
        }
        let group_id = self.allocate();
        self.groups.insert(group_id, vec![item_id]);
        self.item_to_group.insert(item_id, group_id);
        Ok(group_id)
    }

    pub fn contains(&self, group_id: GroupId) -> bool {
        self.groups.contains_key(&group_id)
    }

    pub fn members(&self, group_id: GroupId) -> Option<&[ItemId]> {
        self.groups.get(&group_id).map(Vec::as_slice)
    }

    /// First-inserted member: the canonical stand-in for the whole group in
    /// every comparison.
    pub fn representative(&self, group_id: GroupId) -> Option<ItemId> {
        self.groups.get(&group_id).and_then(|m| m.first().copied())
    }

    pub fn group_of(&self, item_id: ItemId) -> Option<GroupId> {
        self.item_to_group.get(&item_id).copied()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn size(&self, group_id: GroupId) -> usize {
        self.groups.get(&group_id).map_or(0, Vec::len)
    }

    /// Merge two groups into a brand-new one. Members of `first` come before
    /// members of `second`. Both inputs are deleted.
    pub fn merge(&mut self, first: GroupId, second: GroupId) -> Result<GroupId, CoreError> {
        if first == second {
            return Err(CoreError::InvalidData(format!(
                "cannot merge group {first} with itself"
            )));
        }
        let mut members = self
            .groups
            .remove(&first)
            .ok_or_else(|| CoreError::InvalidData(format!("group {first} not found")))?;
        let tail = match self.groups.remove(&second) {
            Some(tail) => tail,
            None => {
                self.groups.insert(first, members);
                return Err(CoreError::InvalidData(format!("group {second} not found")));
            }
        };
        members.extend(tail);

        let merged = self.allocate();
        for item_id in &members {
            self.item_to_group.insert(*item_id, merged);
        }
        self.groups.insert(merged, members);
        Ok(merged)
    }

    /// Detach an item from its group. Returns the group it left and whether
    /// that group was deleted because it became empty.
    pub fn detach(&mut self, item_id: ItemId) -> Option<(GroupId, bool)> {
        let group_id = self.item_to_group.remove(&item_id)?;
        let emptied = match self.groups.get_mut(&group_id) {
            Some(members) => {
                members.retain(|m| *m != item_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.groups.remove(&group_id);
        }
        Some((group_id, emptied))
    }

    /// Remove a group outright, unmapping its members.
    pub fn delete_group(&mut self, group_id: GroupId) -> Option<Vec<ItemId>> {
        let members = self.groups.remove(&group_id)?;
        for item_id in &members {
            self.item_to_group.remove(item_id);
        }
        Some(members)
    }

    pub fn groups(&self) -> &BTreeMap<GroupId, Vec<ItemId>> {
        &self.groups
    }

    pub fn item_to_group(&self) -> &BTreeMap<ItemId, GroupId> {
        &self.item_to_group
    }

    pub fn next_group(&self) -> u64 {
        self.next_group
    }

    /// Rebuild from the persisted association lists, checking that both maps
    /// agree and no group is empty.
    pub fn from_parts(
        groups: Vec<(GroupId, Vec<ItemId>)>,
        item_to_group: Vec<(ItemId, GroupId)>,
        next_group: u64,
    ) -> Result<Self, CoreError> {
        let groups: BTreeMap<GroupId, Vec<ItemId>> = groups.into_iter().collect();
        let item_to_group: BTreeMap<ItemId, GroupId> = item_to_group.into_iter().collect();

        let mut member_count = 0;
        for (group_id, members) in &groups {
            if members.is_empty() {
                return Err(CoreError::InvalidData(format!("group {group_id} is empty")));
            }
            if group_id.get() >= next_group {
                return Err(CoreError::InvalidData(format!(
                    "group {group_id} is beyond the allocation counter"
                )));
            }
            for item_id in members {
                if item_to_group.get(item_id) != Some(group_id) {
                    return Err(CoreError::InvalidData(format!(
                        "item {item_id} listed in group {group_id} but mapped elsewhere"
                    )));
                }
                member_count += 1;
            }
        }
        if member_count != item_to_group.len() {
            return Err(CoreError::InvalidData(
                "item-to-group map disagrees with group membership".into(),
            ));
        }

        Ok(Self {
            groups,
            item_to_group,
            next_group,
        })
    }
}
