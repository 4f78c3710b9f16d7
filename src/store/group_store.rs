//! Group storage with a reverse track-membership index.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::EditError;
use crate::events::Signal;
use crate::model::{Frame, Group, GroupId, TrackId};
use crate::store::StoreChange;

/// Owns the groups of one camera.
pub struct GroupStore {
    groups: BTreeMap<GroupId, Group>,
    /// Reverse index: track id -> groups containing it.
    member_index: BTreeMap<TrackId, BTreeSet<GroupId>>,
    changes: Signal<StoreChange>,
    next_id: GroupId,
}

impl GroupStore {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
            member_index: BTreeMap::new(),
            changes: Signal::new(),
            next_id: 1,
        }
    }

    pub fn changes_mut(&mut self) -> &mut Signal<StoreChange> {
        &mut self.changes
    }

    pub fn new_group_id(&mut self) -> GroupId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Create a group from a non-empty member map and register it.
    pub fn add(
        &mut self,
        group_type: impl Into<String>,
        members: BTreeMap<TrackId, Vec<(Frame, Frame)>>,
    ) -> Result<GroupId, EditError> {
        if members.is_empty() {
            return Err(EditError::invalid_state("cannot create a group with no members"));
        }
        let id = self.new_group_id();
        let group = Group::new(id, group_type, members);
        self.insert(group);
        Ok(id)
    }

    /// Register an existing group (e.g. loaded from persistence).
    pub fn insert(&mut self, group: Group) {
        let id = group.id();
        self.next_id = self.next_id.max(id + 1);
        for track_id in group.member_ids() {
            self.member_index.entry(track_id).or_default().insert(id);
        }
        self.groups.insert(id, group);
        self.changes.emit(&StoreChange::GroupUpsert(id));
        log::debug!("GroupStore: added group {id}");
    }

    pub fn remove(&mut self, id: GroupId) -> Option<Group> {
        let removed = self.groups.remove(&id);
        if let Some(group) = &removed {
            for track_id in group.member_ids() {
                if let Some(set) = self.member_index.get_mut(&track_id) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.member_index.remove(&track_id);
                    }
                }
            }
            self.changes.emit(&StoreChange::GroupDelete(id));
            log::debug!("GroupStore: removed group {id}");
        }
        removed
    }

    pub fn get(&self, id: GroupId) -> Result<&Group, EditError> {
        self.groups.get(&id).ok_or(EditError::GroupNotFound { id })
    }

    pub fn get_possible(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Mutate a group through a closure, keeping the reverse index and
    /// observers in sync. Returns the closure result.
    pub fn modify<R>(
        &mut self,
        id: GroupId,
        f: impl FnOnce(&mut Group) -> R,
    ) -> Result<R, EditError> {
        let group = self.groups.get_mut(&id).ok_or(EditError::GroupNotFound { id })?;
        let before: BTreeSet<TrackId> = group.member_ids().into_iter().collect();
        let out = f(group);
        let after: BTreeSet<TrackId> = group.member_ids().into_iter().collect();

        for removed in before.difference(&after) {
            if let Some(set) = self.member_index.get_mut(removed) {
                set.remove(&id);
                if set.is_empty() {
                    self.member_index.remove(removed);
                }
            }
        }
        for added in after.difference(&before) {
            self.member_index.entry(*added).or_default().insert(id);
        }
        self.changes.emit(&StoreChange::GroupUpsert(id));
        Ok(out)
    }

    /// Groups containing `track_id`. Used to warn before track deletion.
    pub fn lookup_groups(&self, track_id: TrackId) -> Vec<GroupId> {
        self.member_index
            .get(&track_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Strip a deleted track from every group. Groups left empty are removed.
    /// Returns the ids of groups that were deleted.
    pub fn remove_track_membership(&mut self, track_id: TrackId) -> Vec<GroupId> {
        let group_ids = self.lookup_groups(track_id);
        let mut deleted = Vec::new();
        for id in group_ids {
            let emptied = self
                .modify(id, |g| {
                    g.remove_members(&[track_id]);
                    g.is_empty()
                })
                .unwrap_or(false);
            if emptied {
                self.remove(id);
                deleted.push(id);
            }
        }
        deleted
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Default for GroupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GroupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupStore")
            .field("groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(entries: &[(TrackId, (Frame, Frame))]) -> BTreeMap<TrackId, Vec<(Frame, Frame)>> {
        entries.iter().map(|(id, r)| (*id, vec![*r])).collect()
    }

    #[test]
    fn test_lookup_groups_reverse_index() {
        let mut store = GroupStore::new();
        let g1 = store.add("feeding", members(&[(10, (0, 5)), (11, (0, 5))])).unwrap();
        let g2 = store.add("chasing", members(&[(10, (6, 9))])).unwrap();

        assert_eq!(store.lookup_groups(10), vec![g1, g2]);
        assert_eq!(store.lookup_groups(11), vec![g1]);
        assert!(store.lookup_groups(99).is_empty());
    }

    #[test]
    fn test_empty_member_list_rejected() {
        let mut store = GroupStore::new();
        assert!(store.add("feeding", BTreeMap::new()).is_err());
    }

    #[test]
    fn test_modify_updates_reverse_index() {
        let mut store = GroupStore::new();
        let id = store.add("feeding", members(&[(10, (0, 5))])).unwrap();

        store
            .modify(id, |g| g.add_members(members(&[(11, (2, 4))])))
            .unwrap();
        assert_eq!(store.lookup_groups(11), vec![id]);

        store.modify(id, |g| {
            g.remove_members(&[10]);
        })
        .unwrap();
        assert!(store.lookup_groups(10).is_empty());
    }

    #[test]
    fn test_remove_track_membership_deletes_emptied_groups() {
        let mut store = GroupStore::new();
        let solo = store.add("feeding", members(&[(10, (0, 5))])).unwrap();
        let pair = store.add("chasing", members(&[(10, (0, 5)), (11, (0, 5))])).unwrap();

        let deleted = store.remove_track_membership(10);
        assert_eq!(deleted, vec![solo]);
        assert!(store.get_possible(solo).is_none());
        assert!(store.get(pair).unwrap().contains(11));
        assert!(!store.get(pair).unwrap().contains(10));
    }
}
