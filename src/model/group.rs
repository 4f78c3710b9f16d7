//! Group data model: a weighted-membership aggregate over tracks.
//!
//! Groups tie multiple tracks together for multi-object events. Each member
//! participates during one or more `[begin, end]` frame ranges; the group's
//! own temporal extent is derived from those ranges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::track::{ConfidencePair, Frame, GroupId, TrackId};

/// Serialized form of a group, the persistence contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupData {
    pub id: GroupId,
    pub begin: Frame,
    pub end: Frame,
    pub confidence_pairs: Vec<ConfidencePair>,
    pub members: BTreeMap<TrackId, Vec<(Frame, Frame)>>,
}

/// A named aggregate of tracks with per-member active frame ranges.
#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    begin: Frame,
    end: Frame,
    members: BTreeMap<TrackId, Vec<(Frame, Frame)>>,
    confidence_pairs: Vec<ConfidencePair>,
}

impl Group {
    /// Create a group from a non-empty member list.
    pub fn new(
        id: GroupId,
        group_type: impl Into<String>,
        members: BTreeMap<TrackId, Vec<(Frame, Frame)>>,
    ) -> Self {
        debug_assert!(!members.is_empty(), "groups are created from members");
        let mut group = Self {
            id,
            begin: 0,
            end: 0,
            members,
            confidence_pairs: vec![(group_type.into(), 1.0)],
        };
        group.recompute_range();
        group
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn begin(&self) -> Frame {
        self.begin
    }

    pub fn end(&self) -> Frame {
        self.end
    }

    pub fn group_type(&self) -> Option<&str> {
        self.confidence_pairs.first().map(|(t, _)| t.as_str())
    }

    pub fn confidence_pairs(&self) -> &[ConfidencePair] {
        &self.confidence_pairs
    }

    pub fn members(&self) -> &BTreeMap<TrackId, Vec<(Frame, Frame)>> {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<TrackId> {
        self.members.keys().copied().collect()
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.members.contains_key(&track_id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add members with their active ranges. Ranges for an existing member
    /// are appended, not replaced.
    pub fn add_members(&mut self, members: BTreeMap<TrackId, Vec<(Frame, Frame)>>) {
        for (id, mut ranges) in members {
            self.members.entry(id).or_default().append(&mut ranges);
        }
        self.recompute_range();
        log::trace!("Group {}: members now {:?}", self.id, self.member_ids());
    }

    /// Remove members by id. Returns how many were actually present.
    pub fn remove_members(&mut self, ids: &[TrackId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.members.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.recompute_range();
        }
        removed
    }

    /// Make `group_type` the primary confidence pair.
    pub fn set_type(&mut self, group_type: impl Into<String>) {
        let group_type = group_type.into();
        self.confidence_pairs.retain(|(t, _)| *t != group_type);
        self.confidence_pairs.insert(0, (group_type, 1.0));
    }

    fn recompute_range(&mut self) {
        let mut range: Option<(Frame, Frame)> = None;
        for ranges in self.members.values() {
            for (begin, end) in ranges {
                range = Some(match range {
                    Some((b, e)) => (b.min(*begin), e.max(*end)),
                    None => (*begin, *end),
                });
            }
        }
        if let Some((begin, end)) = range {
            self.begin = begin;
            self.end = end;
        }
    }

    pub fn serialize(&self) -> GroupData {
        GroupData {
            id: self.id,
            begin: self.begin,
            end: self.end,
            confidence_pairs: self.confidence_pairs.clone(),
            members: self.members.clone(),
        }
    }

    pub fn from_data(data: GroupData) -> Self {
        let mut group = Self {
            id: data.id,
            begin: data.begin,
            end: data.end,
            members: data.members,
            confidence_pairs: data.confidence_pairs,
        };
        group.recompute_range();
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(entries: &[(TrackId, (Frame, Frame))]) -> BTreeMap<TrackId, Vec<(Frame, Frame)>> {
        entries.iter().map(|(id, r)| (*id, vec![*r])).collect()
    }

    #[test]
    fn test_group_range_derived_from_members() {
        let group = Group::new(1, "feeding", members(&[(10, (5, 20)), (11, (2, 8))]));
        assert_eq!((group.begin(), group.end()), (2, 20));
    }

    #[test]
    fn test_add_members_appends_ranges() {
        let mut group = Group::new(1, "feeding", members(&[(10, (5, 10))]));
        group.add_members(members(&[(10, (15, 30))]));
        assert_eq!(group.members().get(&10).unwrap().len(), 2);
        assert_eq!((group.begin(), group.end()), (5, 30));
    }

    #[test]
    fn test_remove_members() {
        let mut group = Group::new(1, "feeding", members(&[(10, (5, 20)), (11, (2, 8))]));
        assert_eq!(group.remove_members(&[11, 99]), 1);
        assert!(!group.contains(11));
        assert_eq!((group.begin(), group.end()), (5, 20));

        assert_eq!(group.remove_members(&[10]), 1);
        assert!(group.is_empty());
    }

    #[test]
    fn test_group_serialize() {
        let group = Group::new(3, "feeding", members(&[(10, (5, 20))]));
        let data = group.serialize();
        let back = Group::from_data(data);
        assert_eq!(back.id(), 3);
        assert_eq!(back.group_type(), Some("feeding"));
        assert!(back.contains(10));
    }
}
