//! Pending-change tracking for the external Save collaborator.
//!
//! The engine does not talk to the network; it keeps per-entity upsert and
//! delete sets, updated from store change notifications, and hands the Save
//! collaborator a [`SaveBatch`] to flush. A flush clears the pending state.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{GroupData, GroupId, TrackData, TrackId};
use crate::store::{Camera, StoreChange};

/// One entity kind's batch: serialized upserts plus ids to delete.
#[derive(Debug, Clone, Serialize)]
pub struct KindBatch<D> {
    pub upsert: Vec<D>,
    pub delete: Vec<i64>,
}

// Manual impl: a derived Default would demand `D: Default`, which the
// serialized entity types do not provide.
impl<D> Default for KindBatch<D> {
    fn default() -> Self {
        Self {
            upsert: Vec::new(),
            delete: Vec::new(),
        }
    }
}

/// Everything the Save collaborator needs for one flush.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveBatch {
    pub tracks: KindBatch<TrackData>,
    pub groups: KindBatch<GroupData>,
}

/// Accumulates pending changes between flushes.
///
/// An upsert followed by a delete leaves only the delete; a delete followed
/// by a re-add leaves only the upsert. Metadata changes count as upserts.
#[derive(Debug, Default)]
pub struct PendingChangeTracker {
    track_upsert: BTreeSet<TrackId>,
    track_delete: BTreeSet<TrackId>,
    group_upsert: BTreeSet<GroupId>,
    group_delete: BTreeSet<GroupId>,
}

impl PendingChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one store notification into the pending sets.
    pub fn absorb(&mut self, change: &StoreChange) {
        match change {
            StoreChange::TrackUpsert(id) | StoreChange::TrackMeta(id) => {
                self.track_delete.remove(id);
                self.track_upsert.insert(*id);
            }
            StoreChange::TrackDelete(id) => {
                self.track_upsert.remove(id);
                self.track_delete.insert(*id);
            }
            StoreChange::GroupUpsert(id) | StoreChange::GroupMeta(id) => {
                self.group_delete.remove(id);
                self.group_upsert.insert(*id);
            }
            StoreChange::GroupDelete(id) => {
                self.group_upsert.remove(id);
                self.group_delete.insert(*id);
            }
        }
    }

    /// Number of entities with unsaved changes.
    pub fn pending_count(&self) -> usize {
        self.track_upsert.len()
            + self.track_delete.len()
            + self.group_upsert.len()
            + self.group_delete.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.pending_count() > 0
    }

    /// Build the batch for the Save collaborator and clear pending state.
    /// Upserted entities are serialized from the camera's current stores;
    /// ids that no longer resolve are dropped (deleted after the upsert).
    pub fn drain_batch(&mut self, camera: &Camera) -> SaveBatch {
        let tracks = KindBatch {
            upsert: self
                .track_upsert
                .iter()
                .filter_map(|id| camera.tracks.get_possible(*id))
                .map(|t| t.serialize())
                .collect(),
            delete: self.track_delete.iter().copied().collect(),
        };
        let groups = KindBatch {
            upsert: self
                .group_upsert
                .iter()
                .filter_map(|id| camera.groups.get_possible(*id))
                .map(|g| g.serialize())
                .collect(),
            delete: self.group_delete.iter().copied().collect(),
        };
        self.track_upsert.clear();
        self.track_delete.clear();
        self.group_upsert.clear();
        self.group_delete.clear();
        log::debug!(
            "Save batch: {} track upserts, {} track deletes, {} group upserts, {} group deletes",
            tracks.upsert.len(),
            tracks.delete.len(),
            groups.upsert.len(),
            groups.delete.len()
        );
        SaveBatch { tracks, groups }
    }
}

/// Serialized pending-change map keyed by id, for hosts that batch manually.
pub type PendingMap<D> = BTreeMap<i64, D>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CameraStore;

    #[test]
    fn test_upsert_then_delete_leaves_delete_only() {
        let mut tracker = PendingChangeTracker::new();
        tracker.absorb(&StoreChange::TrackUpsert(1));
        tracker.absorb(&StoreChange::TrackDelete(1));
        assert_eq!(tracker.pending_count(), 1);

        let store = CameraStore::new();
        let camera = store.camera(crate::store::DEFAULT_CAMERA).unwrap();
        let batch = tracker.drain_batch(camera);
        assert!(batch.tracks.upsert.is_empty());
        assert_eq!(batch.tracks.delete, vec![1]);
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_empty_batch_default() {
        let batch = SaveBatch::default();
        assert!(batch.tracks.upsert.is_empty());
        assert!(batch.tracks.delete.is_empty());
        assert!(batch.groups.upsert.is_empty());
        assert!(batch.groups.delete.is_empty());
    }

    #[test]
    fn test_meta_counts_as_upsert() {
        let mut tracker = PendingChangeTracker::new();
        tracker.absorb(&StoreChange::TrackMeta(4));
        assert!(tracker.is_dirty());
    }

    #[test]
    fn test_drain_serializes_current_state() {
        let mut store = CameraStore::new();
        let id = store
            .add_track(crate::store::DEFAULT_CAMERA, 3, "fish", None)
            .unwrap();

        let mut tracker = PendingChangeTracker::new();
        tracker.absorb(&StoreChange::TrackUpsert(id));

        let camera = store.camera(crate::store::DEFAULT_CAMERA).unwrap();
        let batch = tracker.drain_batch(camera);
        assert_eq!(batch.tracks.upsert.len(), 1);
        assert_eq!(batch.tracks.upsert[0].id, id);
    }
}
