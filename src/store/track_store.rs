//! Per-camera track storage with interval-indexed temporal queries.

use std::collections::BTreeMap;

use crate::error::EditError;
use crate::events::Signal;
use crate::model::{Frame, Track, TrackId};
use crate::store::interval::IntervalIndex;
use crate::store::StoreChange;

/// Owns the tracks of one camera.
///
/// Mutations go through [`TrackStore::modify`] so that the interval index and
/// change observers stay consistent with the track map. Observers receive
/// upsert/delete/meta notifications for persistence-pending tracking.
pub struct TrackStore {
    camera: String,
    tracks: BTreeMap<TrackId, Track>,
    interval: IntervalIndex,
    changes: Signal<StoreChange>,
}

impl TrackStore {
    pub fn new(camera: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            tracks: BTreeMap::new(),
            interval: IntervalIndex::new(),
            changes: Signal::new(),
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Change notification stream for external observers.
    pub fn changes_mut(&mut self) -> &mut Signal<StoreChange> {
        &mut self.changes
    }

    /// Construct and register a new track at `frame`. The caller supplies the
    /// id (allocation is a camera-store concern, see `CameraStore::new_track_id`).
    pub fn add(&mut self, id: TrackId, frame: Frame, track_type: impl Into<String>) -> TrackId {
        let track = Track::new(id, frame, track_type);
        self.insert(track);
        id
    }

    /// Register an existing track (e.g. loaded from persistence).
    pub fn insert(&mut self, track: Track) {
        let id = track.id();
        self.interval.set(id, track.begin(), track.end());
        self.tracks.insert(id, track);
        self.changes.emit(&StoreChange::TrackUpsert(id));
        log::debug!("TrackStore[{}]: added track {}", self.camera, id);
    }

    /// Remove a track. Returns the removed track, if present.
    pub fn remove(&mut self, id: TrackId) -> Option<Track> {
        let removed = self.tracks.remove(&id);
        if removed.is_some() {
            self.interval.remove(id);
            self.changes.emit(&StoreChange::TrackDelete(id));
            log::debug!("TrackStore[{}]: removed track {}", self.camera, id);
        }
        removed
    }

    /// Strict lookup: errors if the track is absent.
    pub fn get(&self, id: TrackId) -> Result<&Track, EditError> {
        self.tracks.get(&id).ok_or_else(|| EditError::TrackNotFound {
            id,
            camera: self.camera.clone(),
        })
    }

    /// Lenient lookup.
    pub fn get_possible(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Mutate a track through a closure, then re-index its interval and
    /// notify observers of the upsert.
    pub fn modify<R>(
        &mut self,
        id: TrackId,
        f: impl FnOnce(&mut Track) -> R,
    ) -> Result<R, EditError> {
        let track = self.tracks.get_mut(&id).ok_or_else(|| EditError::TrackNotFound {
            id,
            camera: self.camera.clone(),
        })?;
        let out = f(track);
        let (begin, end) = (track.begin(), track.end());
        self.interval.set(id, begin, end);
        self.changes.emit(&StoreChange::TrackUpsert(id));
        Ok(out)
    }

    /// Notify observers of a metadata-only change (e.g. type rename) that
    /// does not alter geometry.
    pub fn notify_meta(&mut self, id: TrackId) {
        self.changes.emit(&StoreChange::TrackMeta(id));
    }

    /// Ids of all tracks whose `[begin, end]` contains `frame`.
    pub fn tracks_active_at(&self, frame: Frame) -> Vec<TrackId> {
        self.interval.stab(frame)
    }

    pub fn ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Highest track id in this store, if any.
    pub fn max_id(&self) -> Option<TrackId> {
        self.tracks.keys().next_back().copied()
    }
}

impl std::fmt::Debug for TrackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackStore")
            .field("camera", &self.camera)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}
