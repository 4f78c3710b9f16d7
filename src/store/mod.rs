//! Track, group, and multi-camera storage.

mod group_store;
mod interval;
mod track_store;

pub use group_store::GroupStore;
pub use interval::IntervalIndex;
pub use track_store::TrackStore;

use std::collections::BTreeMap;

use crate::error::EditError;
use crate::model::{Frame, GroupId, Track, TrackId};

/// Name of the camera created by [`CameraStore::new`] for single-camera data.
pub const DEFAULT_CAMERA: &str = "singleCam";

/// A store-level change notification, consumed by persistence-pending
/// tracking and rendering observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    TrackUpsert(TrackId),
    TrackDelete(TrackId),
    /// Metadata-only change (type rename etc.), no geometry delta.
    TrackMeta(TrackId),
    GroupUpsert(GroupId),
    GroupDelete(GroupId),
    GroupMeta(GroupId),
}

/// One camera's stores.
#[derive(Debug)]
pub struct Camera {
    pub tracks: TrackStore,
    pub groups: GroupStore,
}

impl Camera {
    fn new(name: &str) -> Self {
        Self {
            tracks: TrackStore::new(name),
            groups: GroupStore::new(),
        }
    }
}

/// Mapping from camera name to per-camera stores, with a globally unique
/// track id allocator. The same logical object may have one Track instance
/// per camera, tied together by a shared id (multi-camera linking).
#[derive(Debug)]
pub struct CameraStore {
    cameras: BTreeMap<String, Camera>,
}

impl CameraStore {
    /// A store with the single default camera.
    pub fn new() -> Self {
        let mut cameras = BTreeMap::new();
        cameras.insert(DEFAULT_CAMERA.to_string(), Camera::new(DEFAULT_CAMERA));
        Self { cameras }
    }

    /// A store with the given cameras (multi-camera dataset).
    pub fn with_cameras<I: IntoIterator<Item = String>>(names: I) -> Self {
        let cameras: BTreeMap<String, Camera> = names
            .into_iter()
            .map(|name| {
                let camera = Camera::new(&name);
                (name, camera)
            })
            .collect();
        assert!(!cameras.is_empty(), "camera store needs at least one camera");
        Self { cameras }
    }

    pub fn camera_names(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    pub fn has_camera(&self, name: &str) -> bool {
        self.cameras.contains_key(name)
    }

    pub fn camera(&self, name: &str) -> Result<&Camera, EditError> {
        self.cameras.get(name).ok_or_else(|| EditError::CameraNotFound {
            name: name.to_string(),
        })
    }

    pub fn camera_mut(&mut self, name: &str) -> Result<&mut Camera, EditError> {
        self.cameras.get_mut(name).ok_or_else(|| EditError::CameraNotFound {
            name: name.to_string(),
        })
    }

    /// Monotonic id allocator: one more than the highest id in any camera.
    pub fn new_track_id(&self) -> TrackId {
        self.cameras
            .values()
            .filter_map(|c| c.tracks.max_id())
            .max()
            .map(|id| id + 1)
            .unwrap_or(0)
    }

    /// Allocate (or reuse) an id and register a new track in `camera`.
    pub fn add_track(
        &mut self,
        camera: &str,
        frame: Frame,
        track_type: impl Into<String>,
        override_id: Option<TrackId>,
    ) -> Result<TrackId, EditError> {
        let id = override_id.unwrap_or_else(|| self.new_track_id());
        let store = &mut self.camera_mut(camera)?.tracks;
        store.add(id, frame, track_type);
        Ok(id)
    }

    /// Remove a track from one camera, or from every camera when `camera` is
    /// `None`. Group membership is stripped wherever the track is removed.
    /// Returns the removed per-camera instances.
    pub fn remove_track(&mut self, id: TrackId, camera: Option<&str>) -> Vec<Track> {
        let names: Vec<String> = match camera {
            Some(name) => vec![name.to_string()],
            None => self.cameras.keys().cloned().collect(),
        };
        let mut removed = Vec::new();
        for name in names {
            if let Some(cam) = self.cameras.get_mut(&name) {
                if let Some(track) = cam.tracks.remove(id) {
                    cam.groups.remove_track_membership(id);
                    removed.push(track);
                }
            }
        }
        removed
    }

    /// Strict cross-camera lookup: the first camera holding the track.
    pub fn get_any_track(&self, id: TrackId) -> Result<(&str, &Track), EditError> {
        self.get_any_possible_track(id)
            .ok_or_else(|| EditError::TrackNotFound {
                id,
                camera: "*".to_string(),
            })
    }

    /// Lenient cross-camera lookup.
    pub fn get_any_possible_track(&self, id: TrackId) -> Option<(&str, &Track)> {
        for (name, cam) in &self.cameras {
            if let Some(track) = cam.tracks.get_possible(id) {
                return Some((name.as_str(), track));
            }
        }
        None
    }

    /// Cameras other than `except` that hold a track with this id. Used by
    /// the linking precondition check.
    pub fn cameras_holding_track(&self, id: TrackId, except: &str) -> Vec<&str> {
        self.cameras
            .iter()
            .filter(|(name, cam)| name.as_str() != except && cam.tracks.contains(id))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl Default for CameraStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_track_id_monotonic_across_cameras() {
        let mut store =
            CameraStore::with_cameras(["left".to_string(), "right".to_string()]);
        assert_eq!(store.new_track_id(), 0);

        let a = store.add_track("left", 0, "fish", None).unwrap();
        assert_eq!(a, 0);
        let b = store.add_track("right", 0, "fish", None).unwrap();
        assert_eq!(b, 1);
        // Reused ids (linking) do not break the allocator.
        store.add_track("right", 0, "fish", Some(a)).unwrap();
        assert_eq!(store.new_track_id(), 2);
    }

    #[test]
    fn test_remove_track_all_cameras() {
        let mut store =
            CameraStore::with_cameras(["left".to_string(), "right".to_string()]);
        store.add_track("left", 0, "fish", Some(5)).unwrap();
        store.add_track("right", 0, "fish", Some(5)).unwrap();

        let removed = store.remove_track(5, None);
        assert_eq!(removed.len(), 2);
        assert!(store.get_any_possible_track(5).is_none());
    }

    #[test]
    fn test_cross_camera_lookup() {
        let mut store =
            CameraStore::with_cameras(["left".to_string(), "right".to_string()]);
        store.add_track("right", 3, "fish", Some(9)).unwrap();

        let (camera, track) = store.get_any_track(9).unwrap();
        assert_eq!(camera, "right");
        assert_eq!(track.id(), 9);
        assert!(store.get_any_track(10).is_err());

        assert_eq!(store.cameras_holding_track(9, "right"), Vec::<&str>::new());
        assert_eq!(store.cameras_holding_track(9, "left"), vec!["right"]);
    }
}
