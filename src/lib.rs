//! SVAT - Spatiotemporal Video Annotation Toolkit
//!
//! The editing engine behind a frame-based video annotation tool: sparse
//! keyframed tracks with named sub-geometries, track groups, pluggable
//! geometry-composition recipes, and the mode manager that orchestrates
//! selection, creation, merging, group editing, and cross-camera linking.
//!
//! The crate is UI-free. Hosts drive it with drawing input and key actions,
//! observe store changes through subscriptions, and drain event queues for
//! seeks, notices, and segmentation service requests.

pub mod editor;
pub mod error;
pub mod events;
pub mod geometry;
pub mod model;
pub mod persist;
pub mod recipe;
pub mod settings;
pub mod store;

pub use editor::{AlwaysConfirm, ConfirmPrompt, EditorEvent, EditorModeManager};
pub use error::EditError;
pub use model::{Feature, FeaturePatch, Frame, Group, GroupId, Track, TrackId};
pub use settings::Settings;
pub use store::{CameraStore, StoreChange, DEFAULT_CAMERA};
