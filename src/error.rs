//! Error types for annotation editing operations.

use thiserror::Error;

use crate::model::TrackId;

/// Errors raised by the editing engine.
///
/// These are fatal to the triggering operation and are expected to be caught
/// and surfaced by the UI layer; the engine performs no automatic retry.
#[derive(Error, Debug)]
pub enum EditError {
    /// A referenced track is not present in the store
    #[error("Track {id} not found in camera '{camera}'")]
    TrackNotFound {
        /// The missing track id
        id: TrackId,
        /// The camera that was searched
        camera: String,
    },

    /// A referenced group is not present in the store
    #[error("Group {id} not found")]
    GroupNotFound {
        /// The missing group id
        id: TrackId,
    },

    /// Two recipes wrote the same geometry key in one reconciliation pass
    #[error("Recipe geometry key conflict on '{key}'")]
    RecipeKeyConflict {
        /// The contested geometry key
        key: String,
    },

    /// More than one recipe requested a type or selected-key change in one pass
    #[error("Recipe state conflict: {message}")]
    RecipeStateConflict {
        /// Description of the conflicting requests
        message: String,
    },

    /// Merge was requested with fewer than two candidate tracks
    #[error("Merge requires at least 2 tracks, got {count}")]
    MergeTooFew {
        /// Number of tracks in the multi-select list
        count: usize,
    },

    /// A linking precondition was violated
    #[error("Linking unavailable: {message}")]
    LinkingUnavailable {
        /// Description of the violated precondition
        message: String,
    },

    /// A camera name does not exist in the camera store
    #[error("Camera '{name}' not found")]
    CameraNotFound {
        /// The missing camera name
        name: String,
    },

    /// An operation was attempted that the current state does not allow
    #[error("Invalid editing state: {message}")]
    InvalidState {
        /// Description of the state violation
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during settings load/save
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EditError {
    /// Create a linking precondition error with a message.
    pub fn linking_unavailable(message: impl Into<String>) -> Self {
        Self::LinkingUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid state error with a message.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a recipe state conflict error with a message.
    pub fn recipe_state_conflict(message: impl Into<String>) -> Self {
        Self::RecipeStateConflict {
            message: message.into(),
        }
    }
}
