//! Editor settings with versioned JSON persistence.
//!
//! Settings are loaded once at startup, saved on change, and injected into
//! the mode manager; nothing here is a process-wide global.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EditError;

/// Current settings file format version.
/// Increment this when making breaking changes to the settings format.
pub const SETTINGS_VERSION: u32 = 1;

/// Whether a newly created annotation is a multi-frame track or a
/// single-frame detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewTrackMode {
    #[default]
    Track,
    Detection,
}

impl NewTrackMode {
    pub fn name(&self) -> &'static str {
        match self {
            NewTrackMode::Track => "Track",
            NewTrackMode::Detection => "Detection",
        }
    }
}

/// Settings consumed by the completion-continuation logic after a geometry
/// write finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrackSettings {
    #[serde(default)]
    pub mode: NewTrackMode,

    /// Type assigned to newly created tracks.
    #[serde(default = "default_track_type")]
    pub default_type: String,

    /// In Track mode: advance the playback frame after each keyframe.
    #[serde(default = "default_true")]
    pub auto_advance_frame: bool,

    /// Whether new keyframes enable interpolation.
    #[serde(default)]
    pub interpolate: bool,

    /// In Detection mode: immediately start the next detection on the same
    /// frame.
    #[serde(default)]
    pub continuous: bool,
}

fn default_track_type() -> String {
    "unknown".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for NewTrackSettings {
    fn default() -> Self {
        Self {
            mode: NewTrackMode::Track,
            default_type: default_track_type(),
            auto_advance_frame: true,
            interpolate: false,
            continuous: false,
        }
    }
}

/// Editor configuration that can be exported and imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Version of the settings file format
    pub version: u32,

    #[serde(default)]
    pub new_track_settings: NewTrackSettings,

    /// Whether the dataset is opened read-only (edit attempts are blocked).
    #[serde(default)]
    pub read_only: bool,

    /// Ask for confirmation before destructive operations.
    #[serde(default = "default_true")]
    pub prompt_before_delete: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            new_track_settings: NewTrackSettings::default(),
            read_only: false,
            prompt_before_delete: true,
        }
    }
}

impl Settings {
    pub fn to_json(&self) -> Result<String, EditError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EditError> {
        let settings: Settings = serde_json::from_str(json)?;
        if settings.version > SETTINGS_VERSION {
            log::warn!(
                "Settings file version {} is newer than supported version {}",
                settings.version,
                SETTINGS_VERSION
            );
        }
        Ok(settings)
    }

    /// Load settings from a file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self, EditError> {
        if !path.exists() {
            log::info!("No settings file at {path:?}, using defaults");
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save settings to a file.
    pub fn save(&self, path: &Path) -> Result<(), EditError> {
        std::fs::write(path, self.to_json()?)?;
        log::debug!("Settings saved to {path:?}");
        Ok(())
    }
}
