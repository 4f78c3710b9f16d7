//! Data models for the annotation engine.

mod group;
mod track;

pub use group::{Group, GroupData};
pub use track::{
    ConfidencePair, Feature, FeaturePatch, Frame, FrameContext, FrameFeature, GroupId, Track,
    TrackData, TrackId,
};
