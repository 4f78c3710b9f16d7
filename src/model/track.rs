//! Track and per-frame feature data model.
//!
//! A [`Track`] is the fundamental annotated entity: a per-object, sparse,
//! frame-indexed sequence of [`Feature`]s plus an ordered list of
//! (type, confidence) pairs. Temporal extent (`begin`/`end`) is derived from
//! the stored features and never set directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Geometry, GeometryKind, Point, Polygon};

/// Track identifier, unique across all cameras.
pub type TrackId = i64;
/// Group identifier.
pub type GroupId = i64;
/// Frame number within the sequence.
pub type Frame = u32;
/// A (type label, confidence) pair; the first pair in a list is primary.
pub type ConfidencePair = (String, f64);

// ============================================================================
// Feature
// ============================================================================

/// One frame's annotation state for a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub frame: Frame,
    /// True if explicitly authored (not interpolated).
    #[serde(default)]
    pub keyframe: bool,
    /// Whether values between this keyframe and the next are synthesized.
    #[serde(default)]
    pub interpolate: bool,
    /// Canonical spatial envelope. Must contain the bbox of every geometry
    /// entry when set.
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Named sub-geometries keyed by string (`""` is the default polygon key).
    #[serde(default)]
    pub geometry: BTreeMap<String, Vec<Geometry>>,
}

impl Feature {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            keyframe: true,
            interpolate: false,
            bounds: None,
            geometry: BTreeMap::new(),
        }
    }

    /// Whether this feature carries any spatial content.
    pub fn has_content(&self) -> bool {
        self.bounds.is_some() || self.geometry.values().any(|g| !g.is_empty())
    }

    /// Look up one geometry entry by key and kind.
    pub fn get_geometry(&self, key: &str, kind: GeometryKind) -> Option<&Geometry> {
        self.geometry
            .get(key)?
            .iter()
            .find(|g| g.kind() == kind)
    }
}

/// A partial feature update applied by [`Track::set_feature`]. Only supplied
/// fields overwrite the existing feature.
#[derive(Debug, Clone, Default)]
pub struct FeaturePatch {
    pub frame: Frame,
    pub keyframe: Option<bool>,
    pub interpolate: Option<bool>,
    pub bounds: Option<Bounds>,
}

impl FeaturePatch {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn keyframe(mut self, v: bool) -> Self {
        self.keyframe = Some(v);
        self
    }

    pub fn interpolate(mut self, v: bool) -> Self {
        self.interpolate = Some(v);
        self
    }

    pub fn bounds(mut self, b: Bounds) -> Self {
        self.bounds = Some(b);
        self
    }
}

/// Result of a bracketing query around a frame. `feature` is the exact or
/// interpolated feature at the position; `prev`/`next` are the nearest real
/// features at or around it.
#[derive(Debug)]
pub struct FrameContext<'a> {
    pub feature: Option<FrameFeature<'a>>,
    pub prev: Option<&'a Feature>,
    pub next: Option<&'a Feature>,
}

/// A feature as seen at a frame: either stored as-is or synthesized by
/// linear interpolation between two keyframes.
#[derive(Debug)]
pub enum FrameFeature<'a> {
    Real(&'a Feature),
    Interpolated(Feature),
}

impl FrameFeature<'_> {
    pub fn as_feature(&self) -> &Feature {
        match self {
            FrameFeature::Real(f) => f,
            FrameFeature::Interpolated(f) => f,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, FrameFeature::Real(_))
    }
}

// ============================================================================
// Track
// ============================================================================

/// Serialized form of a track, the persistence contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackData {
    pub id: TrackId,
    pub begin: Frame,
    pub end: Frame,
    pub confidence_pairs: Vec<ConfidencePair>,
    pub features: Vec<Feature>,
}

/// A per-object, cross-frame annotation record.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    begin: Frame,
    end: Frame,
    features: BTreeMap<Frame, Feature>,
    confidence_pairs: Vec<ConfidencePair>,
}

impl Track {
    /// Create an empty track anchored at `frame` with a default type.
    pub fn new(id: TrackId, frame: Frame, default_type: impl Into<String>) -> Self {
        Self {
            id,
            begin: frame,
            end: frame,
            features: BTreeMap::new(),
            confidence_pairs: vec![(default_type.into(), 1.0)],
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn begin(&self) -> Frame {
        self.begin
    }

    pub fn end(&self) -> Frame {
        self.end
    }

    /// The primary (display) type, if any pairs exist.
    pub fn track_type(&self) -> Option<&str> {
        self.confidence_pairs.first().map(|(t, _)| t.as_str())
    }

    pub fn confidence_pairs(&self) -> &[ConfidencePair] {
        &self.confidence_pairs
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Whether this track is an aborted-creation placeholder: a single-frame
    /// track with no real spatial content.
    pub fn is_empty_placeholder(&self) -> bool {
        self.begin == self.end
            && self
                .features
                .get(&self.begin)
                .is_none_or(|f| !f.has_content())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Upsert the feature at `patch.frame`, shallow-merging supplied fields
    /// and merging geometry entries into the existing map. Untouched geometry
    /// keys are kept; within a key, an incoming entry replaces any existing
    /// entry of the same kind.
    pub fn set_feature(&mut self, patch: FeaturePatch, geometry: Vec<(String, Vec<Geometry>)>) {
        let frame = patch.frame;
        let feature = self.features.entry(frame).or_insert_with(|| Feature::new(frame));
        if let Some(k) = patch.keyframe {
            feature.keyframe = k;
        }
        if let Some(i) = patch.interpolate {
            feature.interpolate = i;
        }
        if let Some(b) = patch.bounds {
            feature.bounds = Some(b);
        }
        for (key, geoms) in geometry {
            let entries = feature.geometry.entry(key).or_default();
            for geom in geoms {
                entries.retain(|g| g.kind() != geom.kind());
                entries.push(geom);
            }
        }
        self.maybe_expand_range(frame);
        log::trace!("Track {}: set feature at frame {}", self.id, frame);
    }

    /// Remove one named geometry entry of the given kind at `frame`. Drops
    /// the feature entirely if nothing (geometry or bounds) remains, and
    /// recomputes `begin`/`end` over the remaining features.
    pub fn remove_feature_geometry(&mut self, frame: Frame, key: &str, kind: GeometryKind) -> bool {
        let Some(feature) = self.features.get_mut(&frame) else {
            return false;
        };
        let Some(entries) = feature.geometry.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|g| g.kind() != kind);
        let removed = entries.len() != before;
        if entries.is_empty() {
            feature.geometry.remove(key);
        }
        if removed && !feature.has_content() {
            self.features.remove(&frame);
        }
        if removed {
            self.recompute_range();
            log::trace!("Track {}: removed {key}/{kind:?} at frame {frame}", self.id);
        }
        removed
    }

    /// Concatenate all features of `others` into this track, later arguments
    /// overwriting at colliding frames, then merge confidence pairs keeping
    /// the highest value per type. Callers delete the other tracks afterward.
    pub fn merge(&mut self, others: Vec<Track>) {
        for other in others {
            for (frame, feature) in other.features {
                self.features.insert(frame, feature);
            }
            for (label, conf) in other.confidence_pairs {
                match self.confidence_pairs.iter_mut().find(|(t, _)| *t == label) {
                    Some(pair) => pair.1 = pair.1.max(conf),
                    None => self.confidence_pairs.push((label, conf)),
                }
            }
        }
        self.confidence_pairs
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        self.recompute_range();
        log::debug!("Track {}: merged, range now [{}, {}]", self.id, self.begin, self.end);
    }

    /// Make `track_type` the primary confidence pair.
    pub fn set_type(&mut self, track_type: impl Into<String>) {
        let track_type = track_type.into();
        self.confidence_pairs.retain(|(t, _)| *t != track_type);
        self.confidence_pairs.insert(0, (track_type, 1.0));
    }

    fn maybe_expand_range(&mut self, frame: Frame) {
        if self.features.len() == 1 {
            self.begin = frame;
            self.end = frame;
        } else {
            self.begin = self.begin.min(frame);
            self.end = self.end.max(frame);
        }
    }

    fn recompute_range(&mut self) {
        // Empty tracks keep their last range so a creation anchor survives.
        if let (Some(first), Some(last)) =
            (self.features.keys().next(), self.features.keys().next_back())
        {
            self.begin = *first;
            self.end = *last;
        } else {
            self.end = self.begin;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get the feature at `frame` along with the nearest real features
    /// bracketing it. When `frame` falls between a keyframe with
    /// `interpolate` set and the next keyframe, the returned feature is a
    /// linear interpolation of their bounds.
    pub fn get_feature(&self, frame: Frame) -> FrameContext<'_> {
        if let Some(f) = self.features.get(&frame) {
            let prev = self.features.range(..frame).next_back().map(|(_, f)| f);
            let next = self
                .features
                .range(frame.saturating_add(1)..)
                .next()
                .map(|(_, f)| f);
            return FrameContext {
                feature: Some(FrameFeature::Real(f)),
                prev,
                next,
            };
        }
        let prev = self.features.range(..frame).next_back().map(|(_, f)| f);
        let next = self.features.range(frame.saturating_add(1)..).next().map(|(_, f)| f);
        let feature = match (prev, next) {
            (Some(p), Some(n)) if p.interpolate => {
                interpolate_feature(p, n, frame).map(FrameFeature::Interpolated)
            }
            _ => None,
        };
        FrameContext {
            feature,
            prev,
            next,
        }
    }

    /// Whether an edit at `frame` lands on interpolated ground: returns the
    /// bracketing real features and whether interpolation is enabled there.
    /// Used to decide between creating a new keyframe and modifying one.
    pub fn can_interpolate(&self, frame: Frame) -> (Option<&Feature>, Option<&Feature>, bool) {
        let ctx = self.get_feature(frame);
        let interpolate = match &ctx.feature {
            Some(FrameFeature::Real(f)) => f.interpolate,
            Some(FrameFeature::Interpolated(_)) => true,
            None => ctx.prev.is_some_and(|p| p.interpolate),
        };
        (ctx.prev, ctx.next, interpolate)
    }

    /// Read-only geometry point query.
    pub fn get_feature_geometry(
        &self,
        frame: Frame,
        key: &str,
        kind: GeometryKind,
    ) -> Option<&Geometry> {
        self.features.get(&frame)?.get_geometry(key, kind)
    }

    // ========================================================================
    // Polygon-with-holes support
    // ========================================================================

    /// All polygons stored on the feature at `frame`, with their keys.
    pub fn get_polygon_features(&self, frame: Frame) -> Vec<(&str, &Polygon)> {
        let Some(feature) = self.features.get(&frame) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (key, entries) in &feature.geometry {
            for geom in entries {
                if let Geometry::Polygon(poly) = geom {
                    out.push((key.as_str(), poly));
                }
            }
        }
        out
    }

    /// Append a hole ring to the polygon stored under `key` at `frame`.
    /// Returns false if no such polygon exists.
    pub fn add_hole_to_polygon(&mut self, frame: Frame, key: &str, ring: Vec<Point>) -> bool {
        let Some(feature) = self.features.get_mut(&frame) else {
            return false;
        };
        let Some(entries) = feature.geometry.get_mut(key) else {
            return false;
        };
        for geom in entries {
            if let Geometry::Polygon(poly) = geom {
                poly.add_hole(ring);
                return true;
            }
        }
        false
    }

    /// Generate a polygon key disjoint from the keys already used at `frame`.
    pub fn get_next_polygon_key(&self, frame: Frame) -> String {
        let used: Vec<&str> = self
            .get_polygon_features(frame)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let mut n = 1;
        loop {
            let candidate = format!("polygon{n}");
            if !used.contains(&candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Produce the plain data form for persistence.
    pub fn serialize(&self) -> TrackData {
        TrackData {
            id: self.id,
            begin: self.begin,
            end: self.end,
            confidence_pairs: self.confidence_pairs.clone(),
            features: self.features.values().cloned().collect(),
        }
    }

    /// Rehydrate a track from its data form.
    pub fn from_data(data: TrackData) -> Self {
        let mut track = Self {
            id: data.id,
            begin: data.begin,
            end: data.end,
            features: data.features.into_iter().map(|f| (f.frame, f)).collect(),
            confidence_pairs: data.confidence_pairs,
        };
        track.recompute_range();
        track
    }
}

/// Linear interpolation of bounds between two keyframes. Returns `None` when
/// either side has no bounds.
fn interpolate_feature(prev: &Feature, next: &Feature, frame: Frame) -> Option<Feature> {
    let (pb, nb) = (prev.bounds?, next.bounds?);
    let span = (next.frame - prev.frame) as f64;
    let t = (frame - prev.frame) as f64 / span;
    let lerp = |a: f64, b: f64| a + (b - a) * t;
    let mut feature = Feature::new(frame);
    feature.keyframe = false;
    feature.interpolate = true;
    feature.bounds = Some(Bounds::new(
        lerp(pb.x1, nb.x1),
        lerp(pb.y1, nb.y1),
        lerp(pb.x2, nb.x2),
        lerp(pb.y2, nb.y2),
    ));
    Some(feature)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Line;

    fn bounds(x1: f64, y1: f64, x2: f64, y2: f64) -> Bounds {
        Bounds::new(x1, y1, x2, y2)
    }

    fn square(size: f64) -> Polygon {
        Polygon::from_bounds(bounds(0.0, 0.0, size, size))
    }

    #[test]
    fn test_get_feature_at_max_frame() {
        let mut track = Track::new(1, Frame::MAX, "fish");
        track.set_feature(
            FeaturePatch::new(Frame::MAX).bounds(bounds(0.0, 0.0, 1.0, 1.0)),
            vec![],
        );
        let ctx = track.get_feature(Frame::MAX);
        assert!(matches!(ctx.feature, Some(FrameFeature::Real(_))));
        assert!(ctx.next.is_none());
    }

    #[test]
    fn test_set_feature_expands_range() {
        let mut track = Track::new(1, 5, "fish");
        track.set_feature(FeaturePatch::new(5).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        assert_eq!((track.begin(), track.end()), (5, 5));

        track.set_feature(FeaturePatch::new(9).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        assert_eq!((track.begin(), track.end()), (5, 9));

        track.set_feature(FeaturePatch::new(2).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        assert_eq!((track.begin(), track.end()), (2, 9));
    }

    #[test]
    fn test_set_feature_merges_geometry_keys() {
        let mut track = Track::new(1, 0, "fish");
        track.set_feature(
            FeaturePatch::new(0),
            vec![("".to_string(), vec![Geometry::Polygon(square(10.0))])],
        );
        track.set_feature(
            FeaturePatch::new(0),
            vec![("head".to_string(), vec![Geometry::Point(Point::new(1.0, 1.0))])],
        );

        // Untouched keys survive the second write.
        assert!(track.get_feature_geometry(0, "", GeometryKind::Polygon).is_some());
        assert!(track.get_feature_geometry(0, "head", GeometryKind::Point).is_some());
    }

    #[test]
    fn test_set_feature_replaces_same_kind_entry() {
        let mut track = Track::new(1, 0, "fish");
        track.set_feature(
            FeaturePatch::new(0),
            vec![("".to_string(), vec![Geometry::Polygon(square(10.0))])],
        );
        track.set_feature(
            FeaturePatch::new(0),
            vec![("".to_string(), vec![Geometry::Polygon(square(20.0))])],
        );
        let feature = track.get_feature(0);
        let f = feature.feature.unwrap();
        assert_eq!(f.as_feature().geometry.get("").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_feature_geometry_recomputes_range() {
        let mut track = Track::new(1, 0, "fish");
        track.set_feature(FeaturePatch::new(2).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        track.set_feature(
            FeaturePatch::new(8),
            vec![("".to_string(), vec![Geometry::Polygon(square(5.0))])],
        );
        assert_eq!((track.begin(), track.end()), (2, 8));

        // Removing the only geometry at frame 8 drops the feature entirely.
        assert!(track.remove_feature_geometry(8, "", GeometryKind::Polygon));
        assert_eq!((track.begin(), track.end()), (2, 2));
    }

    #[test]
    fn test_merge_disjoint_frames() {
        let mut a = Track::new(1, 1, "fish");
        for frame in [1u32, 2, 3, 4, 5] {
            a.set_feature(FeaturePatch::new(frame).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        }
        let mut b = Track::new(2, 6, "seal");
        for frame in [6u32, 7, 8, 9] {
            b.set_feature(FeaturePatch::new(frame).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        }

        a.merge(vec![b]);
        assert_eq!((a.begin(), a.end()), (1, 9));
        assert_eq!(a.feature_count(), 9);
    }

    #[test]
    fn test_merge_overlap_incoming_wins() {
        let mut a = Track::new(1, 3, "fish");
        a.set_feature(FeaturePatch::new(3).bounds(bounds(0.0, 0.0, 1.0, 1.0)), vec![]);
        let mut b = Track::new(2, 3, "fish");
        b.set_feature(FeaturePatch::new(3).bounds(bounds(5.0, 5.0, 6.0, 6.0)), vec![]);

        a.merge(vec![b]);
        let ctx = a.get_feature(3);
        assert_eq!(
            ctx.feature.unwrap().as_feature().bounds,
            Some(bounds(5.0, 5.0, 6.0, 6.0))
        );
    }

    #[test]
    fn test_interpolated_feature() {
        let mut track = Track::new(1, 0, "fish");
        track.set_feature(
            FeaturePatch::new(0)
                .interpolate(true)
                .bounds(bounds(0.0, 0.0, 10.0, 10.0)),
            vec![],
        );
        track.set_feature(
            FeaturePatch::new(10).bounds(bounds(10.0, 10.0, 20.0, 20.0)),
            vec![],
        );

        let ctx = track.get_feature(5);
        let feature = ctx.feature.expect("should interpolate");
        assert!(!feature.is_real());
        assert_eq!(feature.as_feature().bounds, Some(bounds(5.0, 5.0, 15.0, 15.0)));

        let (_, _, interpolate) = track.can_interpolate(5);
        assert!(interpolate);
    }

    #[test]
    fn test_no_interpolation_when_disabled() {
        let mut track = Track::new(1, 0, "fish");
        track.set_feature(FeaturePatch::new(0).bounds(bounds(0.0, 0.0, 10.0, 10.0)), vec![]);
        track.set_feature(FeaturePatch::new(10).bounds(bounds(10.0, 10.0, 20.0, 20.0)), vec![]);

        let ctx = track.get_feature(5);
        assert!(ctx.feature.is_none());
        assert!(ctx.prev.is_some());
        assert!(ctx.next.is_some());
    }

    #[test]
    fn test_set_type_reorders_pairs() {
        let mut track = Track::new(1, 0, "fish");
        track.set_type("seal");
        assert_eq!(track.track_type(), Some("seal"));
        assert_eq!(track.confidence_pairs().len(), 2);
    }

    #[test]
    fn test_next_polygon_key() {
        let mut track = Track::new(1, 0, "fish");
        assert_eq!(track.get_next_polygon_key(0), "polygon1");
        track.set_feature(
            FeaturePatch::new(0),
            vec![("polygon1".to_string(), vec![Geometry::Polygon(square(5.0))])],
        );
        assert_eq!(track.get_next_polygon_key(0), "polygon2");
    }

    #[test]
    fn test_add_hole_to_polygon() {
        let mut track = Track::new(1, 0, "fish");
        track.set_feature(
            FeaturePatch::new(0),
            vec![("".to_string(), vec![Geometry::Polygon(square(10.0))])],
        );
        let ring = vec![
            Point::new(2.0, 2.0),
            Point::new(4.0, 2.0),
            Point::new(3.0, 4.0),
        ];
        assert!(track.add_hole_to_polygon(0, "", ring));
        let Some(Geometry::Polygon(poly)) = track.get_feature_geometry(0, "", GeometryKind::Polygon)
        else {
            panic!("expected polygon");
        };
        assert_eq!(poly.holes.len(), 1);

        assert!(!track.add_hole_to_polygon(0, "missing", vec![]));
    }

    #[test]
    fn test_empty_placeholder() {
        let track = Track::new(1, 4, "fish");
        assert!(track.is_empty_placeholder());

        let mut with_line = Track::new(2, 4, "fish");
        with_line.set_feature(
            FeaturePatch::new(4),
            vec![(
                "HeadTails".to_string(),
                vec![Geometry::Line(Line::new(vec![
                    Point::new(0.0, 0.0),
                    Point::new(1.0, 0.0),
                ]))],
            )],
        );
        assert!(!with_line.is_empty_placeholder());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut track = Track::new(7, 2, "fish");
        track.set_feature(FeaturePatch::new(2).bounds(bounds(0.0, 0.0, 4.0, 4.0)), vec![]);
        track.set_feature(FeaturePatch::new(5).bounds(bounds(1.0, 1.0, 5.0, 5.0)), vec![]);

        let data = track.serialize();
        assert_eq!(data.begin, 2);
        assert_eq!(data.end, 5);

        let json = serde_json::to_string(&data).unwrap();
        let back = Track::from_data(serde_json::from_str(&json).unwrap());
        assert_eq!(back.id(), 7);
        assert_eq!((back.begin(), back.end()), (2, 5));
        assert_eq!(back.feature_count(), 2);
    }
}
