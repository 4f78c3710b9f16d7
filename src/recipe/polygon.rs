//! Polygon-with-holes recipe.
//!
//! A completed polygon gesture lands in one of three sub-modes:
//! - `Hole`: append the ring as a hole of the existing base polygon (no
//!   bounds or key changes); with no base polygon present the ring becomes
//!   the base polygon instead.
//! - `NewKey`: store the polygon under a fresh (or explicit) key and expand
//!   the existing bounds with its bbox.
//! - `Default`: the edited polygon's bbox becomes the new baseline for its
//!   key, while every other polygon on the frame contributes to `union` so
//!   the feature bounds still cover all of them.

use crate::events::EventBus;
use crate::geometry::{Geometry, GeometryKind, Polygon};
use crate::model::{Frame, Track};
use crate::recipe::{
    EditType, GeometryRemoval, KeyAction, KeyBinding, Recipe, RecipeActivation, UpdatePhase,
    UpdateResponse,
};

/// Key of the base polygon on a feature.
pub const DEFAULT_POLYGON_KEY: &str = "";

/// Sub-mode applied when a polygon gesture completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonDrawMode {
    #[default]
    Default,
    /// Store under a fresh key, expanding existing bounds.
    NewKey,
    /// Append as a hole of the base polygon.
    Hole,
}

pub struct PolygonRecipe {
    active: bool,
    draw_mode: PolygonDrawMode,
    activations: EventBus<RecipeActivation>,
}

impl PolygonRecipe {
    pub const NAME: &'static str = "polygon";

    pub fn new() -> Self {
        Self {
            active: false,
            draw_mode: PolygonDrawMode::Default,
            activations: EventBus::default(),
        }
    }

    pub fn draw_mode(&self) -> PolygonDrawMode {
        self.draw_mode
    }

    pub fn set_draw_mode(&mut self, mode: PolygonDrawMode) {
        self.draw_mode = mode;
    }

    fn default_response(
        track: &Track,
        frame: Frame,
        key: &str,
        polygon: Polygon,
        done: bool,
    ) -> UpdateResponse {
        let mut response = UpdateResponse::empty();
        // Other polygons on the frame keep contributing to the envelope.
        for (other_key, other) in track.get_polygon_features(frame) {
            if other_key != key {
                response.union.push(other.clone());
            }
        }
        response.union_without_bounds.push(polygon.clone());
        response
            .data
            .insert(key.to_string(), vec![Geometry::Polygon(polygon)]);
        response.done = Some(done);
        response
    }
}

impl Default for PolygonRecipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Recipe for PolygonRecipe {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self) -> bool {
        self.active
    }

    fn toggleable(&self) -> bool {
        true
    }

    fn icon(&self) -> Option<&'static str> {
        Some("mdi-vector-polygon")
    }

    fn update(
        &mut self,
        phase: UpdatePhase,
        frame: Frame,
        track: &Track,
        drawn: &[Geometry],
        key: Option<&str>,
    ) -> UpdateResponse {
        if !self.active {
            return UpdateResponse::empty();
        }
        let polygon = drawn.iter().find_map(|g| match g {
            Geometry::Polygon(p) => Some(p),
            _ => None,
        });
        let Some(polygon) = polygon else {
            return UpdateResponse::empty();
        };
        if !polygon.is_valid() {
            return UpdateResponse::empty();
        }
        let selected_key = key.unwrap_or(DEFAULT_POLYGON_KEY);

        match (self.draw_mode, phase) {
            // Holes and fresh keys only apply to completed gestures.
            (PolygonDrawMode::Hole, UpdatePhase::Editing) => {
                let base_exists = track
                    .get_feature_geometry(frame, selected_key, GeometryKind::Polygon)
                    .is_some();
                if base_exists {
                    let Some(Geometry::Polygon(base)) =
                        track.get_feature_geometry(frame, selected_key, GeometryKind::Polygon)
                    else {
                        return UpdateResponse::empty();
                    };
                    let mut with_hole = base.clone();
                    with_hole.add_hole(polygon.exterior.clone());
                    let mut response = UpdateResponse::empty();
                    response
                        .data
                        .insert(selected_key.to_string(), vec![Geometry::Polygon(with_hole)]);
                    response.done = Some(true);
                    response
                } else {
                    Self::default_response(track, frame, selected_key, polygon.clone(), true)
                }
            }
            (PolygonDrawMode::NewKey, UpdatePhase::Editing) => {
                let new_key = if key.is_some_and(|k| k != DEFAULT_POLYGON_KEY) {
                    selected_key.to_string()
                } else {
                    track.get_next_polygon_key(frame)
                };
                let mut response = UpdateResponse::empty();
                response.union.push(polygon.clone());
                response
                    .data
                    .insert(new_key.clone(), vec![Geometry::Polygon(polygon.clone())]);
                response.new_selected_key = Some(new_key);
                response.done = Some(true);
                response
            }
            (PolygonDrawMode::Default, phase) => Self::default_response(
                track,
                frame,
                selected_key,
                polygon.clone(),
                phase == UpdatePhase::Editing,
            ),
            // Mid-gesture input in hole/new-key mode commits nothing.
            _ => UpdateResponse::empty(),
        }
    }

    fn activate(&mut self) {
        self.active = true;
        self.activations.publish(RecipeActivation {
            editing: EditType::Polygon,
            key: DEFAULT_POLYGON_KEY.to_string(),
            recipe: Self::NAME,
        });
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.draw_mode = PolygonDrawMode::Default;
    }

    fn delete(&mut self, frame: Frame, track: &Track) -> Vec<GeometryRemoval> {
        track
            .get_polygon_features(frame)
            .into_iter()
            .map(|(key, _)| GeometryRemoval {
                frame,
                key: key.to_string(),
                kind: GeometryKind::Polygon,
            })
            .collect()
    }

    fn delete_point(&mut self) {
        // Vertex editing happens on the drawing surface.
    }

    fn mousetrap(&self) -> Vec<KeyBinding> {
        vec![KeyBinding {
            bind: "d",
            action: KeyAction::Delete,
        }]
    }

    fn handle_key(&mut self, _action: KeyAction) {}

    fn drain_activations(&mut self) -> Vec<RecipeActivation> {
        self.activations.drain()
    }
}
