//! Head/tail line recipe.
//!
//! Collects up to two endpoints. A single placed point yields a preliminary
//! point feature (`head` or `tail`, depending on which end is being
//! collected) with a small padding box for bounds. Two points yield head,
//! tail, and the connecting line, with bounds set to a parallelogram padded
//! 10% beyond the line in its local coordinate frame.

use crate::events::EventBus;
use crate::geometry::{Bounds, Geometry, GeometryKind, Line, Point, Polygon};
use crate::model::{Frame, Track};
use crate::recipe::{
    EditType, GeometryRemoval, KeyAction, KeyBinding, Recipe, RecipeActivation, UpdatePhase,
    UpdateResponse,
};

pub const HEAD_KEY: &str = "head";
pub const TAIL_KEY: &str = "tail";
pub const HEAD_TAIL_KEY: &str = "HeadTails";

/// Padding box half-size around a single preliminary point.
const POINT_PAD: f64 = 10.0;
/// Fraction of line length/width added beyond the endpoints.
const LINE_PAD_FRACTION: f64 = 0.1;

pub struct HeadTailRecipe {
    active: bool,
    /// When true the first placed point is the tail, not the head.
    collect_tail_first: bool,
    activations: EventBus<RecipeActivation>,
}

impl HeadTailRecipe {
    pub const NAME: &'static str = "headtail";

    pub fn new() -> Self {
        Self {
            active: false,
            collect_tail_first: false,
            activations: EventBus::default(),
        }
    }

    fn begin(&mut self, tail_first: bool) {
        self.active = true;
        self.collect_tail_first = tail_first;
        self.activations.publish(RecipeActivation {
            editing: EditType::Line,
            key: HEAD_TAIL_KEY.to_string(),
            recipe: Self::NAME,
        });
    }

    /// Parallelogram around the line from `p1` to `p2`, padded 10% of the
    /// line length along the line direction and its perpendicular.
    fn padded_parallelogram(p1: Point, p2: Point) -> Option<Polygon> {
        let length = p1.distance_to(&p2);
        if length == 0.0 {
            return None;
        }
        let ux = (p2.x - p1.x) / length;
        let uy = (p2.y - p1.y) / length;
        let (nx, ny) = (-uy, ux);
        let pad = length * LINE_PAD_FRACTION;
        Some(Polygon::new(vec![
            Point::new(p1.x - ux * pad + nx * pad, p1.y - uy * pad + ny * pad),
            Point::new(p2.x + ux * pad + nx * pad, p2.y + uy * pad + ny * pad),
            Point::new(p2.x + ux * pad - nx * pad, p2.y + uy * pad - ny * pad),
            Point::new(p1.x - ux * pad - nx * pad, p1.y - uy * pad - ny * pad),
        ]))
    }
}

impl Default for HeadTailRecipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Recipe for HeadTailRecipe {
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
        Some("mdi-vector-line")
    }

    fn update(
        &mut self,
        _phase: UpdatePhase,
        _frame: Frame,
        _track: &Track,
        drawn: &[Geometry],
        key: Option<&str>,
    ) -> UpdateResponse {
        if !self.active {
            return UpdateResponse::empty();
        }
        // Only line input applies; any other geometry belongs to another recipe.
        let line = drawn.iter().find_map(|g| match g {
            Geometry::Line(l) => Some(l),
            _ => None,
        });
        let Some(line) = line else {
            return UpdateResponse::empty();
        };
        if key.is_some_and(|k| k != HEAD_TAIL_KEY) {
            return UpdateResponse::empty();
        }

        let mut response = UpdateResponse::empty();
        match line.points.as_slice() {
            [] => UpdateResponse::empty(),
            [single] => {
                let end_key = if self.collect_tail_first { TAIL_KEY } else { HEAD_KEY };
                response
                    .data
                    .insert(end_key.to_string(), vec![Geometry::Point(*single)]);
                response.union.push(Polygon::from_bounds(
                    Bounds::from_point(*single).padded(POINT_PAD),
                ));
                response.done = Some(false);
                response
            }
            [first, second, ..] => {
                let (head, tail) = if self.collect_tail_first {
                    (*second, *first)
                } else {
                    (*first, *second)
                };
                response
                    .data
                    .insert(HEAD_KEY.to_string(), vec![Geometry::Point(head)]);
                response
                    .data
                    .insert(TAIL_KEY.to_string(), vec![Geometry::Point(tail)]);
                response.data.insert(
                    HEAD_TAIL_KEY.to_string(),
                    vec![Geometry::Line(Line::new(vec![head, tail]))],
                );
                if let Some(poly) = Self::padded_parallelogram(head, tail) {
                    response.union_without_bounds.push(poly);
                }
                response.new_selected_key = Some(HEAD_TAIL_KEY.to_string());
                response.done = Some(true);
                response
            }
        }
    }

    fn activate(&mut self) {
        self.begin(false);
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.collect_tail_first = false;
    }

    fn delete(&mut self, frame: Frame, track: &Track) -> Vec<GeometryRemoval> {
        let mut removals = Vec::new();
        for (key, kind) in [
            (HEAD_KEY, GeometryKind::Point),
            (TAIL_KEY, GeometryKind::Point),
            (HEAD_TAIL_KEY, GeometryKind::Line),
        ] {
            if track.get_feature_geometry(frame, key, kind).is_some() {
                removals.push(GeometryRemoval {
                    frame,
                    key: key.to_string(),
                    kind,
                });
            }
        }
        removals
    }

    fn delete_point(&mut self) {
        // Point collection lives on the drawing surface; nothing cached here.
    }

    fn mousetrap(&self) -> Vec<KeyBinding> {
        vec![
            KeyBinding {
                bind: "h",
                action: KeyAction::HeadPoint,
            },
            KeyBinding {
                bind: "t",
                action: KeyAction::TailPoint,
            },
        ]
    }

    fn handle_key(&mut self, action: KeyAction) {
        match action {
            KeyAction::HeadPoint => self.begin(false),
            KeyAction::TailPoint => self.begin(true),
            _ => {}
        }
    }

    fn drain_activations(&mut self) -> Vec<RecipeActivation> {
        self.activations.drain()
    }
}
