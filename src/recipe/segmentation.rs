//! Point-click segmentation refinement recipe.
//!
//! The user accumulates foreground/background points on a frame; every new
//! point triggers a prediction request to an external segmentation service,
//! refined with the previous low-resolution mask. Responses produce a
//! *pending* polygon that is only written to the track when the user
//! explicitly confirms. Prompt state is cached per frame, so navigating
//! preserves independent in-progress segmentations.
//!
//! The engine never blocks on the service: requests are published as events
//! for the host to dispatch, and the host delivers responses back through
//! [`PointPromptRecipe::handle_prediction`]. A superseded prediction is
//! simply discarded with its point rolled back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::EventBus;
use crate::geometry::{Bounds, Geometry, GeometryKind, Point, Polygon};
use crate::model::{Frame, Track};
use crate::recipe::{
    EditType, GeometryRemoval, KeyAction, KeyBinding, Recipe, RecipeActivation, UpdatePhase,
    UpdateResponse,
};

/// Geometry key under which confirmed segmentation polygons are stored.
pub const SEGMENTATION_KEY: &str = "SegmentationPolygon";

/// Foreground point label.
pub const LABEL_FOREGROUND: u8 = 1;
/// Background point label.
pub const LABEL_BACKGROUND: u8 = 0;

// ============================================================================
// Service Contract
// ============================================================================

/// Request sent to the external segmentation prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub image_path: String,
    pub frame: Frame,
    pub points: Vec<Point>,
    /// 1 for foreground, 0 for background, parallel to `points`.
    pub point_labels: Vec<u8>,
    /// Low-resolution mask of the previous prediction, for refinement.
    pub mask_input: Option<Vec<f32>>,
    pub multimask_output: bool,
}

/// Response from the external segmentation prediction service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub polygon: Option<Polygon>,
    pub bounds: Option<Bounds>,
    pub low_res_mask: Option<Vec<f32>>,
    pub rle_mask: Option<String>,
    pub mask_shape: Option<(u32, u32)>,
    pub score: Option<f32>,
    pub error: Option<String>,
}

/// A prediction awaiting user confirmation.
#[derive(Debug, Clone)]
pub struct PendingPrediction {
    pub polygon: Polygon,
    pub bounds: Bounds,
    pub low_res_mask: Option<Vec<f32>>,
}

/// Events published by the recipe for the host to act on.
#[derive(Debug)]
pub enum SegmentationEvent {
    /// Dispatch this request to the prediction service and deliver the
    /// response via `handle_prediction`.
    RequestPrediction(PredictRequest),
    /// A pending polygon changed (new prediction, or replay on navigation).
    PendingPolygon {
        frame: Frame,
        polygon: Polygon,
        bounds: Bounds,
    },
    /// The pending state of a frame was cleared.
    PendingCleared { frame: Frame },
    /// The user asked to commit pending predictions (bound to a key).
    ConfirmRequested,
    /// User-facing message, e.g. a prediction rejection.
    Message(String),
}

// ============================================================================
// Recipe
// ============================================================================

#[derive(Debug, Default)]
struct PromptState {
    points: Vec<Point>,
    labels: Vec<u8>,
    pending: Option<PendingPrediction>,
}

pub struct PointPromptRecipe {
    active: bool,
    current_frame: Frame,
    image_path: String,
    /// Per-frame prompt state, preserved across navigation.
    states: BTreeMap<Frame, PromptState>,
    events: EventBus<SegmentationEvent>,
    activations: EventBus<RecipeActivation>,
}

impl PointPromptRecipe {
    pub const NAME: &'static str = "pointprompt";

    pub fn new() -> Self {
        Self {
            active: false,
            current_frame: 0,
            image_path: String::new(),
            states: BTreeMap::new(),
            events: EventBus::default(),
            activations: EventBus::default(),
        }
    }

    /// Drain host-facing events (prediction requests, pending updates,
    /// messages).
    pub fn drain_events(&mut self) -> Vec<SegmentationEvent> {
        self.events.drain()
    }

    /// Navigate to `frame`. The previous frame's state stays cached; if the
    /// new frame holds a pending prediction it is replayed to observers.
    pub fn set_frame(&mut self, frame: Frame, image_path: impl Into<String>) {
        self.current_frame = frame;
        self.image_path = image_path.into();
        if let Some(pending) = self.states.get(&frame).and_then(|s| s.pending.as_ref()) {
            self.events.publish(SegmentationEvent::PendingPolygon {
                frame,
                polygon: pending.polygon.clone(),
                bounds: pending.bounds,
            });
        }
    }

    /// Add a prompt point on the current frame and request a prediction over
    /// the accumulated points.
    pub fn add_point(&mut self, point: Point, label: u8) {
        if !self.active {
            return;
        }
        let frame = self.current_frame;
        let state = self.states.entry(frame).or_default();
        state.points.push(point);
        state.labels.push(label);
        let request = PredictRequest {
            image_path: self.image_path.clone(),
            frame,
            points: state.points.clone(),
            point_labels: state.labels.clone(),
            mask_input: state.pending.as_ref().and_then(|p| p.low_res_mask.clone()),
            multimask_output: state.points.len() == 1,
        };
        log::debug!(
            "Segmentation: requesting prediction for frame {frame} ({} points)",
            request.points.len()
        );
        self.events
            .publish(SegmentationEvent::RequestPrediction(request));
    }

    /// Deliver a service response for `frame`. A successful response becomes
    /// the frame's pending prediction; a failed one rolls back the most
    /// recent point and reports a message, leaving the recipe active.
    pub fn handle_prediction(&mut self, frame: Frame, response: PredictResponse) {
        let Some(state) = self.states.get_mut(&frame) else {
            return;
        };
        match (response.success, response.polygon, response.bounds) {
            (true, Some(polygon), Some(bounds)) => {
                state.pending = Some(PendingPrediction {
                    polygon: polygon.clone(),
                    bounds,
                    low_res_mask: response.low_res_mask,
                });
                self.events.publish(SegmentationEvent::PendingPolygon {
                    frame,
                    polygon,
                    bounds,
                });
            }
            _ => {
                state.points.pop();
                state.labels.pop();
                let message = if state.points.is_empty() {
                    "Segmentation failed: the model produced no prediction".to_string()
                } else {
                    "Point rejected by the segmentation model; try a different location"
                        .to_string()
                };
                log::warn!(
                    "Segmentation: prediction rejected for frame {frame}: {:?}",
                    response.error
                );
                self.events.publish(SegmentationEvent::Message(message));
            }
        }
    }

    /// Frames currently holding a pending prediction.
    pub fn pending_frames(&self) -> Vec<Frame> {
        self.states
            .iter()
            .filter(|(_, s)| s.pending.is_some())
            .map(|(f, _)| *f)
            .collect()
    }

    pub fn pending_for(&self, frame: Frame) -> Option<&PendingPrediction> {
        self.states.get(&frame)?.pending.as_ref()
    }

    /// Commit every pending prediction, clearing prompt state for the
    /// committed frames. Frames without a pending polygon are skipped. The
    /// caller writes the returned polygons to the track.
    pub fn confirm(&mut self) -> Vec<(Frame, PendingPrediction)> {
        let mut committed = Vec::new();
        self.states.retain(|frame, state| {
            if let Some(pending) = state.pending.take() {
                committed.push((*frame, pending));
                false
            } else {
                // Keep unconfirmed point accumulations.
                true
            }
        });
        log::debug!("Segmentation: confirmed {} pending frames", committed.len());
        committed
    }

    fn clear_frame(&mut self, frame: Frame) {
        if self.states.remove(&frame).is_some() {
            self.events
                .publish(SegmentationEvent::PendingCleared { frame });
        }
    }
}

impl Default for PointPromptRecipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Recipe for PointPromptRecipe {
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
        Some("mdi-auto-fix")
    }

    fn update(
        &mut self,
        _phase: UpdatePhase,
        frame: Frame,
        _track: &Track,
        drawn: &[Geometry],
        _key: Option<&str>,
    ) -> UpdateResponse {
        if !self.active {
            return UpdateResponse::empty();
        }
        // A click arrives as a point; everything else belongs elsewhere.
        // Nothing is written to the track until the user confirms.
        let point = drawn.iter().find_map(|g| match g {
            Geometry::Point(p) => Some(*p),
            _ => None,
        });
        if let Some(point) = point {
            self.current_frame = frame;
            self.add_point(point, LABEL_FOREGROUND);
            let mut response = UpdateResponse::empty();
            response.done = Some(false);
            return response;
        }
        UpdateResponse::empty()
    }

    fn activate(&mut self) {
        self.active = true;
        self.activations.publish(RecipeActivation {
            editing: EditType::Point,
            key: SEGMENTATION_KEY.to_string(),
            recipe: Self::NAME,
        });
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn delete(&mut self, frame: Frame, track: &Track) -> Vec<GeometryRemoval> {
        self.clear_frame(frame);
        if track
            .get_feature_geometry(frame, SEGMENTATION_KEY, GeometryKind::Polygon)
            .is_some()
        {
            vec![GeometryRemoval {
                frame,
                key: SEGMENTATION_KEY.to_string(),
                kind: GeometryKind::Polygon,
            }]
        } else {
            Vec::new()
        }
    }

    fn delete_point(&mut self) {
        let frame = self.current_frame;
        let Some(state) = self.states.get_mut(&frame) else {
            return;
        };
        state.points.pop();
        state.labels.pop();
        if state.points.is_empty() {
            self.clear_frame(frame);
        } else {
            // Re-predict over the remaining points.
            let request = PredictRequest {
                image_path: self.image_path.clone(),
                frame,
                points: state.points.clone(),
                point_labels: state.labels.clone(),
                mask_input: state.pending.as_ref().and_then(|p| p.low_res_mask.clone()),
                multimask_output: false,
            };
            self.events
                .publish(SegmentationEvent::RequestPrediction(request));
        }
    }

    fn mousetrap(&self) -> Vec<KeyBinding> {
        vec![
            KeyBinding {
                bind: "enter",
                action: KeyAction::ConfirmPrediction,
            },
            KeyBinding {
                bind: "backspace",
                action: KeyAction::DeletePoint,
            },
        ]
    }

    fn handle_key(&mut self, action: KeyAction) {
        match action {
            KeyAction::ConfirmPrediction => {
                self.events.publish(SegmentationEvent::ConfirmRequested);
            }
            KeyAction::DeletePoint => self.delete_point(),
            _ => {}
        }
    }

    fn drain_activations(&mut self) -> Vec<RecipeActivation> {
        self.activations.drain()
    }

    fn confirm_pending(&mut self) -> Vec<(Frame, PendingPrediction)> {
        self.confirm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_response(size: f64) -> PredictResponse {
        PredictResponse {
            success: true,
            polygon: Some(Polygon::from_bounds(Bounds::new(0.0, 0.0, size, size))),
            bounds: Some(Bounds::new(0.0, 0.0, size, size)),
            low_res_mask: Some(vec![0.5; 4]),
            score: Some(0.9),
            ..Default::default()
        }
    }

    fn failure_response() -> PredictResponse {
        PredictResponse {
            success: false,
            error: Some("no mask".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_point_triggers_request_with_mask_refinement() {
        let mut recipe = PointPromptRecipe::new();
        recipe.activate();
        recipe.set_frame(3, "frame3.png");

        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);
        let events = recipe.drain_events();
        let Some(SegmentationEvent::RequestPrediction(request)) = events.first() else {
            panic!("expected prediction request");
        };
        assert_eq!(request.points.len(), 1);
        assert!(request.mask_input.is_none());

        recipe.handle_prediction(3, success_response(10.0));
        recipe.add_point(Point::new(2.0, 2.0), LABEL_BACKGROUND);
        let events = recipe.drain_events();
        let request = events.iter().find_map(|e| match e {
            SegmentationEvent::RequestPrediction(r) => Some(r),
            _ => None,
        });
        let request = request.expect("expected refinement request");
        assert_eq!(request.point_labels, vec![LABEL_FOREGROUND, LABEL_BACKGROUND]);
        assert!(request.mask_input.is_some());
    }

    #[test]
    fn test_rejection_rolls_back_point_with_distinct_messages() {
        let mut recipe = PointPromptRecipe::new();
        recipe.activate();
        recipe.set_frame(0, "frame0.png");

        // First point fails: full failure message, zero points remain.
        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);
        recipe.drain_events();
        recipe.handle_prediction(0, failure_response());
        let events = recipe.drain_events();
        let Some(SegmentationEvent::Message(msg)) = events.first() else {
            panic!("expected message");
        };
        assert!(msg.contains("failed"));
        assert!(recipe.pending_frames().is_empty());

        // Later point fails: partial rejection message, earlier point kept.
        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);
        recipe.handle_prediction(0, success_response(5.0));
        recipe.add_point(Point::new(9.0, 9.0), LABEL_FOREGROUND);
        recipe.drain_events();
        recipe.handle_prediction(0, failure_response());
        let events = recipe.drain_events();
        let Some(SegmentationEvent::Message(msg)) = events.first() else {
            panic!("expected message");
        };
        assert!(msg.contains("rejected"));
        // Recipe stays active for retry.
        assert!(recipe.active());
        assert_eq!(recipe.pending_frames(), vec![0]);
    }

    #[test]
    fn test_per_frame_state_preserved_across_navigation() {
        let mut recipe = PointPromptRecipe::new();
        recipe.activate();

        recipe.set_frame(0, "frame0.png");
        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);
        recipe.handle_prediction(0, success_response(5.0));

        recipe.set_frame(7, "frame7.png");
        recipe.add_point(Point::new(2.0, 2.0), LABEL_FOREGROUND);
        recipe.handle_prediction(7, success_response(9.0));
        recipe.drain_events();

        // Navigating back replays frame 0's pending prediction.
        recipe.set_frame(0, "frame0.png");
        let events = recipe.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SegmentationEvent::PendingPolygon { frame: 0, .. }
        )));
        assert_eq!(recipe.pending_frames(), vec![0, 7]);
    }

    #[test]
    fn test_confirm_commits_pending_frames_only() {
        let mut recipe = PointPromptRecipe::new();
        recipe.activate();

        recipe.set_frame(0, "frame0.png");
        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);
        recipe.handle_prediction(0, success_response(5.0));

        // Frame 3 has points but no successful prediction.
        recipe.set_frame(3, "frame3.png");
        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);

        let committed = recipe.confirm();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].0, 0);
        // Unconfirmed accumulation on frame 3 survives.
        assert!(recipe.pending_frames().is_empty());
        recipe.handle_prediction(3, success_response(2.0));
        assert_eq!(recipe.pending_frames(), vec![3]);
    }

    #[test]
    fn test_delete_point_reissues_prediction() {
        let mut recipe = PointPromptRecipe::new();
        recipe.activate();
        recipe.set_frame(0, "frame0.png");
        recipe.add_point(Point::new(1.0, 1.0), LABEL_FOREGROUND);
        recipe.add_point(Point::new(2.0, 2.0), LABEL_FOREGROUND);
        recipe.drain_events();

        recipe.delete_point();
        let events = recipe.drain_events();
        let request = events.iter().find_map(|e| match e {
            SegmentationEvent::RequestPrediction(r) => Some(r),
            _ => None,
        });
        assert_eq!(request.unwrap().points.len(), 1);

        // Removing the last point clears the frame.
        recipe.delete_point();
        let events = recipe.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SegmentationEvent::PendingCleared { frame: 0 })));
    }
}
