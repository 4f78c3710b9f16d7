//! Pluggable geometry-composition strategies ("recipes").
//!
//! A recipe turns raw drawing input into named geometry patches plus
//! bounding-box hints. The mode manager invokes every recipe with the same
//! input; recipes that do not apply return an empty response. The manager
//! merges all responses through [`reconcile`] before any track mutation — a
//! geometry key written by two recipes in one pass is a fatal conflict.
//!
//! The rectangle tool is not a recipe: a bounds drag writes `bounds`
//! directly and the manager treats it as the fallback editing type.

mod head_tail;
mod polygon;
mod segmentation;

pub use head_tail::{HeadTailRecipe, HEAD_KEY, HEAD_TAIL_KEY, TAIL_KEY};
pub use polygon::{PolygonDrawMode, PolygonRecipe};
pub use segmentation::{
    PendingPrediction, PointPromptRecipe, PredictRequest, PredictResponse, SegmentationEvent,
    LABEL_BACKGROUND, LABEL_FOREGROUND, SEGMENTATION_KEY,
};

use std::collections::BTreeMap;

use crate::error::EditError;
use crate::geometry::{Geometry, Polygon};
use crate::model::{Frame, Track};

/// Which geometry family is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditType {
    /// Rectangle bounds drag, the fallback tool.
    #[default]
    Rectangle,
    Polygon,
    Line,
    Point,
}

/// Whether the drawing surface is mid-gesture or has committed a complete
/// geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    InProgress,
    Editing,
}

/// A recipe's contribution to one update pass.
#[derive(Debug, Default)]
pub struct UpdateResponse {
    /// Geometry to write, keyed by geometry key. Possibly empty.
    pub data: BTreeMap<String, Vec<Geometry>>,
    /// Bboxes merged into the existing bounds.
    pub union: Vec<Polygon>,
    /// Bboxes that replace the baseline bounds.
    pub union_without_bounds: Vec<Polygon>,
    /// Request to switch the active geometry type.
    pub new_type: Option<EditType>,
    /// Request to switch the active geometry key.
    pub new_selected_key: Option<String>,
    /// Whether this recipe considers the gesture complete. `None` counts as
    /// complete for continuation purposes.
    pub done: Option<bool>,
}

impl UpdateResponse {
    /// The no-op response of a recipe that does not apply to the input.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Activation event emitted by a recipe, e.g. when a keyboard shortcut
/// switches it on. The manager reacts by deactivating every other recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeActivation {
    pub editing: EditType,
    pub key: String,
    pub recipe: &'static str,
}

/// A semantic key action a recipe can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Begin collecting the head point of a head/tail line.
    HeadPoint,
    /// Begin collecting the tail point of a head/tail line.
    TailPoint,
    /// Commit all pending segmentation predictions.
    ConfirmPrediction,
    /// Remove the active recipe's whole geometry.
    Delete,
    /// Remove the most recently placed point.
    DeletePoint,
}

/// A keyboard binding exposed by a recipe. The host binds/unbinds these on
/// recipe activation/deactivation and routes presses back via
/// [`Recipe::handle_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub bind: &'static str,
    pub action: KeyAction,
}

/// The capability set shared by all geometry strategies. The mode manager
/// depends only on this trait, never on concrete recipe types.
pub trait Recipe {
    fn name(&self) -> &'static str;

    fn active(&self) -> bool;

    /// Whether the host may toggle this recipe from the toolbar.
    fn toggleable(&self) -> bool {
        false
    }

    fn icon(&self) -> Option<&'static str> {
        None
    }

    /// Process drawing input for `track` at `frame`. `drawn` holds the
    /// geometry produced by the drawing surface; `key` is the active
    /// geometry key if one is selected.
    fn update(
        &mut self,
        phase: UpdatePhase,
        frame: Frame,
        track: &Track,
        drawn: &[Geometry],
        key: Option<&str>,
    ) -> UpdateResponse;

    fn activate(&mut self);

    fn deactivate(&mut self);

    /// Remove this recipe's geometry from the selected track/frame. The
    /// actual track mutation is returned as removal requests for the manager.
    fn delete(&mut self, frame: Frame, track: &Track) -> Vec<GeometryRemoval>;

    /// Remove the most recently placed point, if the recipe collects points.
    fn delete_point(&mut self);

    /// Keyboard bindings valid while this recipe is active.
    fn mousetrap(&self) -> Vec<KeyBinding>;

    /// Route a bound key press into the recipe.
    fn handle_key(&mut self, action: KeyAction);

    /// Drain activation events queued since the last pass.
    fn drain_activations(&mut self) -> Vec<RecipeActivation>;

    /// Hand over staged multi-frame geometry for commit. Recipes without a
    /// pending stage return nothing.
    fn confirm_pending(&mut self) -> Vec<(Frame, PendingPrediction)> {
        Vec::new()
    }
}

/// A request to remove one named geometry entry from a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryRemoval {
    pub frame: Frame,
    pub key: String,
    pub kind: crate::geometry::GeometryKind,
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Merge all active recipes' responses into one. Fatal if two recipes wrote
/// the same geometry key, or if more than one requested a type/key switch.
/// `union` lists are concatenated; the bounds algorithm runs afterwards.
pub fn reconcile(responses: Vec<UpdateResponse>) -> Result<UpdateResponse, EditError> {
    let mut merged = UpdateResponse::empty();
    let mut all_done = true;
    for response in responses {
        for (key, geoms) in response.data {
            if merged.data.contains_key(&key) {
                return Err(EditError::RecipeKeyConflict { key });
            }
            merged.data.insert(key, geoms);
        }
        merged.union.extend(response.union);
        merged
            .union_without_bounds
            .extend(response.union_without_bounds);
        if let Some(new_type) = response.new_type {
            if merged.new_type.is_some() {
                return Err(EditError::recipe_state_conflict(
                    "multiple recipes requested an editing type change",
                ));
            }
            merged.new_type = Some(new_type);
        }
        if let Some(new_key) = response.new_selected_key {
            if merged.new_selected_key.is_some() {
                return Err(EditError::recipe_state_conflict(
                    "multiple recipes requested a selected key change",
                ));
            }
            merged.new_selected_key = Some(new_key);
        }
        if response.done == Some(false) {
            all_done = false;
        }
    }
    merged.done = Some(all_done);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Bounds, Point};

    fn response_with_key(key: &str) -> UpdateResponse {
        let mut r = UpdateResponse::empty();
        r.data
            .insert(key.to_string(), vec![Geometry::Point(Point::new(0.0, 0.0))]);
        r
    }

    #[test]
    fn test_reconcile_merges_disjoint_keys() {
        let merged =
            reconcile(vec![response_with_key("head"), response_with_key("tail")]).unwrap();
        assert_eq!(merged.data.len(), 2);
        assert_eq!(merged.done, Some(true));
    }

    #[test]
    fn test_reconcile_key_conflict_fatal() {
        let result = reconcile(vec![response_with_key(""), response_with_key("")]);
        assert!(matches!(result, Err(EditError::RecipeKeyConflict { key }) if key.is_empty()));
    }

    #[test]
    fn test_reconcile_type_conflict_fatal() {
        let mut a = UpdateResponse::empty();
        a.new_type = Some(EditType::Line);
        let mut b = UpdateResponse::empty();
        b.new_type = Some(EditType::Polygon);
        assert!(reconcile(vec![a, b]).is_err());
    }

    #[test]
    fn test_reconcile_done_tracks_incomplete_recipes() {
        let mut incomplete = UpdateResponse::empty();
        incomplete.done = Some(false);
        let merged = reconcile(vec![UpdateResponse::empty(), incomplete]).unwrap();
        assert_eq!(merged.done, Some(false));
    }

    #[test]
    fn test_reconcile_concatenates_unions() {
        let mut a = UpdateResponse::empty();
        a.union.push(Polygon::from_bounds(Bounds::new(0.0, 0.0, 1.0, 1.0)));
        let mut b = UpdateResponse::empty();
        b.union.push(Polygon::from_bounds(Bounds::new(2.0, 2.0, 3.0, 3.0)));
        b.union_without_bounds
            .push(Polygon::from_bounds(Bounds::new(4.0, 4.0, 5.0, 5.0)));
        let merged = reconcile(vec![a, b]).unwrap();
        assert_eq!(merged.union.len(), 2);
        assert_eq!(merged.union_without_bounds.len(), 1);
    }
}
