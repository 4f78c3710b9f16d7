//! Editing mode manager.
//!
//! Orchestrates which recipe/geometry type is active, reconciles concurrent
//! recipe outputs into one committed track update, and implements the
//! higher-level workflows: track creation continuation, multi-select merge,
//! group editing, and cross-camera track linking.
//!
//! The manager is single-threaded and cooperative: every transition happens
//! inline within one update pass, so there is never a concurrent writer to
//! the track/group maps.

use crate::error::EditError;
use crate::events::EventBus;
use crate::geometry::{update_bounds, Geometry};
use crate::model::{FeaturePatch, Frame, FrameFeature, GroupId, TrackId};
use crate::recipe::{
    reconcile, EditType, KeyAction, Recipe, UpdatePhase, UpdateResponse, SEGMENTATION_KEY,
};
use crate::settings::{NewTrackMode, Settings};
use crate::store::{CameraStore, DEFAULT_CAMERA};

/// Yes/no gate for destructive operations. The real implementation lives in
/// the UI layer; tests use [`AlwaysConfirm`].
pub trait ConfirmPrompt {
    fn confirm(&mut self, message: &str) -> bool;
}

/// A prompt that answers yes to everything.
pub struct AlwaysConfirm;

impl ConfirmPrompt for AlwaysConfirm {
    fn confirm(&mut self, _message: &str) -> bool {
        true
    }
}

/// Events emitted for the host (playback controller, notification area).
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Move playback to this frame.
    Seek(Frame),
    /// Show a user-facing notice (read-only block, linking refusal detail).
    Notice(String),
}

/// The annotation editing state machine.
pub struct EditorModeManager {
    store: CameraStore,
    recipes: Vec<Box<dyn Recipe>>,
    settings: Settings,

    selected_camera: String,
    frame: Frame,

    selected_track_id: Option<TrackId>,
    editing_track: bool,
    creating: bool,
    editing_group_id: Option<GroupId>,
    multi_select_list: Vec<TrackId>,
    linking_camera: Option<String>,
    linked_track_id: Option<TrackId>,

    editing_type: EditType,
    selected_key: Option<String>,
    visible_types: Vec<EditType>,

    events: EventBus<EditorEvent>,
}

impl EditorModeManager {
    pub fn new(store: CameraStore, settings: Settings, recipes: Vec<Box<dyn Recipe>>) -> Self {
        let selected_camera = store
            .camera_names()
            .next()
            .unwrap_or(DEFAULT_CAMERA)
            .to_string();
        Self {
            store,
            recipes,
            settings,
            selected_camera,
            frame: 0,
            selected_track_id: None,
            editing_track: false,
            creating: false,
            editing_group_id: None,
            multi_select_list: Vec::new(),
            linking_camera: None,
            linked_track_id: None,
            editing_type: EditType::Rectangle,
            selected_key: None,
            visible_types: vec![
                EditType::Rectangle,
                EditType::Polygon,
                EditType::Line,
                EditType::Point,
            ],
            events: EventBus::default(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn store(&self) -> &CameraStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CameraStore {
        &mut self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn selected_track_id(&self) -> Option<TrackId> {
        self.selected_track_id
    }

    pub fn editing_track(&self) -> bool {
        self.editing_track
    }

    pub fn creating(&self) -> bool {
        self.creating
    }

    pub fn editing_group_id(&self) -> Option<GroupId> {
        self.editing_group_id
    }

    pub fn multi_select_list(&self) -> &[TrackId] {
        &self.multi_select_list
    }

    pub fn linking_camera(&self) -> Option<&str> {
        self.linking_camera.as_deref()
    }

    pub fn linked_track_id(&self) -> Option<TrackId> {
        self.linked_track_id
    }

    pub fn editing_type(&self) -> EditType {
        self.editing_type
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selected_key.as_deref()
    }

    /// Geometry families currently rendered. Hiding a family does not affect
    /// stored data, only what the host draws.
    pub fn visible_types(&self) -> &[EditType] {
        &self.visible_types
    }

    pub fn set_visible_types(&mut self, types: Vec<EditType>) {
        self.visible_types = types;
    }

    pub fn selected_camera(&self) -> &str {
        &self.selected_camera
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn recipes(&self) -> &[Box<dyn Recipe>] {
        &self.recipes
    }

    /// Drain host-facing events queued since the last pass.
    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        self.events.drain()
    }

    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = frame;
    }

    pub fn set_camera(&mut self, camera: &str) -> Result<(), EditError> {
        if !self.store.has_camera(camera) {
            return Err(EditError::CameraNotFound {
                name: camera.to_string(),
            });
        }
        self.selected_camera = camera.to_string();
        Ok(())
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select a track, optionally for editing. In read-only mode an edit
    /// attempt surfaces a notice and the state stays in non-edit selection.
    pub fn select_track(&mut self, id: Option<TrackId>, edit: bool) {
        self.selected_track_id = id;
        if edit && self.settings.read_only {
            self.events.publish(EditorEvent::Notice(
                "This dataset is read-only: annotations cannot be edited".to_string(),
            ));
            self.editing_track = false;
            return;
        }
        self.editing_track = edit && id.is_some();
        if !edit {
            self.creating = false;
        }
    }

    /// Route a plain (non-edit) click on a track through the active mode:
    /// linking consumes it, group edit and merge append to the multi-select
    /// list, otherwise it is a simple selection.
    pub fn handle_track_click(&mut self, id: TrackId) -> Result<(), EditError> {
        if self.linking_camera.is_some() {
            return self.handle_link_click(id);
        }
        if let Some(group_id) = self.editing_group_id {
            self.add_group_member(group_id, id)?;
            return Ok(());
        }
        if !self.multi_select_list.is_empty() {
            if !self.multi_select_list.contains(&id) {
                self.multi_select_list.push(id);
            }
            return Ok(());
        }
        self.select_track(Some(id), false);
        Ok(())
    }

    /// Deselect and clean up: an aborted creation (single-frame track with
    /// no real geometry) is deleted, and any linking/multi-select/group-edit
    /// state is cleared.
    pub fn escape(&mut self) {
        if let Some(id) = self.selected_track_id {
            let abandoned = self
                .store
                .get_any_possible_track(id)
                .is_some_and(|(_, t)| t.is_empty_placeholder());
            if abandoned {
                log::debug!("Escape: deleting aborted track {id}");
                self.store.remove_track(id, None);
            }
        }
        self.selected_track_id = None;
        self.editing_track = false;
        self.creating = false;
        self.multi_select_list.clear();
        self.editing_group_id = None;
        self.linking_camera = None;
        self.linked_track_id = None;
        self.editing_type = EditType::Rectangle;
        self.selected_key = None;
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Allocate a new track at the current frame and select it for editing.
    /// Clears any multi-select/linking/group-edit state first. Returns
    /// `None` when read-only mode blocks the creation.
    pub fn add_track_or_detection(
        &mut self,
        override_id: Option<TrackId>,
        inherit_from: Option<TrackId>,
    ) -> Result<Option<TrackId>, EditError> {
        if self.settings.read_only {
            self.events.publish(EditorEvent::Notice(
                "This dataset is read-only: tracks cannot be created".to_string(),
            ));
            return Ok(None);
        }
        self.multi_select_list.clear();
        self.editing_group_id = None;
        self.linking_camera = None;
        self.linked_track_id = None;

        let track_type = inherit_from
            .and_then(|id| self.store.get_any_possible_track(id))
            .and_then(|(_, t)| t.track_type().map(str::to_string))
            .unwrap_or_else(|| self.settings.new_track_settings.default_type.clone());

        let id =
            self.store
                .add_track(&self.selected_camera, self.frame, track_type, override_id)?;
        self.select_track(Some(id), true);
        self.creating = true;
        log::debug!("Created track {id} at frame {}", self.frame);
        Ok(Some(id))
    }

    // ========================================================================
    // Geometry updates
    // ========================================================================

    /// Process drawing input from the rendering layer: dispatch to recipes
    /// (or the rectangle fast path), reconcile their outputs, commit a
    /// single feature update, then run completion continuation.
    pub fn handle_annotation_update(
        &mut self,
        phase: UpdatePhase,
        drawn: &[Geometry],
        key: Option<&str>,
    ) -> Result<(), EditError> {
        let id = self
            .selected_track_id
            .filter(|_| self.editing_track)
            .ok_or_else(|| EditError::invalid_state("no track selected for editing"))?;
        let frame = self.frame;
        // Callers that do not track the key themselves inherit the active one.
        let key = key.map(str::to_string).or_else(|| self.selected_key.clone());
        let key = key.as_deref();

        let merged = if self.editing_type == EditType::Rectangle {
            // The rectangle tool has no recipe: a drag sets bounds directly.
            let Some(bbox) = drawn.iter().find_map(|g| g.bounding_box()) else {
                return Ok(());
            };
            let mut response = UpdateResponse::empty();
            response.union_without_bounds.push(
                crate::geometry::Polygon::from_bounds(bbox),
            );
            response.done = Some(true);
            response
        } else {
            let responses = {
                let camera = self.store.camera(&self.selected_camera)?;
                let track = camera.tracks.get(id)?;
                let mut responses = Vec::new();
                for recipe in &mut self.recipes {
                    responses.push(recipe.update(phase, frame, track, drawn, key));
                }
                responses
            };
            // Conflicts are fatal before any track mutation.
            reconcile(responses)?
        };

        let UpdateResponse {
            data,
            union,
            union_without_bounds,
            new_type,
            new_selected_key,
            done,
        } = merged;

        if !data.is_empty() || !union.is_empty() || !union_without_bounds.is_empty() {
            let interpolate = self.settings.new_track_settings.interpolate;
            let camera = self.store.camera_mut(&self.selected_camera)?;
            camera.tracks.modify(id, |track| {
                let ctx = track.get_feature(frame);
                let existing_bounds = ctx.feature.as_ref().and_then(|f| f.as_feature().bounds);
                let existing_interpolate = match &ctx.feature {
                    Some(FrameFeature::Real(f)) => Some(f.interpolate),
                    Some(FrameFeature::Interpolated(_)) => Some(true),
                    None => None,
                };
                let bounds = update_bounds(existing_bounds, &union, &union_without_bounds);
                let mut patch = FeaturePatch::new(frame)
                    .keyframe(true)
                    .interpolate(existing_interpolate.unwrap_or(interpolate));
                patch.bounds = bounds;
                track.set_feature(patch, data.into_iter().collect());
            })?;
        }

        if let Some(new_type) = new_type {
            self.editing_type = new_type;
        }
        if let Some(new_key) = new_selected_key {
            self.selected_key = Some(new_key);
        }

        if phase == UpdatePhase::Editing || done != Some(false) {
            self.handle_completion()?;
        }
        Ok(())
    }

    /// Post-completion continuation: Track mode auto-advances the frame and
    /// keeps creating; Detection mode with continuous starts a fresh
    /// detection on the same frame; otherwise creation ends and the track
    /// leaves edit mode.
    fn handle_completion(&mut self) -> Result<(), EditError> {
        if !self.creating {
            return Ok(());
        }
        let settings = &self.settings.new_track_settings;
        match settings.mode {
            NewTrackMode::Track if settings.auto_advance_frame => {
                self.frame = self.frame.saturating_add(1);
                self.events.publish(EditorEvent::Seek(self.frame));
            }
            NewTrackMode::Detection if settings.continuous => {
                self.add_track_or_detection(None, self.selected_track_id)?;
            }
            _ => {
                self.creating = false;
                self.editing_track = false;
            }
        }
        Ok(())
    }

    /// Remove the active recipes' geometry at the current frame from the
    /// selected track.
    pub fn delete_selected_geometry(&mut self) -> Result<(), EditError> {
        let id = self
            .selected_track_id
            .ok_or_else(|| EditError::invalid_state("no track selected"))?;
        let frame = self.frame;
        let removals = {
            let camera = self.store.camera(&self.selected_camera)?;
            let track = camera.tracks.get(id)?;
            let mut removals = Vec::new();
            for recipe in &mut self.recipes {
                if recipe.active() {
                    removals.extend(recipe.delete(frame, track));
                }
            }
            removals
        };
        if removals.is_empty() {
            return Ok(());
        }
        let camera = self.store.camera_mut(&self.selected_camera)?;
        camera.tracks.modify(id, |track| {
            for removal in removals {
                track.remove_feature_geometry(removal.frame, &removal.key, removal.kind);
            }
        })?;
        Ok(())
    }

    // ========================================================================
    // Recipe activation
    // ========================================================================

    /// Activate one recipe by name, deactivating every other recipe first
    /// (mutual exclusion), then apply its activation event to the
    /// annotation state.
    pub fn activate_recipe(&mut self, name: &str) -> Result<(), EditError> {
        if !self.recipes.iter().any(|r| r.name() == name) {
            return Err(EditError::invalid_state(format!("unknown recipe '{name}'")));
        }
        for recipe in &mut self.recipes {
            if recipe.name() != name {
                recipe.deactivate();
            }
        }
        for recipe in &mut self.recipes {
            if recipe.name() == name {
                recipe.activate();
            }
        }
        self.process_recipe_activations();
        Ok(())
    }

    /// Switch back to the fallback rectangle tool.
    pub fn deactivate_recipes(&mut self) {
        for recipe in &mut self.recipes {
            recipe.deactivate();
        }
        self.editing_type = EditType::Rectangle;
        self.selected_key = None;
    }

    /// Drain activation events from all recipes and enforce mutual
    /// exclusion: the most recent activation wins and every other recipe is
    /// deactivated.
    pub fn process_recipe_activations(&mut self) {
        let mut last = None;
        for recipe in &mut self.recipes {
            for activation in recipe.drain_activations() {
                last = Some(activation);
            }
        }
        if let Some(activation) = last {
            for recipe in &mut self.recipes {
                if recipe.name() != activation.recipe && recipe.active() {
                    recipe.deactivate();
                }
            }
            self.editing_type = activation.editing;
            self.selected_key = Some(activation.key);
        }
    }

    /// Route a bound key press to active recipes, then apply any activation
    /// state changes it produced.
    pub fn handle_key(&mut self, action: KeyAction) -> Result<(), EditError> {
        for recipe in &mut self.recipes {
            recipe.handle_key(action);
        }
        self.process_recipe_activations();
        if action == KeyAction::ConfirmPrediction {
            self.confirm_segmentation()?;
        }
        Ok(())
    }

    /// Commit pending segmentation predictions across every frame holding
    /// one, writing polygon + expanded bounds under the segmentation key.
    pub fn confirm_segmentation(&mut self) -> Result<(), EditError> {
        let id = self
            .selected_track_id
            .ok_or_else(|| EditError::invalid_state("no track selected"))?;
        let mut committed = Vec::new();
        for recipe in &mut self.recipes {
            committed.extend(recipe.confirm_pending());
        }
        if committed.is_empty() {
            return Ok(());
        }
        let interpolate = self.settings.new_track_settings.interpolate;
        let camera = self.store.camera_mut(&self.selected_camera)?;
        camera.tracks.modify(id, |track| {
            for (frame, pending) in committed {
                let existing = track
                    .get_feature(frame)
                    .feature
                    .and_then(|f| f.as_feature().bounds);
                let bounds = match existing {
                    Some(b) => b.union(&pending.bounds),
                    None => pending.bounds,
                };
                track.set_feature(
                    FeaturePatch::new(frame)
                        .keyframe(true)
                        .interpolate(interpolate)
                        .bounds(bounds),
                    vec![(
                        SEGMENTATION_KEY.to_string(),
                        vec![Geometry::Polygon(pending.polygon)],
                    )],
                );
            }
        })?;
        Ok(())
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Enter merge mode: seed the multi-select list with the selected track
    /// and force edit mode off. Subsequent non-edit clicks append.
    pub fn toggle_merge(&mut self) -> Result<(), EditError> {
        if !self.multi_select_list.is_empty() {
            self.multi_select_list.clear();
            return Ok(());
        }
        let id = self
            .selected_track_id
            .ok_or_else(|| EditError::invalid_state("select a track before merging"))?;
        self.multi_select_list = vec![id];
        self.editing_track = false;
        self.editing_group_id = None;
        Ok(())
    }

    /// Merge every multi-selected track into the first, delete the rest,
    /// and select the merged result. Gated on confirmation unless the
    /// settings suppress prompts.
    pub fn commit_merge(&mut self, prompt: &mut dyn ConfirmPrompt) -> Result<(), EditError> {
        if self.multi_select_list.len() < 2 {
            return Err(EditError::MergeTooFew {
                count: self.multi_select_list.len(),
            });
        }
        let target = self.multi_select_list[0];
        let rest: Vec<TrackId> = self.multi_select_list[1..].to_vec();
        // The target must resolve before anything is deleted, otherwise a
        // failed merge would still have removed the absorbed tracks.
        self.store.camera(&self.selected_camera)?.tracks.get(target)?;
        if self.settings.prompt_before_delete
            && !prompt.confirm(&format!(
                "Merge {} tracks into track {target}? The other tracks will be deleted.",
                self.multi_select_list.len()
            ))
        {
            return Ok(());
        }

        let mut absorbed = Vec::new();
        for id in &rest {
            let mut removed = self.store.remove_track(*id, None);
            absorbed.append(&mut removed);
        }
        let camera = self.store.camera_mut(&self.selected_camera)?;
        camera.tracks.modify(target, |track| track.merge(absorbed))?;

        self.multi_select_list.clear();
        self.select_track(Some(target), false);
        log::info!("Merged {} tracks into {target}", rest.len() + 1);
        Ok(())
    }

    // ========================================================================
    // Group editing
    // ========================================================================

    /// Enter (or leave, with `None`) group edit mode. Entering selects the
    /// group's members into the multi-select list and seeks to its first
    /// frame.
    pub fn handle_group_edit(&mut self, group_id: Option<GroupId>) -> Result<(), EditError> {
        let Some(group_id) = group_id else {
            self.editing_group_id = None;
            self.multi_select_list.clear();
            return Ok(());
        };
        let camera = self.store.camera(&self.selected_camera)?;
        let group = camera.groups.get(group_id)?;
        self.multi_select_list = group.member_ids();
        let begin = group.begin();
        self.editing_group_id = Some(group_id);
        self.editing_track = false;
        self.selected_track_id = None;
        self.frame = begin;
        self.events.publish(EditorEvent::Seek(begin));
        Ok(())
    }

    /// Add a track to the actively-edited group with its full `[begin, end]`
    /// as the active range.
    fn add_group_member(&mut self, group_id: GroupId, track_id: TrackId) -> Result<(), EditError> {
        let range = {
            let camera = self.store.camera(&self.selected_camera)?;
            let track = camera.tracks.get(track_id)?;
            (track.begin(), track.end())
        };
        let camera = self.store.camera_mut(&self.selected_camera)?;
        camera.groups.modify(group_id, |group| {
            group.add_members([(track_id, vec![range])].into_iter().collect());
        })?;
        if !self.multi_select_list.contains(&track_id) {
            self.multi_select_list.push(track_id);
        }
        Ok(())
    }

    /// Remove a member from the actively-edited group. Removing the last
    /// member exits group-edit mode automatically.
    pub fn remove_group_member(&mut self, track_id: TrackId) -> Result<(), EditError> {
        let group_id = self
            .editing_group_id
            .ok_or_else(|| EditError::invalid_state("no group is being edited"))?;
        let camera = self.store.camera_mut(&self.selected_camera)?;
        let emptied = camera.groups.modify(group_id, |group| {
            group.remove_members(&[track_id]);
            group.is_empty()
        })?;
        self.multi_select_list.retain(|id| *id != track_id);
        if emptied {
            camera.groups.remove(group_id);
            self.editing_group_id = None;
            self.multi_select_list.clear();
            log::debug!("Group {group_id} emptied, exiting group edit");
        }
        Ok(())
    }

    // ========================================================================
    // Cross-camera linking
    // ========================================================================

    /// Begin linking the selected track to a track in `camera`.
    pub fn start_linking(&mut self, camera: &str) -> Result<(), EditError> {
        if self.selected_track_id.is_none() {
            return Err(EditError::linking_unavailable(
                "select a track before linking across cameras",
            ));
        }
        if !self.store.has_camera(camera) {
            return Err(EditError::linking_unavailable(format!(
                "camera '{camera}' does not exist"
            )));
        }
        self.editing_track = false;
        self.multi_select_list.clear();
        self.editing_group_id = None;
        self.linking_camera = Some(camera.to_string());
        self.linked_track_id = None;
        Ok(())
    }

    /// A click on a track while linking: the clicked track must not exist in
    /// any camera other than the linking target, otherwise the link is
    /// refused and the user is directed to split the track first.
    fn handle_link_click(&mut self, id: TrackId) -> Result<(), EditError> {
        let target = self
            .linking_camera
            .clone()
            .ok_or_else(|| EditError::linking_unavailable("not currently linking"))?;
        let elsewhere = self.store.cameras_holding_track(id, &target);
        if !elsewhere.is_empty() {
            return Err(EditError::linking_unavailable(format!(
                "track {id} also exists in camera(s) {}; split the track before linking",
                elsewhere.join(", ")
            )));
        }
        self.linked_track_id = Some(id);
        log::debug!("Linking: track {id} selected in camera '{target}'");
        Ok(())
    }

    /// Clear linking state.
    pub fn stop_linking(&mut self) {
        self.linking_camera = None;
        self.linked_track_id = None;
    }

    /// Make `track_type` the primary type of a track. A metadata-only change;
    /// geometry and temporal extent are untouched.
    pub fn set_track_type(&mut self, id: TrackId, track_type: &str) -> Result<(), EditError> {
        let camera = self.store.camera_mut(&self.selected_camera)?;
        camera.tracks.modify(id, |track| track.set_type(track_type))?;
        camera.tracks.notify_meta(id);
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete a track from every camera, warning about group membership and
    /// gating on confirmation per settings.
    pub fn remove_track(
        &mut self,
        id: TrackId,
        prompt: &mut dyn ConfirmPrompt,
    ) -> Result<bool, EditError> {
        let groups = {
            let camera = self.store.camera(&self.selected_camera)?;
            camera.groups.lookup_groups(id)
        };
        if self.settings.prompt_before_delete {
            let message = if groups.is_empty() {
                format!("Delete track {id}?")
            } else {
                format!(
                    "Delete track {id}? It belongs to {} group(s) which will be updated.",
                    groups.len()
                )
            };
            if !prompt.confirm(&message) {
                return Ok(false);
            }
        }
        self.store.remove_track(id, None);
        if self.selected_track_id == Some(id) {
            self.selected_track_id = None;
            self.editing_track = false;
            self.creating = false;
        }
        self.multi_select_list.retain(|t| *t != id);
        Ok(true)
    }
}

// ============================================================================
// Tests
// ============================================================================
