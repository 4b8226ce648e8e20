//! Interaction state machines for overlay fields
//!
//! Every field kind shares the same gesture handling: drag and resize update
//! an in-memory preview rectangle and only write to the store when the
//! gesture ends. Kind-specific editing (text drafts, signature capture, the
//! selection action menu) lives in the submodules.

mod selection;
mod signature;
mod text;

use std::collections::HashMap;

pub use selection::SelectionFieldController;
pub use signature::SignatureFieldController;
pub use text::TextFieldController;

use crate::annotation::{Annotation, AnnotationId, AnnotationKind, SelectionAction, TextStyle};
use crate::capture::CaptureMode;
use crate::coords::ScreenRect;
use crate::error::{ControllerError, StoreError};
use crate::store::{AnnotationPatch, AnnotationStore};

/// Smallest width or height a resize can produce, in screen pixels
pub const MIN_FIELD_SIZE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl ResizeHandle {
    fn moves_left(self) -> bool {
        matches!(self, ResizeHandle::W | ResizeHandle::NW | ResizeHandle::SW)
    }

    fn moves_right(self) -> bool {
        matches!(self, ResizeHandle::E | ResizeHandle::NE | ResizeHandle::SE)
    }

    fn moves_top(self) -> bool {
        matches!(self, ResizeHandle::N | ResizeHandle::NE | ResizeHandle::NW)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, ResizeHandle::S | ResizeHandle::SE | ResizeHandle::SW)
    }
}

/// Pointer and keyboard input routed to one field. Coordinates are screen pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    DoubleClick,
    DragStart { x: f64, y: f64 },
    DragMove { x: f64, y: f64 },
    DragEnd,
    ResizeStart { handle: ResizeHandle, x: f64, y: f64 },
    ResizeMove { x: f64, y: f64 },
    ResizeEnd,
    /// Full current contents of a text editor
    Input(String),
    SetStyle(TextStyle),
    Enter,
    Escape,
    Blur,
    Confirm,
    Delete,
    SetCaptureMode(CaptureMode),
    /// Stroke points are relative to the field's top-left corner
    StrokeStart { x: f64, y: f64 },
    StrokeMove { x: f64, y: f64 },
    StrokeEnd,
    Upload(Vec<u8>),
    ClearCapture,
    ChooseAction(SelectionAction),
}

/// What handling an event did. Ordered by how far-reaching the effect was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    /// Not applicable in the current state
    Ignored,
    /// Local state changed (draft, preview, capture); the store did not
    Updated,
    /// The store was written
    Committed,
    /// The annotation was deleted
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Editing,
    Dragging,
    Resizing,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureKind {
    Drag,
    Resize(ResizeHandle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Gesture {
    kind: GestureKind,
    anchor: (f64, f64),
    origin: ScreenRect,
    preview: ScreenRect,
}

impl Gesture {
    fn track(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let (dx, dy) = (x - self.anchor.0, y - self.anchor.1);
        let origin = self.origin;

        self.preview = match self.kind {
            GestureKind::Drag => {
                ScreenRect::new(origin.x + dx, origin.y + dy, origin.width, origin.height)
            }
            GestureKind::Resize(handle) => {
                let (mut left, mut right) = (origin.x, origin.right());
                let (mut top, mut bottom) = (origin.y, origin.bottom());
                if handle.moves_left() {
                    left = (left + dx).min(right - MIN_FIELD_SIZE);
                }
                if handle.moves_right() {
                    right = (right + dx).max(left + MIN_FIELD_SIZE);
                }
                if handle.moves_top() {
                    top = (top + dy).min(bottom - MIN_FIELD_SIZE);
                }
                if handle.moves_bottom() {
                    bottom = (bottom + dy).max(top + MIN_FIELD_SIZE);
                }
                ScreenRect::new(left, top, right - left, bottom - top)
            }
        };
    }
}

/// Gesture and lifecycle state shared by every field controller
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    id: AnnotationId,
    state: ControllerState,
    gesture: Option<Gesture>,
}

impl Frame {
    fn new(id: AnnotationId) -> Self {
        Self {
            id,
            state: ControllerState::Idle,
            gesture: None,
        }
    }

    fn stored_rect(&self, store: &AnnotationStore) -> Result<ScreenRect, StoreError> {
        store
            .get(self.id)
            .map(|a| a.rect)
            .ok_or(StoreError::NotFound(self.id))
    }

    fn begin(
        &mut self,
        store: &AnnotationStore,
        kind: GestureKind,
        x: f64,
        y: f64,
    ) -> Result<Outcome, ControllerError> {
        if !x.is_finite() || !y.is_finite() {
            return Ok(Outcome::Ignored);
        }
        let origin = self.stored_rect(store)?;
        self.gesture = Some(Gesture {
            kind,
            anchor: (x, y),
            origin,
            preview: origin,
        });
        self.state = match kind {
            GestureKind::Drag => ControllerState::Dragging,
            GestureKind::Resize(_) => ControllerState::Resizing,
        };
        Ok(Outcome::Updated)
    }

    fn track(&mut self, resizing: bool, x: f64, y: f64) -> Outcome {
        match self.gesture.as_mut() {
            Some(gesture) if matches!(gesture.kind, GestureKind::Resize(_)) == resizing => {
                gesture.track(x, y);
                Outcome::Updated
            }
            _ => Outcome::Ignored,
        }
    }

    /// Write the preview rectangle (position and size together) and go idle
    fn finish(
        &mut self,
        store: &mut AnnotationStore,
        resizing: bool,
    ) -> Result<Outcome, ControllerError> {
        let Some(gesture) = self.gesture else {
            return Ok(Outcome::Ignored);
        };
        if matches!(gesture.kind, GestureKind::Resize(_)) != resizing {
            return Ok(Outcome::Ignored);
        }
        self.gesture = None;
        self.state = ControllerState::Idle;

        if gesture.preview == gesture.origin {
            return Ok(Outcome::Updated);
        }
        store.update(self.id, AnnotationPatch::rect(gesture.preview))?;
        Ok(Outcome::Committed)
    }

    /// Drop an in-flight gesture without writing
    fn abandon(&mut self) -> Outcome {
        if self.gesture.take().is_some() {
            self.state = ControllerState::Idle;
            Outcome::Updated
        } else {
            Outcome::Ignored
        }
    }

    fn is_gesturing(&self) -> bool {
        self.gesture.is_some()
    }

    fn delete(&mut self, store: &mut AnnotationStore) -> Result<Outcome, ControllerError> {
        store.remove(self.id)?;
        self.gesture = None;
        self.state = ControllerState::Removed;
        tracing::debug!(annotation_id = %self.id, "field deleted");
        Ok(Outcome::Removed)
    }

    /// Events every kind handles identically. `None` means the kind decides.
    fn handle_shared(
        &mut self,
        store: &mut AnnotationStore,
        event: &OverlayEvent,
    ) -> Option<Result<Outcome, ControllerError>> {
        match *event {
            OverlayEvent::DragMove { x, y } => Some(Ok(self.track(false, x, y))),
            OverlayEvent::ResizeMove { x, y } => Some(Ok(self.track(true, x, y))),
            OverlayEvent::DragEnd => Some(self.finish(store, false)),
            OverlayEvent::ResizeEnd => Some(self.finish(store, true)),
            OverlayEvent::Delete => Some(self.delete(store)),
            _ => None,
        }
    }

    fn preview(&self) -> Option<ScreenRect> {
        self.gesture.map(|g| g.preview)
    }
}

/// Controller for one annotation, dispatched on its kind
#[derive(Debug, Clone)]
pub enum Overlay {
    Text(TextFieldController),
    Signature(SignatureFieldController),
    Selection(SelectionFieldController),
}

impl Overlay {
    pub fn for_annotation(annotation: &Annotation) -> Self {
        match annotation.kind() {
            AnnotationKind::TextField => Overlay::Text(TextFieldController::new(annotation.id)),
            AnnotationKind::SignatureField => {
                Overlay::Signature(SignatureFieldController::new(annotation.id))
            }
            AnnotationKind::SelectionField => {
                Overlay::Selection(SelectionFieldController::new(annotation.id))
            }
        }
    }

    fn frame(&self) -> &Frame {
        match self {
            Overlay::Text(c) => &c.frame,
            Overlay::Signature(c) => &c.frame,
            Overlay::Selection(c) => &c.frame,
        }
    }

    pub fn id(&self) -> AnnotationId {
        self.frame().id
    }

    pub fn state(&self) -> ControllerState {
        self.frame().state
    }

    /// Rectangle to draw: the gesture preview if one is active, else the stored rect
    pub fn display_rect(&self, store: &AnnotationStore) -> Option<ScreenRect> {
        self.frame()
            .preview()
            .or_else(|| store.get(self.id()).map(|a| a.rect))
    }

    pub fn handle(
        &mut self,
        store: &mut AnnotationStore,
        event: OverlayEvent,
    ) -> Result<Outcome, ControllerError> {
        if self.state() == ControllerState::Removed {
            return Ok(Outcome::Ignored);
        }
        match self {
            Overlay::Text(c) => c.handle(store, event),
            Overlay::Signature(c) => c.handle(store, event),
            Overlay::Selection(c) => c.handle(store, event),
        }
    }

    fn resync(&mut self, annotation: &Annotation) {
        if let Overlay::Signature(c) = self {
            c.resync(annotation);
        }
    }
}

/// All controllers of an open document, keyed by annotation id
#[derive(Debug, Clone, Default)]
pub struct OverlayLayer {
    controllers: HashMap<AnnotationId, Overlay>,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the controller set to the store: add controllers for new
    /// annotations, drop those whose annotation is gone (delete, undo).
    pub fn sync(&mut self, store: &AnnotationStore) {
        self.controllers
            .retain(|id, _| store.get(*id).is_some());
        for annotation in store.all() {
            self.controllers
                .entry(annotation.id)
                .and_modify(|overlay| overlay.resync(annotation))
                .or_insert_with(|| Overlay::for_annotation(annotation));
        }
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Overlay> {
        self.controllers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn dispatch(
        &mut self,
        store: &mut AnnotationStore,
        id: AnnotationId,
        event: OverlayEvent,
    ) -> Result<Outcome, ControllerError> {
        if !self.controllers.contains_key(&id) {
            if let Some(annotation) = store.get(id) {
                self.controllers.insert(id, Overlay::for_annotation(annotation));
            }
        }
        let Some(overlay) = self.controllers.get_mut(&id) else {
            tracing::warn!(annotation_id = %id, "event for unknown field ignored");
            return Err(StoreError::NotFound(id).into());
        };

        let outcome = overlay.handle(store, event)?;
        if outcome == Outcome::Removed {
            self.controllers.remove(&id);
        }
        Ok(outcome)
    }

    /// Page navigation: blur every field. Text drafts commit, gestures are
    /// abandoned without writing, open menus and capture pads close.
    pub fn navigate(&mut self, store: &mut AnnotationStore) {
        let mut ids: Vec<AnnotationId> = self.controllers.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Some(overlay) = self.controllers.get_mut(&id) {
                if let Err(error) = overlay.handle(store, OverlayEvent::Blur) {
                    tracing::warn!(
                        annotation_id = %id,
                        error = %error,
                        "blur on navigation failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store_with(kind: AnnotationKind) -> (AnnotationStore, AnnotationId) {
        let mut store = AnnotationStore::new();
        let id = store.create(kind, 1, ScreenRect::new(100.0, 100.0, 100.0, 30.0));
        (store, id)
    }

    #[test]
    fn test_drag_moves_do_not_touch_store() {
        let (mut store, id) = store_with(AnnotationKind::TextField);
        let mut layer = OverlayLayer::new();
        layer.sync(&store);
        let before = store.snapshot();

        layer.dispatch(&mut store, id, OverlayEvent::DragStart { x: 110.0, y: 110.0 }).unwrap();
        for step in 1..=5 {
            let outcome = layer
                .dispatch(
                    &mut store,
                    id,
                    OverlayEvent::DragMove {
                        x: 110.0 + step as f64 * 10.0,
                        y: 110.0,
                    },
                )
                .unwrap();
            assert_eq!(outcome, Outcome::Updated);
            assert_eq!(store.snapshot(), before);
        }
        assert_eq!(layer.get(id).unwrap().state(), ControllerState::Dragging);
        assert_eq!(
            layer.get(id).unwrap().display_rect(&store),
            Some(ScreenRect::new(150.0, 100.0, 100.0, 30.0))
        );

        let outcome = layer.dispatch(&mut store, id, OverlayEvent::DragEnd).unwrap();
        assert_eq!(outcome, Outcome::Committed);
        assert_eq!(store.get(id).unwrap().rect, ScreenRect::new(150.0, 100.0, 100.0, 30.0));
        assert_eq!(layer.get(id).unwrap().state(), ControllerState::Idle);
    }

    #[test]
    fn test_resize_commits_position_and_size_together() {
        let (mut store, id) = store_with(AnnotationKind::TextField);
        let mut layer = OverlayLayer::new();
        layer.sync(&store);

        layer
            .dispatch(
                &mut store,
                id,
                OverlayEvent::ResizeStart {
                    handle: ResizeHandle::NW,
                    x: 100.0,
                    y: 100.0,
                },
            )
            .unwrap();
        layer.dispatch(&mut store, id, OverlayEvent::ResizeMove { x: 80.0, y: 90.0 }).unwrap();
        layer.dispatch(&mut store, id, OverlayEvent::ResizeEnd).unwrap();

        assert_eq!(store.get(id).unwrap().rect, ScreenRect::new(80.0, 90.0, 120.0, 40.0));
        // One write: a single undo restores the original geometry
        assert!(store.undo());
        assert_eq!(store.get(id).unwrap().rect, ScreenRect::new(100.0, 100.0, 100.0, 30.0));
    }

    #[test]
    fn test_resize_respects_minimum_size() {
        let (mut store, id) = store_with(AnnotationKind::TextField);
        let mut layer = OverlayLayer::new();
        layer.sync(&store);

        layer
            .dispatch(
                &mut store,
                id,
                OverlayEvent::ResizeStart {
                    handle: ResizeHandle::SE,
                    x: 200.0,
                    y: 130.0,
                },
            )
            .unwrap();
        layer.dispatch(&mut store, id, OverlayEvent::ResizeMove { x: 0.0, y: 0.0 }).unwrap();
        layer.dispatch(&mut store, id, OverlayEvent::ResizeEnd).unwrap();

        let rect = store.get(id).unwrap().rect;
        assert_eq!((rect.x, rect.y), (100.0, 100.0));
        assert_eq!((rect.width, rect.height), (MIN_FIELD_SIZE, MIN_FIELD_SIZE));
    }

    #[test]
    fn test_edge_handles_only_move_their_edge() {
        let (mut store, id) = store_with(AnnotationKind::TextField);
        let mut layer = OverlayLayer::new();
        layer.sync(&store);

        layer
            .dispatch(
                &mut store,
                id,
                OverlayEvent::ResizeStart {
                    handle: ResizeHandle::W,
                    x: 100.0,
                    y: 115.0,
                },
            )
            .unwrap();
        layer.dispatch(&mut store, id, OverlayEvent::ResizeMove { x: 120.0, y: 500.0 }).unwrap();
        layer.dispatch(&mut store, id, OverlayEvent::ResizeEnd).unwrap();

        assert_eq!(store.get(id).unwrap().rect, ScreenRect::new(120.0, 100.0, 80.0, 30.0));
    }

    #[test]
    fn test_drag_move_without_start_is_ignored() {
        let (mut store, id) = store_with(AnnotationKind::SignatureField);
        let mut layer = OverlayLayer::new();
        layer.sync(&store);
        let outcome = layer
            .dispatch(&mut store, id, OverlayEvent::DragMove { x: 1.0, y: 1.0 })
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert_eq!(
            layer.dispatch(&mut store, id, OverlayEvent::DragEnd).unwrap(),
            Outcome::Ignored
        );
    }

    #[test]
    fn test_navigate_abandons_drags_and_commits_drafts() {
        let mut store = AnnotationStore::new();
        let text = store.create(
            AnnotationKind::TextField,
            1,
            ScreenRect::new(0.0, 0.0, 100.0, 30.0),
        );
        let selection = store.create(
            AnnotationKind::SelectionField,
            1,
            ScreenRect::new(0.0, 50.0, 150.0, 30.0),
        );
        let mut layer = OverlayLayer::new();
        layer.sync(&store);

        layer.dispatch(&mut store, text, OverlayEvent::DoubleClick).unwrap();
        layer.dispatch(&mut store, text, OverlayEvent::Input("Pending".to_string())).unwrap();
        layer
            .dispatch(&mut store, selection, OverlayEvent::DragStart { x: 10.0, y: 60.0 })
            .unwrap();
        layer
            .dispatch(&mut store, selection, OverlayEvent::DragMove { x: 300.0, y: 300.0 })
            .unwrap();

        layer.navigate(&mut store);

        match &store.get(text).unwrap().field {
            crate::annotation::Field::TextField { value, .. } => assert_eq!(value, "Pending"),
            other => panic!("unexpected field {:?}", other),
        }
        assert_eq!(store.get(selection).unwrap().rect, ScreenRect::new(0.0, 50.0, 150.0, 30.0));
        assert_eq!(layer.get(text).unwrap().state(), ControllerState::Idle);
        assert_eq!(layer.get(selection).unwrap().state(), ControllerState::Idle);
    }

    #[test]
    fn test_sync_follows_undo() {
        let mut store = AnnotationStore::new();
        let mut layer = OverlayLayer::new();
        let id = store.create(AnnotationKind::TextField, 1, ScreenRect::new(0.0, 0.0, 100.0, 30.0));
        layer.sync(&store);
        assert_eq!(layer.len(), 1);

        store.undo();
        layer.sync(&store);
        assert!(layer.get(id).is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_dispatch_unknown_id_is_error() {
        let mut store = AnnotationStore::new();
        let mut layer = OverlayLayer::new();
        let missing = AnnotationId::new();
        let result = layer.dispatch(&mut store, missing, OverlayEvent::DoubleClick);
        assert_eq!(result, Err(ControllerError::Store(StoreError::NotFound(missing))));
    }

    #[test]
    fn test_delete_removes_controller() {
        let (mut store, id) = store_with(AnnotationKind::SelectionField);
        let mut layer = OverlayLayer::new();
        layer.sync(&store);

        assert_eq!(layer.dispatch(&mut store, id, OverlayEvent::Delete).unwrap(), Outcome::Removed);
        assert!(store.get(id).is_none());
        assert!(layer.get(id).is_none());
    }
}
