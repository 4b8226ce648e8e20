use super::{ControllerState, Frame, GestureKind, OverlayEvent, Outcome};
use crate::annotation::{selection_color, AnnotationId, Field, SelectionAction};
use crate::error::ControllerError;
use crate::store::{AnnotationPatch, AnnotationStore};

/// Highlighted region tagged with a requested action.
///
/// Double-click opens the action menu. Once an action is chosen the field is
/// locked in place; the menu can still be reopened to change the action.
#[derive(Debug, Clone)]
pub struct SelectionFieldController {
    pub(super) frame: Frame,
}

impl SelectionFieldController {
    pub fn new(id: AnnotationId) -> Self {
        Self { frame: Frame::new(id) }
    }

    /// Whether the action menu is showing
    pub fn menu_open(&self) -> bool {
        self.frame.state == ControllerState::Editing
    }

    pub fn action(&self, store: &AnnotationStore) -> Option<SelectionAction> {
        match store.get(self.frame.id).map(|a| &a.field) {
            Some(Field::SelectionField { action }) => *action,
            _ => None,
        }
    }

    /// Current highlight colour, RGB in 0-1 range
    pub fn color(&self, store: &AnnotationStore) -> (f32, f32, f32) {
        selection_color(self.action(store))
    }

    pub fn is_locked(&self, store: &AnnotationStore) -> bool {
        self.action(store).is_some()
    }

    pub(super) fn handle(
        &mut self,
        store: &mut AnnotationStore,
        event: OverlayEvent,
    ) -> Result<Outcome, ControllerError> {
        if let Some(result) = self.frame.handle_shared(store, &event) {
            return result;
        }

        match event {
            OverlayEvent::DoubleClick if self.frame.state == ControllerState::Idle => {
                self.frame.state = ControllerState::Editing;
                Ok(Outcome::Updated)
            }
            OverlayEvent::ChooseAction(action) if self.menu_open() => {
                self.frame.state = ControllerState::Idle;
                if self.action(store) == Some(action) {
                    return Ok(Outcome::Updated);
                }
                store.update(self.frame.id, AnnotationPatch::action(Some(action)))?;
                tracing::debug!(
                    annotation_id = %self.frame.id,
                    action = action.name(),
                    "selection tagged"
                );
                Ok(Outcome::Committed)
            }
            OverlayEvent::Escape | OverlayEvent::Blur => {
                if self.menu_open() {
                    self.frame.state = ControllerState::Idle;
                    Ok(Outcome::Updated)
                } else {
                    Ok(self.frame.abandon())
                }
            }
            OverlayEvent::DragStart { x, y } if !self.is_locked(store) => {
                self.close_menu();
                self.frame.begin(store, GestureKind::Drag, x, y)
            }
            OverlayEvent::ResizeStart { handle, x, y } if !self.is_locked(store) => {
                self.close_menu();
                self.frame.begin(store, GestureKind::Resize(handle), x, y)
            }
            _ => Ok(Outcome::Ignored),
        }
    }

    fn close_menu(&mut self) {
        if self.menu_open() {
            self.frame.state = ControllerState::Idle;
        }
    }
}
