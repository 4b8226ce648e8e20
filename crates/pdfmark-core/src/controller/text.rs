use super::{ControllerState, Frame, GestureKind, OverlayEvent, Outcome};
use crate::annotation::{AnnotationId, AnnotationKind, Field};
use crate::error::{ControllerError, StoreError};
use crate::store::{AnnotationPatch, AnnotationStore};

/// Free-text field. Editing works on a draft; the store sees the value
/// only when the draft is committed.
#[derive(Debug, Clone)]
pub struct TextFieldController {
    pub(super) frame: Frame,
    draft: Option<String>,
}

impl TextFieldController {
    pub fn new(id: AnnotationId) -> Self {
        Self {
            frame: Frame::new(id),
            draft: None,
        }
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub(super) fn handle(
        &mut self,
        store: &mut AnnotationStore,
        event: OverlayEvent,
    ) -> Result<Outcome, ControllerError> {
        if let Some(result) = self.frame.handle_shared(store, &event) {
            if matches!(event, OverlayEvent::Delete) {
                self.draft = None;
            }
            return result;
        }

        match event {
            OverlayEvent::DoubleClick if self.frame.state == ControllerState::Idle => {
                let value = self.stored_value(store)?;
                self.draft = Some(value);
                self.frame.state = ControllerState::Editing;
                Ok(Outcome::Updated)
            }
            OverlayEvent::Input(value) if self.draft.is_some() => {
                self.draft = Some(value);
                Ok(Outcome::Updated)
            }
            OverlayEvent::Enter | OverlayEvent::Confirm if self.draft.is_some() => {
                self.commit(store)
            }
            OverlayEvent::Blur => {
                if self.draft.is_some() {
                    self.commit(store)
                } else {
                    Ok(self.frame.abandon())
                }
            }
            OverlayEvent::Escape => {
                if self.draft.take().is_some() {
                    self.frame.state = ControllerState::Idle;
                    Ok(Outcome::Updated)
                } else {
                    Ok(self.frame.abandon())
                }
            }
            OverlayEvent::SetStyle(style) => {
                store.update(self.frame.id, AnnotationPatch {
                    style: Some(style),
                    ..AnnotationPatch::default()
                })?;
                Ok(Outcome::Committed)
            }
            OverlayEvent::DragStart { x, y } => self.start_gesture(store, GestureKind::Drag, x, y),
            OverlayEvent::ResizeStart { handle, x, y } => {
                self.start_gesture(store, GestureKind::Resize(handle), x, y)
            }
            _ => Ok(Outcome::Ignored),
        }
    }

    /// A gesture that starts mid-edit first commits the draft, as a blur would.
    fn start_gesture(
        &mut self,
        store: &mut AnnotationStore,
        kind: GestureKind,
        x: f64,
        y: f64,
    ) -> Result<Outcome, ControllerError> {
        let committed = if self.draft.is_some() {
            self.commit(store)?
        } else {
            Outcome::Ignored
        };
        let started = self.frame.begin(store, kind, x, y)?;
        Ok(committed.max(started))
    }

    fn commit(&mut self, store: &mut AnnotationStore) -> Result<Outcome, ControllerError> {
        let Some(draft) = self.draft.take() else {
            return Ok(Outcome::Ignored);
        };
        self.frame.state = ControllerState::Idle;

        if self.stored_value(store)? == draft {
            return Ok(Outcome::Updated);
        }
        store.update(self.frame.id, AnnotationPatch::text(draft))?;
        Ok(Outcome::Committed)
    }

    fn stored_value(&self, store: &AnnotationStore) -> Result<String, StoreError> {
        match store.get(self.frame.id).map(|a| &a.field) {
            Some(Field::TextField { value, .. }) => Ok(value.clone()),
            Some(other) => Err(StoreError::KindMismatch {
                id: self.frame.id,
                actual: other.kind(),
                requested: AnnotationKind::TextField,
            }),
            None => Err(StoreError::NotFound(self.frame.id)),
        }
    }
}
