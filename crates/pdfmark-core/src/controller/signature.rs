use super::{ControllerState, Frame, GestureKind, OverlayEvent, Outcome};
use crate::annotation::{Annotation, AnnotationId, Field};
use crate::capture::SignatureCapture;
use crate::error::ControllerError;
use crate::store::{AnnotationPatch, AnnotationStore};

/// Signature field. Double-click opens the capture pad; confirming a
/// non-empty capture finalizes it and the field becomes read-only apart
/// from moving and resizing.
#[derive(Debug, Clone)]
pub struct SignatureFieldController {
    pub(super) frame: Frame,
    capture: SignatureCapture,
}

impl SignatureFieldController {
    pub fn new(id: AnnotationId) -> Self {
        Self {
            frame: Frame::new(id),
            capture: SignatureCapture::new(),
        }
    }

    pub fn capture(&self) -> &SignatureCapture {
        &self.capture
    }

    /// Reset a frozen capture when the store no longer holds a finalized
    /// image (the finalize was undone).
    pub(super) fn resync(&mut self, annotation: &Annotation) {
        let stored_final = matches!(
            annotation.field,
            Field::SignatureField { finalized: true, .. }
        );
        if self.capture.is_finalized() && !stored_final {
            self.capture = SignatureCapture::new();
        }
    }

    fn is_finalized(&self, store: &AnnotationStore) -> bool {
        self.capture.is_finalized()
            || matches!(
                store.get(self.frame.id).map(|a| &a.field),
                Some(Field::SignatureField { finalized: true, .. })
            )
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
            OverlayEvent::DragStart { x, y } => self.start_gesture(store, GestureKind::Drag, x, y),
            OverlayEvent::ResizeStart { handle, x, y } => {
                self.start_gesture(store, GestureKind::Resize(handle), x, y)
            }
            OverlayEvent::Blur | OverlayEvent::Escape => {
                if self.frame.state == ControllerState::Editing {
                    self.frame.state = ControllerState::Idle;
                    Ok(Outcome::Updated)
                } else {
                    Ok(self.frame.abandon())
                }
            }
            _ if self.is_finalized(store) => Ok(Outcome::Ignored),
            OverlayEvent::DoubleClick if self.frame.state == ControllerState::Idle => {
                self.frame.state = ControllerState::Editing;
                Ok(Outcome::Updated)
            }
            event if self.frame.state == ControllerState::Editing => {
                self.handle_capture(store, event)
            }
            _ => Ok(Outcome::Ignored),
        }
    }

    fn handle_capture(
        &mut self,
        store: &mut AnnotationStore,
        event: OverlayEvent,
    ) -> Result<Outcome, ControllerError> {
        match event {
            OverlayEvent::SetCaptureMode(mode) => self.capture.set_mode(mode)?,
            OverlayEvent::StrokeStart { x, y } => self.capture.begin_stroke(x, y)?,
            OverlayEvent::StrokeMove { x, y } => self.capture.extend_stroke(x, y)?,
            OverlayEvent::StrokeEnd => self.capture.end_stroke()?,
            OverlayEvent::Upload(bytes) => self.capture.load_upload(bytes)?,
            OverlayEvent::ClearCapture => self.capture.clear()?,
            OverlayEvent::Confirm | OverlayEvent::Enter => return self.confirm(store),
            _ => return Ok(Outcome::Ignored),
        }
        Ok(Outcome::Updated)
    }

    fn confirm(&mut self, store: &mut AnnotationStore) -> Result<Outcome, ControllerError> {
        let rect = self.frame.stored_rect(store)?;
        let data_url = self.capture.finalize(rect.width, rect.height)?;
        store.update(self.frame.id, AnnotationPatch::signature_image(data_url))?;
        self.frame.state = ControllerState::Idle;
        tracing::debug!(annotation_id = %self.frame.id, "signature finalized");
        Ok(Outcome::Committed)
    }

    /// Moving closes the capture pad; captured input is kept for later.
    fn start_gesture(
        &mut self,
        store: &AnnotationStore,
        kind: GestureKind,
        x: f64,
        y: f64,
    ) -> Result<Outcome, ControllerError> {
        if self.frame.is_gesturing() {
            return Ok(Outcome::Ignored);
        }
        self.frame.begin(store, kind, x, y)
    }
}
