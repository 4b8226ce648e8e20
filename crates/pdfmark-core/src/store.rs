//! Annotation store
//!
//! Insertion-ordered, id-keyed collection of annotations. Every mutation
//! publishes a new immutable [`Snapshot`]; readers holding an older snapshot
//! (a save in flight, an undo entry) are never affected by later writes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, Field, SelectionAction, TextStyle,
};
use crate::coords::ScreenRect;
use crate::error::StoreError;

/// Immutable view of the store at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(Arc<[Annotation]>);

impl Default for Snapshot {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl Snapshot {
    pub fn annotations(&self) -> &[Annotation] {
        &self.0
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.0.iter().find(|a| a.id == id)
    }

    pub fn by_page(&self, page_number: u32) -> Vec<&Annotation> {
        self.0
            .iter()
            .filter(|a| a.page_number == page_number)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Annotation>> for Snapshot {
    fn from(annotations: Vec<Annotation>) -> Self {
        Self(annotations.into())
    }
}

/// Partial update applied by [`AnnotationStore::update`].
///
/// Geometry fields apply to every kind; the rest only to the kind they name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPatch {
    pub page_number: Option<u32>,
    pub rect: Option<ScreenRect>,
    pub text: Option<String>,
    pub style: Option<TextStyle>,
    /// Finalized signature image as a `data:` URL
    pub signature_image: Option<String>,
    pub action: Option<Option<SelectionAction>>,
}

impl AnnotationPatch {
    pub fn rect(rect: ScreenRect) -> Self {
        Self {
            rect: Some(rect),
            ..Self::default()
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            text: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn signature_image(data_url: impl Into<String>) -> Self {
        Self {
            signature_image: Some(data_url.into()),
            ..Self::default()
        }
    }

    pub fn action(action: Option<SelectionAction>) -> Self {
        Self {
            action: Some(action),
            ..Self::default()
        }
    }

    /// Kind the patch's kind-specific fields belong to, if any
    fn target_kind(&self) -> Option<AnnotationKind> {
        if self.text.is_some() || self.style.is_some() {
            Some(AnnotationKind::TextField)
        } else if self.signature_image.is_some() {
            Some(AnnotationKind::SignatureField)
        } else if self.action.is_some() {
            Some(AnnotationKind::SelectionField)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreJson {
    annotations: Vec<Annotation>,
}

/// Ordered annotation collection with replace-on-write snapshots and undo/redo.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    current: Snapshot,
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new annotation of `kind`, sanitising the rectangle for that kind.
    pub fn create(
        &mut self,
        kind: AnnotationKind,
        page_number: u32,
        rect: ScreenRect,
    ) -> AnnotationId {
        let id = AnnotationId::new();
        if page_number == 0 {
            tracing::warn!(annotation_id = %id, "page 0 requested, placing on page 1");
        }
        let annotation = Annotation {
            id,
            page_number: page_number.max(1),
            rect: rect.sanitized(kind),
            field: Field::empty(kind),
        };

        let mut next = self.current.annotations().to_vec();
        next.push(annotation);
        self.publish(next);
        tracing::debug!(annotation_id = %id, ?kind, page = page_number, "annotation created");
        id
    }

    /// Apply `patch` to the annotation with `id`.
    ///
    /// Leaves the store untouched and reports the problem when the id is
    /// unknown or the patch does not fit the annotation's kind.
    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> Result<(), StoreError> {
        let Some(index) = self.current.annotations().iter().position(|a| a.id == id) else {
            tracing::warn!(annotation_id = %id, "update for unknown annotation ignored");
            return Err(StoreError::NotFound(id));
        };

        let mut updated = self.current.annotations()[index].clone();
        apply_patch(&mut updated, patch)?;

        let mut next = self.current.annotations().to_vec();
        next[index] = updated;
        self.publish(next);
        Ok(())
    }

    pub fn remove(&mut self, id: AnnotationId) -> Result<(), StoreError> {
        if self.current.get(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        let next: Vec<Annotation> = self
            .current
            .annotations()
            .iter()
            .filter(|a| a.id != id)
            .cloned()
            .collect();
        self.publish(next);
        tracing::debug!(annotation_id = %id, "annotation removed");
        Ok(())
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.current.get(id)
    }

    pub fn by_page(&self, page_number: u32) -> Vec<&Annotation> {
        self.current.by_page(page_number)
    }

    pub fn all(&self) -> &[Annotation] {
        self.current.annotations()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.current.clone()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Step back to the previous snapshot. Returns false when there is none.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                let current = std::mem::replace(&mut self.current, previous);
                self.redo_stack.push(current);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(next) => {
                let current = std::mem::replace(&mut self.current, next);
                self.undo_stack.push(current);
                true
            }
            None => false,
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        let json = StoreJson {
            annotations: self.current.annotations().to_vec(),
        };
        serde_json::to_string(&json).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    /// Restore a store from [`AnnotationStore::to_json`] output. Rectangles are re-sanitised.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let parsed: StoreJson =
            serde_json::from_str(json).map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        let mut annotations = Vec::with_capacity(parsed.annotations.len());
        for mut annotation in parsed.annotations {
            if !seen.insert(annotation.id) {
                return Err(StoreError::SerializationError(format!(
                    "duplicate annotation id {}",
                    annotation.id
                )));
            }
            annotation.rect = annotation.rect.sanitized(annotation.kind());
            annotation.page_number = annotation.page_number.max(1);
            annotations.push(annotation);
        }

        Ok(Self {
            current: annotations.into(),
            ..Self::default()
        })
    }

    fn publish(&mut self, next: Vec<Annotation>) {
        let previous = std::mem::replace(&mut self.current, next.into());
        self.undo_stack.push(previous);
        self.redo_stack.clear();
    }
}

fn apply_patch(annotation: &mut Annotation, patch: AnnotationPatch) -> Result<(), StoreError> {
    let id = annotation.id;
    let kind = annotation.kind();

    if let Some(requested) = patch.target_kind() {
        if requested != kind {
            return Err(StoreError::KindMismatch {
                id,
                actual: kind,
                requested,
            });
        }
    }

    if let Some(page_number) = patch.page_number {
        annotation.page_number = page_number.max(1);
    }
    if let Some(rect) = patch.rect {
        annotation.rect = rect.sanitized(kind);
    }

    match &mut annotation.field {
        Field::TextField { value, style } => {
            if let Some(text) = patch.text {
                *value = text;
            }
            if let Some(new_style) = patch.style {
                *style = new_style;
            }
        }
        Field::SignatureField { image, finalized } => {
            if let Some(data_url) = patch.signature_image {
                if *finalized {
                    return Err(StoreError::SignatureFinalized(id));
                }
                *image = Some(data_url);
                *finalized = true;
            }
        }
        Field::SelectionField { action } => {
            if let Some(new_action) = patch.action {
                *action = new_action;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rect() -> ScreenRect {
        ScreenRect::new(10.0, 20.0, 100.0, 30.0)
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = AnnotationStore::new();
        assert!(store.is_empty());
        assert_eq!(store.all().len(), 0);
    }

    #[test]
    fn test_create_preserves_insertion_order() {
        let mut store = AnnotationStore::new();
        let a = store.create(AnnotationKind::TextField, 1, rect());
        let b = store.create(AnnotationKind::SignatureField, 2, rect());
        let c = store.create(AnnotationKind::SelectionField, 1, rect());
        let ids: Vec<_> = store.all().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn test_create_sanitizes_rect() {
        let mut store = AnnotationStore::new();
        let id = store.create(
            AnnotationKind::SignatureField,
            1,
            ScreenRect::new(f64::NAN, 5.0, -3.0, f64::INFINITY),
        );
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.rect, ScreenRect::new(0.0, 5.0, 200.0, 100.0));
    }

    #[test]
    fn test_create_on_page_zero_lands_on_page_one() {
        let mut store = AnnotationStore::new();
        let id = store.create(AnnotationKind::TextField, 0, rect());
        assert_eq!(store.get(id).unwrap().page_number, 1);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut store = AnnotationStore::new();
        store.create(AnnotationKind::TextField, 1, rect());
        let before = store.snapshot();
        let missing = AnnotationId::new();
        let result = store.update(missing, AnnotationPatch::text("x"));
        assert_eq!(result, Err(StoreError::NotFound(missing)));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_update_text_value() {
        let mut store = AnnotationStore::new();
        let id = store.create(AnnotationKind::TextField, 1, rect());
        store.update(id, AnnotationPatch::text("Hello")).unwrap();
        match &store.get(id).unwrap().field {
            Field::TextField { value, .. } => assert_eq!(value, "Hello"),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_update_kind_mismatch_rejected() {
        let mut store = AnnotationStore::new();
        let id = store.create(AnnotationKind::SelectionField, 1, rect());
        let result = store.update(id, AnnotationPatch::text("nope"));
        assert!(matches!(result, Err(StoreError::KindMismatch { .. })));
    }

    #[test]
    fn test_signature_image_finalizes_once() {
        let mut store = AnnotationStore::new();
        let id = store.create(AnnotationKind::SignatureField, 1, rect());
        store
            .update(id, AnnotationPatch::signature_image("data:image/png;base64,AA"))
            .unwrap();
        assert_eq!(
            store.get(id).unwrap().field,
            Field::SignatureField {
                image: Some("data:image/png;base64,AA".to_string()),
                finalized: true,
            }
        );
        let again = store.update(id, AnnotationPatch::signature_image("data:image/png;base64,BB"));
        assert_eq!(again, Err(StoreError::SignatureFinalized(id)));
    }

    #[test]
    fn test_old_snapshot_unaffected_by_writes() {
        let mut store = AnnotationStore::new();
        let id = store.create(AnnotationKind::TextField, 1, rect());
        let snapshot = store.snapshot();
        store.update(id, AnnotationPatch::rect(ScreenRect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
        store.remove(id).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(id).unwrap().rect, rect());
        assert!(store.is_empty());
    }

    #[test]
    fn test_by_page() {
        let mut store = AnnotationStore::new();
        store.create(AnnotationKind::TextField, 1, rect());
        store.create(AnnotationKind::TextField, 2, rect());
        store.create(AnnotationKind::SelectionField, 1, rect());
        assert_eq!(store.by_page(1).len(), 2);
        assert_eq!(store.by_page(2).len(), 1);
        assert_eq!(store.by_page(3).len(), 0);
    }

    #[test]
    fn test_remove_unknown_reports_not_found() {
        let mut store = AnnotationStore::new();
        let id = AnnotationId::new();
        assert_eq!(store.remove(id), Err(StoreError::NotFound(id)));
    }

    #[test]
    fn test_undo_redo() {
        let mut store = AnnotationStore::new();
        let id = store.create(AnnotationKind::TextField, 1, rect());
        store.update(id, AnnotationPatch::text("one")).unwrap();
        assert!(store.undo());
        match &store.get(id).unwrap().field {
            Field::TextField { value, .. } => assert_eq!(value, ""),
            other => panic!("unexpected field {:?}", other),
        }
        assert!(store.undo());
        assert!(store.is_empty());
        assert!(!store.undo());
        assert!(store.redo());
        assert!(store.redo());
        assert!(!store.redo());
        match &store.get(id).unwrap().field {
            Field::TextField { value, .. } => assert_eq!(value, "one"),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_write_after_undo_clears_redo() {
        let mut store = AnnotationStore::new();
        store.create(AnnotationKind::TextField, 1, rect());
        store.undo();
        store.create(AnnotationKind::SelectionField, 1, rect());
        assert!(!store.can_redo());
    }

    #[test]
    fn test_json_roundtrip_preserves_order() {
        let mut store = AnnotationStore::new();
        let a = store.create(AnnotationKind::TextField, 1, rect());
        let b = store.create(AnnotationKind::SelectionField, 3, rect());
        store
            .update(b, AnnotationPatch::action(Some(SelectionAction::EditRequested)))
            .unwrap();

        let restored = AnnotationStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.all(), store.all());
        assert_eq!(restored.all()[0].id, a);
    }

    #[test]
    fn test_from_json_rejects_duplicate_ids() {
        let mut store = AnnotationStore::new();
        store.create(AnnotationKind::TextField, 1, rect());
        let json = store.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let annotation = value["annotations"][0].clone();
        let duplicated = serde_json::json!({ "annotations": [annotation.clone(), annotation] });
        assert!(AnnotationStore::from_json(&duplicated.to_string()).is_err());
    }
}
