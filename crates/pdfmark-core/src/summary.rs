//! JSON summary of the annotations sent alongside a saved PDF

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, Field};
use crate::error::SaveError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPosition {
    pub x: f64,
    pub y: f64,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    /// "text", "signature" or "selection"
    #[serde(rename = "type")]
    pub kind: String,
    /// Screen-space position of the field's top-left corner
    pub position: SummaryPosition,
    pub value: Option<String>,
}

pub fn summarize(annotations: &[Annotation]) -> Vec<SummaryEntry> {
    annotations.iter().map(entry_for).collect()
}

pub fn summary_json(annotations: &[Annotation]) -> Result<String, SaveError> {
    serde_json::to_string(&summarize(annotations))
        .map_err(|e| SaveError::SerializationError(e.to_string()))
}

fn entry_for(annotation: &Annotation) -> SummaryEntry {
    let value = match &annotation.field {
        Field::TextField { value, .. } if !value.is_empty() => Some(value.clone()),
        Field::TextField { .. } => None,
        Field::SignatureField {
            image,
            finalized: true,
        } => image.clone(),
        Field::SignatureField { .. } => None,
        Field::SelectionField { action } => action.map(|a| a.name().to_string()),
    };

    SummaryEntry {
        kind: annotation.kind().summary_name().to_string(),
        position: SummaryPosition {
            x: annotation.rect.x,
            y: annotation.rect.y,
            page: annotation.page_number,
        },
        value,
    }
}
