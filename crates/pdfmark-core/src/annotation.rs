//! Annotation records placed on top of rendered pages
//!
//! An annotation is a tagged union: each kind carries only the fields that
//! make sense for it, so the burn step can match exhaustively.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coords::ScreenRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    TextField,
    SignatureField,
    SelectionField,
}

impl AnnotationKind {
    /// Default dimensions in screen pixels (width, height)
    pub fn default_size(&self) -> (f64, f64) {
        match self {
            AnnotationKind::TextField => (100.0, 30.0),
            AnnotationKind::SignatureField => (200.0, 100.0),
            AnnotationKind::SelectionField => (150.0, 30.0),
        }
    }

    /// Name used in the JSON summary sent with a save
    pub fn summary_name(&self) -> &'static str {
        match self {
            AnnotationKind::TextField => "text",
            AnnotationKind::SignatureField => "signature",
            AnnotationKind::SelectionField => "selection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionAction {
    EditRequested,
    RemoveRequested,
    ElaborateRequested,
}

impl SelectionAction {
    pub const ALL: [SelectionAction; 3] = [
        SelectionAction::EditRequested,
        SelectionAction::RemoveRequested,
        SelectionAction::ElaborateRequested,
    ];

    /// Short lowercase name ("edit", "remove", "elaborate")
    pub fn name(&self) -> &'static str {
        match self {
            SelectionAction::EditRequested => "edit",
            SelectionAction::RemoveRequested => "remove",
            SelectionAction::ElaborateRequested => "elaborate",
        }
    }

    /// Label burned next to the highlight
    pub fn label(&self) -> &'static str {
        match self {
            SelectionAction::EditRequested => "EDIT",
            SelectionAction::RemoveRequested => "REMOVE",
            SelectionAction::ElaborateRequested => "ELABORATE",
        }
    }

    /// Fill colour, RGB in 0-1 range
    pub fn color(&self) -> (f32, f32, f32) {
        match self {
            SelectionAction::EditRequested => (1.0, 1.0, 0.0),
            SelectionAction::RemoveRequested => (1.0, 0.0, 0.0),
            SelectionAction::ElaborateRequested => (0.68, 0.85, 0.9),
        }
    }
}

/// Colour of an untagged selection highlight
pub const UNTAGGED_SELECTION_COLOR: (f32, f32, f32) = (0.5, 0.5, 0.5);

/// Colour a selection field is drawn with, tagged or not
pub fn selection_color(action: Option<SelectionAction>) -> (f32, f32, f32) {
    action
        .map(|a| a.color())
        .unwrap_or(UNTAGGED_SELECTION_COLOR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Font size in screen pixels; divided by the render scale when burned
    pub font_size: f64,
    pub font_family: String,
    pub color: String,
    pub text_align: TextAlign,
    pub is_bold: bool,
    pub is_italic: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            font_family: "Helvetica".to_string(),
            color: "#000000".to_string(),
            text_align: TextAlign::Left,
            is_bold: false,
            is_italic: false,
        }
    }
}

impl TextStyle {
    /// Map the CSS-ish font family onto one of the PDF standard 14 fonts,
    /// honoring the bold/italic flags.
    pub fn pdf_font_name(&self) -> &'static str {
        match (base_family(&self.font_family), self.is_bold, self.is_italic) {
            (StandardFamily::Times, true, true) => "Times-BoldItalic",
            (StandardFamily::Times, true, false) => "Times-Bold",
            (StandardFamily::Times, false, true) => "Times-Italic",
            (StandardFamily::Times, false, false) => "Times-Roman",
            (StandardFamily::Courier, true, true) => "Courier-BoldOblique",
            (StandardFamily::Courier, true, false) => "Courier-Bold",
            (StandardFamily::Courier, false, true) => "Courier-Oblique",
            (StandardFamily::Courier, false, false) => "Courier",
            (StandardFamily::Helvetica, true, true) => "Helvetica-BoldOblique",
            (StandardFamily::Helvetica, true, false) => "Helvetica-Bold",
            (StandardFamily::Helvetica, false, true) => "Helvetica-Oblique",
            (StandardFamily::Helvetica, false, false) => "Helvetica",
        }
    }

    /// Fill colour as RGB in 0-1 range; malformed values fall back to black
    pub fn rgb(&self) -> (f32, f32, f32) {
        parse_hex_color(&self.color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardFamily {
    Helvetica,
    Times,
    Courier,
}

fn base_family(name: &str) -> StandardFamily {
    let lower = name.to_lowercase();

    match lower.as_str() {
        "serif" => return StandardFamily::Times,
        "monospace" => return StandardFamily::Courier,
        "sans-serif" | "cursive" | "fantasy" => return StandardFamily::Helvetica,
        _ => {}
    }

    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        return StandardFamily::Times;
    }

    if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        return StandardFamily::Courier;
    }

    StandardFamily::Helvetica
}

/// Parse hex color string (e.g., "#FF0000" or "FF0000") to RGB floats (0-1 range)
pub fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim().trim_start_matches('#');
    let Some(digits) = hex
        .get(0..6)
        .filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()))
    else {
        return (0.0, 0.0, 0.0);
    };
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).unwrap_or(0) as f32 / 255.0
    };
    (channel(0..2), channel(2..4), channel(4..6))
}

/// Kind-specific payload of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Field {
    TextField {
        value: String,
        style: TextStyle,
    },
    SignatureField {
        /// `data:` URL of the captured image, set when the capture is finalized
        image: Option<String>,
        finalized: bool,
    },
    SelectionField {
        action: Option<SelectionAction>,
    },
}

impl Field {
    pub fn empty(kind: AnnotationKind) -> Self {
        match kind {
            AnnotationKind::TextField => Field::TextField {
                value: String::new(),
                style: TextStyle::default(),
            },
            AnnotationKind::SignatureField => Field::SignatureField {
                image: None,
                finalized: false,
            },
            AnnotationKind::SelectionField => Field::SelectionField { action: None },
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Field::TextField { .. } => AnnotationKind::TextField,
            Field::SignatureField { .. } => AnnotationKind::SignatureField,
            Field::SelectionField { .. } => AnnotationKind::SelectionField,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// 1-indexed page the annotation sits on
    pub page_number: u32,
    pub rect: ScreenRect,
    pub field: Field,
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        self.field.kind()
    }

    /// Whether burning this annotation would draw anything
    pub fn has_content(&self) -> bool {
        match &self.field {
            Field::TextField { value, .. } => !value.is_empty(),
            Field::SignatureField { image, finalized } => *finalized && image.is_some(),
            Field::SelectionField { action } => action.is_some(),
        }
    }
}
