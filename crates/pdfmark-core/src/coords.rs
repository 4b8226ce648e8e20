//! Coordinate transformation between screen space and PDF space
//!
//! Screen space is the rendered page surface: origin top-left, y grows
//! downward, already multiplied by the render scale. PDF space is the page's
//! content-stream space: origin bottom-left, y grows upward, unscaled points.
//!
//! Burned images and text are anchored at their bottom-left corner, so the
//! flip uses the box's own height:
//!
//! ```text
//! pdf_y = page_height - (screen_y + screen_height) / scale
//! ```

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationKind;

/// Fallback page height (US Letter) when the caller passes garbage.
pub const LETTER_HEIGHT: f64 = 792.0;

/// Rectangle in screen pixels, top-left origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in PDF points, bottom-left origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Replace every unusable component with the kind's default.
    ///
    /// Position components fall back to 0, sizes to the kind's default
    /// dimensions. Sizes must also be strictly positive.
    pub fn sanitized(self, kind: AnnotationKind) -> Self {
        let (default_w, default_h) = kind.default_size();
        Self {
            x: finite_or(self.x, 0.0),
            y: finite_or(self.y, 0.0),
            width: positive_or(self.width, default_w),
            height: positive_or(self.height, default_h),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }
}

impl PdfRect {
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

/// Render scales that cannot divide safely collapse to 1.0.
pub fn sanitize_scale(scale: f64) -> f64 {
    positive_or(scale, 1.0)
}

/// Map a screen-space rectangle into PDF space.
///
/// Deterministic and total: non-finite rectangle components are replaced by
/// `kind` defaults before mapping, so the result is always finite.
pub fn to_pdf_space(
    pdf_page_height: f64,
    rect: ScreenRect,
    scale: f64,
    kind: AnnotationKind,
) -> PdfRect {
    let rect = rect.sanitized(kind);
    let scale = sanitize_scale(scale);
    let page_height = finite_or(pdf_page_height, LETTER_HEIGHT);

    PdfRect {
        x: rect.x / scale,
        y: page_height - (rect.y + rect.height) / scale,
        width: rect.width / scale,
        height: rect.height / scale,
    }
}

/// Map a PDF-space rectangle back onto the rendered surface.
pub fn to_screen_space(pdf_page_height: f64, rect: PdfRect, scale: f64) -> ScreenRect {
    let scale = sanitize_scale(scale);
    let page_height = finite_or(pdf_page_height, LETTER_HEIGHT);

    ScreenRect {
        x: rect.x * scale,
        y: (page_height - rect.y - rect.height) * scale,
        width: rect.width * scale,
        height: rect.height * scale,
    }
}
