//! Transient signature capture
//!
//! Raw strokes and uploaded bytes live here, outside the annotation store,
//! until the user confirms. Finalizing turns the capture into a `data:` URL
//! that is written to the store once.

use image::{Rgba, RgbaImage};

use crate::embed::{self, ImageFormat};
use crate::error::{CaptureError, ImageDecodeError};

/// Pen radius in pixels used when rasterizing strokes
const PEN_RADIUS: f64 = 1.5;
const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Draw,
    Upload,
}

/// One continuous pen stroke in field-local pixels
pub type Stroke = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
struct UploadedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureCapture {
    mode: CaptureMode,
    strokes: Vec<Stroke>,
    active_stroke: Option<Stroke>,
    upload: Option<UploadedImage>,
    finalized: bool,
}

impl SignatureCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn has_upload(&self) -> bool {
        self.upload.is_some()
    }

    /// Switch between drawing and uploading. Previous input of the other mode is kept.
    pub fn set_mode(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        self.ensure_open()?;
        self.mode = mode;
        self.active_stroke = None;
        Ok(())
    }

    pub fn begin_stroke(&mut self, x: f64, y: f64) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if self.mode != CaptureMode::Draw || !x.is_finite() || !y.is_finite() {
            return Ok(());
        }
        self.active_stroke = Some(vec![(x, y)]);
        Ok(())
    }

    pub fn extend_stroke(&mut self, x: f64, y: f64) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if let Some(stroke) = self.active_stroke.as_mut() {
            if x.is_finite() && y.is_finite() {
                stroke.push((x, y));
            }
        }
        Ok(())
    }

    pub fn end_stroke(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if let Some(stroke) = self.active_stroke.take() {
            self.strokes.push(stroke);
        }
        Ok(())
    }

    /// Store uploaded bytes after checking they are PNG or JPEG.
    pub fn load_upload(&mut self, bytes: Vec<u8>) -> Result<(), CaptureError> {
        self.ensure_open()?;
        embed::prepare(&bytes)?;
        let format = embed::sniff(&bytes).ok_or(ImageDecodeError::UnsupportedFormat)?;
        self.upload = Some(UploadedImage { bytes, format });
        Ok(())
    }

    /// Drop everything captured in the current mode.
    pub fn clear(&mut self) -> Result<(), CaptureError> {
        self.ensure_open()?;
        match self.mode {
            CaptureMode::Draw => {
                self.strokes.clear();
                self.active_stroke = None;
            }
            CaptureMode::Upload => self.upload = None,
        }
        Ok(())
    }

    /// Whether `finalize` would succeed in the current mode
    pub fn is_ready(&self) -> bool {
        !self.finalized
            && match self.mode {
                CaptureMode::Draw => !self.strokes.is_empty() || self.active_stroke.is_some(),
                CaptureMode::Upload => self.upload.is_some(),
            }
    }

    /// Freeze the capture and produce the image `data:` URL.
    ///
    /// `width`/`height` is the field size in screen pixels; drawn strokes are
    /// rasterized onto a transparent surface of that size.
    pub fn finalize(&mut self, width: f64, height: f64) -> Result<String, CaptureError> {
        self.ensure_open()?;
        if let Some(stroke) = self.active_stroke.take() {
            self.strokes.push(stroke);
        }
        if !self.is_ready() {
            return Err(CaptureError::Incomplete);
        }

        let data_url = match self.mode {
            CaptureMode::Draw => {
                let surface = rasterize_strokes(&self.strokes, width, height);
                let png =
                    embed::encode_png_rgba(surface.width(), surface.height(), surface.as_raw())
                        .map_err(|e| CaptureError::EncodeError(e.to_string()))?;
                embed::to_data_url(&png, ImageFormat::Png)
            }
            CaptureMode::Upload => {
                let upload = self.upload.as_ref().ok_or(CaptureError::Incomplete)?;
                embed::to_data_url(&upload.bytes, upload.format)
            }
        };

        self.finalized = true;
        self.strokes.clear();
        self.upload = None;
        Ok(data_url)
    }

    fn ensure_open(&self) -> Result<(), CaptureError> {
        if self.finalized {
            Err(CaptureError::Finalized)
        } else {
            Ok(())
        }
    }
}

fn surface_dimension(value: f64) -> u32 {
    if value.is_finite() && value >= 1.0 {
        value.ceil().min(4096.0) as u32
    } else {
        1
    }
}

/// Draw strokes with a round pen onto a transparent surface
pub fn rasterize_strokes(strokes: &[Stroke], width: f64, height: f64) -> RgbaImage {
    let mut surface = RgbaImage::new(surface_dimension(width), surface_dimension(height));

    for stroke in strokes {
        match stroke.as_slice() {
            [] => {}
            [only] => stamp(&mut surface, only.0, only.1),
            points => {
                for pair in points.windows(2) {
                    draw_segment(&mut surface, pair[0], pair[1]);
                }
            }
        }
    }
    surface
}

fn draw_segment(surface: &mut RgbaImage, from: (f64, f64), to: (f64, f64)) {
    let bounds = (
        -PEN_RADIUS,
        -PEN_RADIUS,
        surface.width() as f64 + PEN_RADIUS,
        surface.height() as f64 + PEN_RADIUS,
    );
    let Some((from, to)) = clip_segment(from, to, bounds) else {
        return;
    };
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = (dx.abs().max(dy.abs()) / (PEN_RADIUS * 0.5)).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        stamp(surface, from.0 + dx * t, from.1 + dy * t);
    }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`.
/// Returns `None` when no part of the segment lies inside.
fn clip_segment(
    from: (f64, f64),
    to: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);

    for (p, q) in [
        (-dx, from.0 - min_x),
        (dx, max_x - from.0),
        (-dy, from.1 - min_y),
        (dy, max_y - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((
        (from.0 + dx * t0, from.1 + dy * t0),
        (from.0 + dx * t1, from.1 + dy * t1),
    ))
}

fn stamp(surface: &mut RgbaImage, cx: f64, cy: f64) {
    let (w, h) = (surface.width() as i64, surface.height() as i64);
    let reach = PEN_RADIUS.ceil() as i64;
    let (px, py) = (cx.round() as i64, cy.round() as i64);

    for y in (py - reach)..=(py + reach) {
        for x in (px - reach)..=(px + reach) {
            if x < 0 || y < 0 || x >= w || y >= h {
                continue;
            }
            let (fx, fy) = (x as f64 - cx, y as f64 - cy);
            if fx * fx + fy * fy <= PEN_RADIUS * PEN_RADIUS {
                surface.put_pixel(x as u32, y as u32, INK);
            }
        }
    }
}
