//! Page surfaces for on-screen editing
//!
//! Parses the source PDF, reads each page's native size and rasterizes every
//! page at the session's render scale. A page that fails to rasterize gets a
//! placeholder surface; the rest of the document still renders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::annotation::AnnotationKind;
use crate::coords::{sanitize_scale, ScreenRect};
use crate::error::{DocumentLoadError, PageRenderError};

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Parent chains deeper than this are treated as malformed
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Largest surface edge we are willing to allocate, in pixels
const MAX_SURFACE_EDGE: u32 = 16_384;

/// Native and on-screen geometry of one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    /// Page number (1-indexed)
    pub page_number: u32,
    pub raster_width: u32,
    pub raster_height: u32,
    /// Page width in PDF points
    pub pdf_width: f64,
    /// Page height in PDF points
    pub pdf_height: f64,
    /// Lower-left corner of the MediaBox
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Page {
    fn from_media_box(page_number: u32, media_box: [f64; 4], scale: f64) -> Self {
        let [x, y, width, height] = media_box;
        Self {
            page_number,
            raster_width: raster_edge(width * scale),
            raster_height: raster_edge(height * scale),
            pdf_width: width,
            pdf_height: height,
            origin_x: x,
            origin_y: y,
        }
    }
}

fn raster_edge(value: f64) -> u32 {
    if value.is_finite() && value >= 1.0 {
        (value.round() as u32).min(MAX_SURFACE_EDGE)
    } else {
        1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    Raster(RgbaImage),
    Placeholder(PageRenderError),
}

impl Surface {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Surface::Placeholder(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub page: Page,
    pub surface: Surface,
}

/// Turns one page of a source document into pixels
pub trait PageRasterizer {
    fn rasterize(&self, source: &[u8], page: &Page) -> Result<RgbaImage, String>;
}

/// Paper-white surface at the page's raster size. Used headless and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRasterizer;

impl PageRasterizer for BlankRasterizer {
    fn rasterize(&self, _source: &[u8], page: &Page) -> Result<RgbaImage, String> {
        Ok(RgbaImage::from_pixel(
            page.raster_width,
            page.raster_height,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use image::RgbaImage;
    use pdfium_render::prelude::*;

    use super::{Page, PageRasterizer};

    /// Rasterizes through PDFium, bound from the system library path.
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        pub fn new() -> Result<Self, String> {
            let bindings = Pdfium::bind_to_system_library()
                .map_err(|e| format!("Failed to load pdfium: {:?}", e))?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn rasterize(&self, source: &[u8], page: &Page) -> Result<RgbaImage, String> {
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(source, None)
                .map_err(|e| e.to_string())?;
            let index = u16::try_from(page.page_number - 1).map_err(|e| e.to_string())?;
            let pdf_page = document.pages().get(index).map_err(|e| e.to_string())?;

            let config = PdfRenderConfig::new()
                .set_target_width(page.raster_width as i32)
                .set_target_height(page.raster_height as i32);
            let bitmap = pdf_page
                .render_with_config(&config)
                .map_err(|e| e.to_string())?;

            RgbaImage::from_raw(
                page.raster_width,
                page.raster_height,
                bitmap.as_rgba_bytes().to_vec(),
            )
            .ok_or_else(|| "bitmap size does not match the requested surface".to_string())
        }
    }
}

/// Shared flag flipped when the user navigates away mid-load
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PdfSurfaceRenderer<R = BlankRasterizer> {
    scale: f64,
    rasterizer: R,
}

impl PdfSurfaceRenderer<BlankRasterizer> {
    pub fn blank(scale: f64) -> Self {
        Self::new(scale, BlankRasterizer)
    }
}

impl<R: PageRasterizer> PdfSurfaceRenderer<R> {
    pub fn new(scale: f64, rasterizer: R) -> Self {
        Self {
            scale: sanitize_scale(scale),
            rasterizer,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Parse and rasterize every page, in page order
    pub fn load(&self, bytes: &[u8]) -> Result<Vec<RenderedPage>, DocumentLoadError> {
        self.load_cancellable(bytes, &CancelToken::new())
    }

    /// Like [`load`](Self::load), but stops committing pages once `cancel` fires.
    pub fn load_cancellable(
        &self,
        bytes: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<RenderedPage>, DocumentLoadError> {
        let pages = read_pages(bytes, self.scale)?;
        let mut rendered = Vec::with_capacity(pages.len());

        for page in pages {
            let surface = match self.rasterizer.rasterize(bytes, &page) {
                Ok(image) => Surface::Raster(image),
                Err(reason) => {
                    let error = PageRenderError {
                        page_number: page.page_number,
                        reason,
                    };
                    tracing::warn!(
                        page = page.page_number,
                        error = %error,
                        "page render failed, using placeholder"
                    );
                    Surface::Placeholder(error)
                }
            };

            if cancel.is_cancelled() {
                tracing::debug!(page = page.page_number, "load cancelled before page commit");
                return Err(DocumentLoadError::Cancelled);
            }
            rendered.push(RenderedPage { page, surface });
        }

        tracing::info!(pages = rendered.len(), scale = self.scale, "document rendered");
        Ok(rendered)
    }
}

/// Read page geometry without rasterizing
pub fn read_pages(bytes: &[u8], scale: f64) -> Result<Vec<Page>, DocumentLoadError> {
    let doc = Document::load_mem(bytes).map_err(|e| DocumentLoadError::ParseError(e.to_string()))?;
    let scale = sanitize_scale(scale);

    let pages: Vec<Page> = doc
        .get_pages()
        .into_iter()
        .map(|(page_number, page_id)| {
            Page::from_media_box(page_number, page_media_box(&doc, page_id), scale)
        })
        .collect();

    if pages.is_empty() {
        return Err(DocumentLoadError::NoPages);
    }
    Ok(pages)
}

/// MediaBox of a page as `[x, y, width, height]`, following inherited values
/// up the page tree and falling back to US Letter.
pub(crate) fn page_media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;

    while let Some(dict) = current {
        if let Ok(media_box) = dict.get(b"MediaBox") {
            if let Some(rect) = parse_rect(doc, media_box) {
                return rect;
            }
        }
        depth += 1;
        if depth > MAX_INHERITANCE_DEPTH {
            break;
        }
        current = parent_of(doc, dict);
    }

    DEFAULT_MEDIA_BOX
}

fn parent_of<'a>(doc: &'a Document, dict: &Dictionary) -> Option<&'a Dictionary> {
    let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    doc.get_dictionary(parent_id).ok()
}

/// Parse a PDF rectangle array into [x, y, width, height]
fn parse_rect(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let arr = match obj {
        Object::Array(a) => a,
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        _ => return None,
    };
    if arr.len() != 4 {
        return None;
    }

    let mut values = [0.0f64; 4];
    for (i, item) in arr.iter().enumerate() {
        values[i] = extract_number(doc, item)?;
    }

    let (x0, x1) = (values[0].min(values[2]), values[0].max(values[2]));
    let (y0, y1) = (values[1].min(values[3]), values[1].max(values[3]));
    if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
        return None;
    }
    Some([x0, y0, x1 - x0, y1 - y0])
}

fn extract_number(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        },
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Page under a scroll offset.
///
/// Pages are stacked vertically with `gap` pixels between them. Returns the
/// first page whose accumulated extent (height plus gap) passes `offset`; an
/// offset past the end yields the last page.
pub fn page_at_offset(page_heights: &[f64], gap: f64, offset: f64) -> Option<u32> {
    if page_heights.is_empty() {
        return None;
    }
    let mut cumulative = 0.0;
    for (index, height) in page_heights.iter().enumerate() {
        cumulative += height + gap;
        if cumulative > offset {
            return Some(index as u32 + 1);
        }
    }
    Some(page_heights.len() as u32)
}

/// Where a freshly created field goes: centred in the viewport, on the page
/// under the viewport's centre, clamped inside that page.
pub fn default_placement(
    pages: &[Page],
    gap: f64,
    scroll_offset: f64,
    viewport_height: f64,
    kind: AnnotationKind,
) -> Option<(u32, ScreenRect)> {
    let heights: Vec<f64> = pages.iter().map(|p| p.raster_height as f64).collect();
    let scroll_offset = if scroll_offset.is_finite() { scroll_offset.max(0.0) } else { 0.0 };
    let viewport_height = if viewport_height.is_finite() { viewport_height.max(0.0) } else { 0.0 };
    let centre = scroll_offset + viewport_height / 2.0;

    let page_number = page_at_offset(&heights, gap, centre)?;
    let index = (page_number - 1) as usize;
    let page = pages.get(index)?;
    let page_top: f64 = heights[..index].iter().map(|h| h + gap).sum();

    let (width, height) = kind.default_size();
    let max_x = (page.raster_width as f64 - width).max(0.0);
    let max_y = (page.raster_height as f64 - height).max(0.0);
    let x = (page.raster_width as f64 / 2.0 - width / 2.0).clamp(0.0, max_x);
    let y = (centre - page_top - height / 2.0).clamp(0.0, max_y);

    Some((page_number, ScreenRect::new(x, y, width, height)))
}

#[cfg(test)]
pub(crate) mod test_pdfs {
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF whose pages have the given MediaBox sizes and a line of text each
    pub fn with_pages(sizes: &[(i64, i64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::new();
        for (index, (width, height)) in sizes.iter().enumerate() {
            let text = format!("BT /F1 12 Tf 72 720 Td (Original page {}) Tj ET", index + 1);
            let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (*width).into(), (*height).into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    pub fn letter() -> Vec<u8> {
        with_pages(&[(612, 792)])
    }
}
