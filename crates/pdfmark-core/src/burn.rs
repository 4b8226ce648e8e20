//! Burn overlay annotations into the PDF
//!
//! Each annotation becomes ordinary page content: text runs in a standard-14
//! font, image XObjects for signatures and translucent filled rectangles with
//! a label for selections. The result is deterministic; burning the same
//! input twice yields identical bytes.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::annotation::{Annotation, AnnotationId, Field, SelectionAction, TextAlign, TextStyle};
use crate::coords::{sanitize_scale, to_pdf_space, PdfRect};
use crate::embed::{self, PreparedImage};
use crate::error::{AnnotationBurnError, BurnError, DocumentLoadError};
use crate::render::page_media_box;

pub const DEFAULT_SELECTION_OPACITY: f32 = 0.35;
pub const DEFAULT_LABEL_FONT_SIZE: f64 = 8.0;
pub const DEFAULT_LABEL_INSET: f64 = 2.0;

const LABEL_FONT: &str = "Helvetica-Bold";
const LABEL_COLOR: (f32, f32, f32) = (0.0, 0.0, 0.0);
/// Baseline-to-baseline distance as a multiple of the font size
const LINE_HEIGHT: f64 = 1.2;
const MAX_RESOURCE_DEPTH: usize = 32;

/// Styling knobs for burned selections
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnOptions {
    pub selection_opacity: f32,
    /// Label size in PDF points, independent of the render scale
    pub label_font_size: f64,
    pub label_inset: f64,
}

impl Default for BurnOptions {
    fn default() -> Self {
        Self {
            selection_opacity: DEFAULT_SELECTION_OPACITY,
            label_font_size: DEFAULT_LABEL_FONT_SIZE,
            label_inset: DEFAULT_LABEL_INSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAnnotation {
    pub id: AnnotationId,
    pub page_number: u32,
    pub error: AnnotationBurnError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurnReport {
    pub pdf: Vec<u8>,
    /// Annotations that drew something
    pub burned: usize,
    pub skipped: Vec<SkippedAnnotation>,
}

/// Burn `annotations` (in store order) into a copy of `original`.
pub fn burn(original: &[u8], annotations: &[Annotation], scale: f64) -> Result<Vec<u8>, BurnError> {
    burn_with_report(original, annotations, scale, &BurnOptions::default()).map(|report| report.pdf)
}

/// Like [`burn`], also reporting which annotations were skipped and why.
pub fn burn_with_report(
    original: &[u8],
    annotations: &[Annotation],
    scale: f64,
    options: &BurnOptions,
) -> Result<BurnReport, BurnError> {
    if !annotations.iter().any(Annotation::has_content) {
        return Ok(BurnReport {
            pdf: original.to_vec(),
            burned: 0,
            skipped: Vec::new(),
        });
    }

    let mut doc =
        Document::load_mem(original).map_err(|e| DocumentLoadError::ParseError(e.to_string()))?;
    let pages = doc.get_pages();
    let scale = sanitize_scale(scale);

    let mut burner = Burner::new(*options);
    let mut burned = 0;
    let mut skipped = Vec::new();

    for (index, annotation) in annotations.iter().enumerate() {
        if !annotation.has_content() {
            continue;
        }
        match burner.burn_annotation(&mut doc, &pages, index, annotation, scale) {
            Ok(()) => burned += 1,
            Err(error) => {
                tracing::warn!(
                    annotation_id = %annotation.id,
                    page = annotation.page_number,
                    error = %error,
                    "annotation skipped during burn"
                );
                skipped.push(SkippedAnnotation {
                    id: annotation.id,
                    page_number: annotation.page_number,
                    error,
                });
            }
        }
    }

    burner.finish(&mut doc)?;

    let mut pdf = Vec::new();
    doc.save_to(&mut pdf)
        .map_err(|e| BurnError::SerializationError(e.to_string()))?;

    tracing::info!(burned, skipped = skipped.len(), bytes = pdf.len(), "annotations burned");
    Ok(BurnReport { pdf, burned, skipped })
}

/// Content and resources added to one page
struct PageLayer {
    page_id: ObjectId,
    resources: Dictionary,
    operations: Vec<Operation>,
}

impl PageLayer {
    /// Name `target` in the `category` resource dictionary, reusing an
    /// existing entry and never shadowing one that points elsewhere.
    fn register(&mut self, category: &str, base: &str, target: ObjectId) -> String {
        let mut entries = match self.resources.get(category.as_bytes()) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        };

        let mut name = base.to_string();
        let mut suffix = 1;
        loop {
            match entries.get(name.as_bytes()) {
                Ok(Object::Reference(id)) if *id == target => break,
                Ok(_) => {
                    suffix += 1;
                    name = format!("{}_{}", base, suffix);
                }
                Err(_) => {
                    entries.set(name.clone(), Object::Reference(target));
                    break;
                }
            }
        }

        self.resources.set(category, Object::Dictionary(entries));
        name
    }
}

struct Burner {
    options: BurnOptions,
    fonts: BTreeMap<&'static str, ObjectId>,
    graphics_states: BTreeMap<u32, ObjectId>,
    layers: BTreeMap<u32, PageLayer>,
}

impl Burner {
    fn new(options: BurnOptions) -> Self {
        Self {
            options,
            fonts: BTreeMap::new(),
            graphics_states: BTreeMap::new(),
            layers: BTreeMap::new(),
        }
    }

    fn burn_annotation(
        &mut self,
        doc: &mut Document,
        pages: &BTreeMap<u32, ObjectId>,
        index: usize,
        annotation: &Annotation,
        scale: f64,
    ) -> Result<(), AnnotationBurnError> {
        let page_number = annotation.page_number;
        let page_id = *pages
            .get(&page_number)
            .ok_or(AnnotationBurnError::PageMissing(page_number))?;

        let [origin_x, origin_y, _, page_height] = page_media_box(doc, page_id);
        let rect = to_pdf_space(page_height, annotation.rect, scale, annotation.kind())
            .translate(origin_x, origin_y);

        match &annotation.field {
            Field::SignatureField {
                image: Some(data_url),
                finalized: true,
            } => {
                let image = embed::prepare(&embed::decode_data_url(data_url)?)?;
                self.draw_image(doc, page_number, page_id, index, &image, rect);
            }
            Field::SelectionField { action: Some(action) } => {
                self.draw_selection(doc, page_number, page_id, *action, rect);
            }
            Field::TextField { value, style } if !value.is_empty() => {
                self.draw_text(doc, page_number, page_id, value, style, rect, scale);
            }
            _ => {}
        }
        Ok(())
    }

    fn layer(&mut self, doc: &Document, page_number: u32, page_id: ObjectId) -> &mut PageLayer {
        self.layers.entry(page_number).or_insert_with(|| PageLayer {
            page_id,
            resources: page_resources(doc, page_id),
            operations: Vec::new(),
        })
    }

    fn font(&mut self, doc: &mut Document, base_font: &'static str) -> ObjectId {
        *self.fonts.entry(base_font).or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base_font,
                "Encoding" => "WinAnsiEncoding",
            })
        })
    }

    fn graphics_state(&mut self, doc: &mut Document, opacity: f32) -> (u32, ObjectId) {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            DEFAULT_SELECTION_OPACITY
        };
        let key = (opacity * 100.0).round() as u32;
        let id = *self.graphics_states.entry(key).or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => Object::Real(opacity),
                "CA" => Object::Real(opacity),
            })
        });
        (key, id)
    }

    fn draw_image(
        &mut self,
        doc: &mut Document,
        page_number: u32,
        page_id: ObjectId,
        index: usize,
        image: &PreparedImage,
        rect: PdfRect,
    ) {
        let xobject_id = add_image_xobject(doc, image);
        let (width, height) =
            embed::fit_within(image.width as f64, image.height as f64, rect.width, rect.height);

        let layer = self.layer(doc, page_number, page_id);
        let name = layer.register("XObject", &format!("PmIm{}", index + 1), xobject_id);
        layer.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(width), real(0.0), real(0.0), real(height), real(rect.x), real(rect.y)],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn draw_selection(
        &mut self,
        doc: &mut Document,
        page_number: u32,
        page_id: ObjectId,
        action: SelectionAction,
        rect: PdfRect,
    ) {
        let options = self.options;
        let (opacity_key, state_id) = self.graphics_state(doc, options.selection_opacity);
        let font_id = self.font(doc, LABEL_FONT);

        let layer = self.layer(doc, page_number, page_id);
        let state_name = layer.register("ExtGState", &format!("PmGs{}", opacity_key), state_id);
        let font_name = layer.register("Font", &resource_font_name(LABEL_FONT), font_id);

        let (r, g, b) = action.color();
        layer.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(state_name.into_bytes())]),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new(
                "re",
                vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
        layer.operations.extend(text_run(
            &font_name,
            options.label_font_size,
            LABEL_COLOR,
            &[(
                rect.x + options.label_inset,
                rect.y + options.label_inset,
                action.label(),
            )],
        ));
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &mut self,
        doc: &mut Document,
        page_number: u32,
        page_id: ObjectId,
        value: &str,
        style: &TextStyle,
        rect: PdfRect,
        scale: f64,
    ) {
        let base_font = style.pdf_font_name();
        let font_id = self.font(doc, base_font);
        let layer = self.layer(doc, page_number, page_id);
        let font_name = layer.register("Font", &resource_font_name(base_font), font_id);

        let size = if style.font_size.is_finite() && style.font_size > 0.0 {
            style.font_size / scale
        } else {
            TextStyle::default().font_size / scale
        };
        let char_width = if base_font.starts_with("Courier") { 0.6 } else { 0.5 };

        let lines: Vec<&str> = value.lines().collect();
        let count = lines.len();
        let placed: Vec<(f64, f64, &str)> = lines
            .into_iter()
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(i, line)| {
                let width = line.chars().count() as f64 * char_width * size;
                let x = match style.text_align {
                    TextAlign::Left => rect.x,
                    TextAlign::Center => rect.x + (rect.width - width) / 2.0,
                    TextAlign::Right => rect.x + rect.width - width,
                };
                // Last line sits on the anchor, earlier lines stack upward
                let y = rect.y + (count - 1 - i) as f64 * size * LINE_HEIGHT;
                (x, y, line)
            })
            .collect();

        layer
            .operations
            .extend(text_run(&font_name, size, style.rgb(), &placed));
    }

    /// Append each touched page's content stream and merged resources
    fn finish(self, doc: &mut Document) -> Result<(), BurnError> {
        for (page_number, layer) in self.layers {
            let content = Content {
                operations: layer.operations,
            }
            .encode()
            .map_err(|e| BurnError::SerializationError(e.to_string()))?;

            // The original content runs inside q/Q so its graphics state cannot leak into ours
            let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            let mut overlay = b"\nQ\n".to_vec();
            overlay.extend_from_slice(&content);
            let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay));

            let mut contents = vec![Object::Reference(save_id)];
            contents.extend(existing_contents(doc, layer.page_id));
            contents.push(Object::Reference(overlay_id));

            let page = doc
                .get_object_mut(layer.page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| {
                    BurnError::SerializationError(format!("page {}: {}", page_number, e))
                })?;
            page.set("Contents", Object::Array(contents));
            page.set("Resources", Object::Dictionary(layer.resources));
        }
        Ok(())
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Resource name for a standard-14 font, e.g. `PmHelveticaBold`
fn resource_font_name(base_font: &str) -> String {
    format!("Pm{}", base_font.replace('-', ""))
}

fn text_run(
    font_name: &str,
    size: f64,
    color: (f32, f32, f32),
    lines: &[(f64, f64, &str)],
) -> Vec<Operation> {
    if lines.is_empty() {
        return Vec::new();
    }
    let (r, g, b) = color;
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font_name.as_bytes().to_vec()), real(size)]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
    ];
    for (x, y, text) in lines {
        ops.push(Operation::new(
            "Tm",
            vec![real(1.0), real(0.0), real(0.0), real(1.0), real(*x), real(*y)],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

/// Encode text for a WinAnsiEncoding font. Unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

fn add_image_xobject(doc: &mut Document, image: &PreparedImage) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color_space.pdf_name(),
        "BitsPerComponent" => 8,
        "Filter" => image.filter.pdf_name(),
    };

    if let Some(mask) = &image.soft_mask {
        let mask_id = doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                mask.clone(),
            )
            .with_compression(false),
        );
        dict.set("SMask", Object::Reference(mask_id));
    }

    doc.add_object(Stream::new(dict, image.data.clone()).with_compression(false))
}

/// Current page content as a list of stream references
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let contents = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Contents").ok());

    match contents {
        Some(Object::Array(items)) => items.clone(),
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            Ok(_) => vec![Object::Reference(*id)],
            Err(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Effective resources of a page as an owned dictionary: follows references
/// and inheritance, and inlines the sub-dictionaries we add entries to.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut resources = None;

    for _ in 0..MAX_RESOURCE_DEPTH {
        let Some(dict) = current else { break };
        if let Ok(obj) = dict.get(b"Resources") {
            resources = resolve_dictionary(doc, obj);
            if resources.is_some() {
                break;
            }
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }

    let mut resources = resources.unwrap_or_default();
    for category in ["Font", "XObject", "ExtGState"] {
        let inlined = resources
            .get(category.as_bytes())
            .ok()
            .and_then(|obj| resolve_dictionary(doc, obj));
        if let Some(dict) = inlined {
            resources.set(category, Object::Dictionary(dict));
        }
    }
    resources
}

fn resolve_dictionary(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::coords::ScreenRect;
    use crate::embed::test_images::{jpeg_header_without_scan, tiny_jpeg, tiny_png};
    use crate::embed::{to_data_url, ImageFormat};
    use crate::error::ImageDecodeError;
    use crate::render::test_pdfs::{letter, with_pages};

    fn annotation(page_number: u32, rect: ScreenRect, field: Field) -> Annotation {
        Annotation {
            id: AnnotationId::new(),
            page_number,
            rect,
            field,
        }
    }

    fn text(page_number: u32, value: &str) -> Annotation {
        annotation(
            page_number,
            ScreenRect::new(15.0, 100.0, 150.0, 30.0),
            Field::TextField {
                value: value.to_string(),
                style: TextStyle::default(),
            },
        )
    }

    fn selection(action: Option<SelectionAction>) -> Annotation {
        annotation(
            1,
            ScreenRect::new(60.0, 60.0, 150.0, 30.0),
            Field::SelectionField { action },
        )
    }

    fn signature(image: Option<String>, finalized: bool) -> Annotation {
        annotation(
            1,
            ScreenRect::new(30.0, 300.0, 200.0, 100.0),
            Field::SignatureField { image, finalized },
        )
    }

    fn first_page_operations(pdf: &[u8]) -> Vec<Operation> {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    fn page_xobject(pdf: &[u8], name: &str) -> Dictionary {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let resources = doc.get_dictionary(page_id).unwrap().get(b"Resources").unwrap();
        let xobjects = resources.as_dict().unwrap().get(b"XObject").unwrap().as_dict().unwrap();
        let id = xobjects.get(name.as_bytes()).unwrap().as_reference().unwrap();
        doc.get_object(id).unwrap().as_stream().unwrap().dict.clone()
    }

    #[test]
    fn test_zero_annotations_returns_original_bytes() {
        let pdf = letter();
        assert_eq!(burn(&pdf, &[], 1.5).unwrap(), pdf);
    }

    #[test]
    fn test_empty_fields_draw_nothing() {
        let pdf = letter();
        let annotations = vec![
            text(1, ""),
            selection(None),
            signature(Some(to_data_url(&tiny_png(), ImageFormat::Png)), false),
        ];
        let report = burn_with_report(&pdf, &annotations, 1.5, &BurnOptions::default()).unwrap();
        assert_eq!(report.pdf, pdf);
        assert_eq!(report.burned, 0);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_burn_is_deterministic() {
        let pdf = with_pages(&[(612, 792), (595, 842)]);
        let annotations = vec![
            text(1, "Hello"),
            selection(Some(SelectionAction::EditRequested)),
            signature(Some(to_data_url(&tiny_png(), ImageFormat::Png)), true),
            text(2, "Second page"),
        ];
        let first = burn(&pdf, &annotations, 1.5).unwrap();
        let second = burn(&pdf, &annotations, 1.5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_page_count_is_preserved() {
        let pdf = with_pages(&[(612, 792), (612, 792), (612, 792)]);
        let burned = burn(&pdf, &[text(2, "Middle")], 1.0).unwrap();
        let doc = Document::load_mem(&burned).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_text_lands_at_mapped_position() {
        let pdf = letter();
        let burned = burn(&pdf, &[text(1, "Hello")], 1.5).unwrap();
        let ops = first_page_operations(&burned);

        let tf = ops.iter().find(|op| op.operator == "Tf").unwrap();
        assert!((tf.operands[1].as_float().unwrap() - 16.0 / 1.5).abs() < 1e-3);

        let tm = ops.iter().find(|op| op.operator == "Tm").unwrap();
        assert!((tm.operands[4].as_float().unwrap() - 10.0).abs() < 1e-3);
        assert!((tm.operands[5].as_float().unwrap() - 705.333).abs() < 1e-2);

        let tj = ops.iter().find(|op| op.operator == "Tj").unwrap();
        assert_eq!(tj.operands[0].as_str().unwrap(), b"Hello");
    }

    #[test]
    fn test_original_content_is_kept() {
        let pdf = letter();
        let burned = burn(&pdf, &[text(1, "Added")], 1.0).unwrap();
        let ops = first_page_operations(&burned);
        let strings: Vec<&[u8]> = ops
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands[0].as_str().ok())
            .collect();
        assert_eq!(strings, vec![&b"Original page 1"[..], &b"Added"[..]]);
    }

    #[test]
    fn test_multiline_text_stacks_upward() {
        let pdf = letter();
        let burned = burn(&pdf, &[text(1, "top\nbottom")], 1.0).unwrap();
        let ys: Vec<f32> = first_page_operations(&burned)
            .iter()
            .filter(|op| op.operator == "Tm")
            .map(|op| op.operands[5].as_float().unwrap())
            .collect();
        assert_eq!(ys.len(), 2);
        // rect bottom: 792 - (100 + 30) = 662; font 16pt, leading 19.2
        assert!((ys[1] - 662.0).abs() < 1e-3);
        assert!((ys[0] - 681.2).abs() < 1e-3);
    }

    #[test]
    fn test_right_aligned_text() {
        let pdf = letter();
        let mut right = text(1, "abcd");
        if let Field::TextField { style, .. } = &mut right.field {
            style.text_align = TextAlign::Right;
        }
        let burned = burn(&pdf, &[right], 1.0).unwrap();
        let tm = first_page_operations(&burned)
            .into_iter()
            .find(|op| op.operator == "Tm")
            .unwrap();
        // 15 + 150 - 4 chars * 0.5em * 16pt
        assert!((tm.operands[4].as_float().unwrap() - 133.0).abs() < 1e-3);
    }

    #[test]
    fn test_remove_selection_burns_fill_and_label() {
        let pdf = letter();
        let burned = burn(&pdf, &[selection(Some(SelectionAction::RemoveRequested))], 1.0).unwrap();
        let ops = first_page_operations(&burned);

        let fill = ops
            .iter()
            .position(|op| op.operator == "re")
            .expect("rectangle");
        assert_eq!(ops[fill + 1].operator, "f");
        let color = ops[..fill].iter().rev().find(|op| op.operator == "rg").unwrap();
        let rgb: Vec<f32> = color.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(rgb, vec![1.0, 0.0, 0.0]);

        let label = ops.iter().rev().find(|op| op.operator == "Tj").unwrap();
        assert_eq!(label.operands[0].as_str().unwrap(), b"REMOVE");
        assert!(ops.iter().any(|op| op.operator == "gs"));
    }

    #[test]
    fn test_selection_uses_translucent_graphics_state() {
        let pdf = letter();
        let elaborate = selection(Some(SelectionAction::ElaborateRequested));
        let burned = burn(&pdf, &[elaborate], 1.0).unwrap();
        let doc = Document::load_mem(&burned).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let resources = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap();
        let states = resources.get(b"ExtGState").unwrap().as_dict().unwrap();
        let state_id = states.get(b"PmGs35").unwrap().as_reference().unwrap();
        let state = doc.get_dictionary(state_id).unwrap();
        assert!((state.get(b"ca").unwrap().as_float().unwrap() - 0.35).abs() < 1e-6);

        // The original font resource survives the merge
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(b"PmHelveticaBold"));
    }

    #[test]
    fn test_png_signature_embeds_flate_image_with_mask() {
        let pdf = letter();
        let sig = signature(Some(to_data_url(&tiny_png(), ImageFormat::Png)), true);
        let burned = burn(&pdf, &[sig], 1.0).unwrap();

        let image = page_xobject(&burned, "PmIm1");
        assert_eq!(image.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
        assert_eq!(image.get(b"Width").unwrap().as_i64().unwrap(), 2);
        assert!(image.has(b"SMask"));

        // 2x1 image in a 200x100 box fills it exactly
        let cm = first_page_operations(&burned)
            .into_iter()
            .find(|op| op.operator == "cm")
            .unwrap();
        let values: Vec<f32> = cm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(values, vec![200.0, 0.0, 0.0, 100.0, 30.0, 392.0]);
    }

    #[test]
    fn test_jpeg_signature_passes_through_dct() {
        let pdf = letter();
        // Labelled PNG, actually JPEG: the bytes decide
        let url = format!(
            "data:image/png;base64,{}",
            &to_data_url(&tiny_jpeg(), ImageFormat::Jpeg)["data:image/jpeg;base64,".len()..]
        );
        let burned = burn(&pdf, &[signature(Some(url), true)], 1.0).unwrap();

        let image = page_xobject(&burned, "PmIm1");
        assert_eq!(image.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(image.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceRGB");
        assert_eq!(image.get(b"Width").unwrap().as_i64().unwrap(), 40);
        assert!(!image.has(b"SMask"));
    }

    #[test]
    fn test_corrupt_jpeg_signature_is_skipped() {
        let pdf = letter();
        let url = to_data_url(&jpeg_header_without_scan(), ImageFormat::Jpeg);
        let report = burn_with_report(
            &pdf,
            &[signature(Some(url), true), text(1, "kept")],
            1.0,
            &BurnOptions::default(),
        )
        .unwrap();

        assert_eq!(report.burned, 1);
        assert!(matches!(
            report.skipped[0].error,
            AnnotationBurnError::Image(ImageDecodeError::Jpeg(_))
        ));
        assert!(!first_page_operations(&report.pdf).iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn test_bad_image_is_skipped_and_others_burn() {
        let pdf = letter();
        let broken = signature(Some("data:image/png;base64,@@@".to_string()), true);
        let broken_id = broken.id;
        let report = burn_with_report(
            &pdf,
            &[broken, text(1, "still here")],
            1.0,
            &BurnOptions::default(),
        )
        .unwrap();

        assert_eq!(report.burned, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, broken_id);
        assert!(matches!(
            report.skipped[0].error,
            AnnotationBurnError::Image(ImageDecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_missing_page_is_skipped() {
        let pdf = letter();
        let report =
            burn_with_report(&pdf, &[text(5, "nowhere")], 1.0, &BurnOptions::default()).unwrap();
        assert_eq!(report.skipped[0].error, AnnotationBurnError::PageMissing(5));
        assert_eq!(Document::load_mem(&report.pdf).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn test_malformed_document_is_fatal() {
        let result = burn(b"garbage", &[text(1, "x")], 1.0);
        assert!(matches!(result, Err(BurnError::Document(DocumentLoadError::ParseError(_)))));
    }

    #[test]
    fn test_non_ascii_color_burns_black() {
        let mut annotation = text(1, "hi");
        if let Field::TextField { style, .. } = &mut annotation.field {
            style.color = "#a\u{e9}abc".to_string();
        }
        let burned = burn(&letter(), &[annotation], 1.5).unwrap();

        let rg = first_page_operations(&burned)
            .into_iter()
            .rev()
            .find(|op| op.operator == "rg")
            .unwrap();
        let values: Vec<f32> = rg.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("€ — ™"), vec![0x80, b' ', 0x97, b' ', 0x99]);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn test_selection_with_nan_size_burns_default_box() {
        let pdf = letter();
        let mut sel = selection(Some(SelectionAction::EditRequested));
        sel.rect = ScreenRect::new(0.0, 0.0, f64::NAN, f64::NAN);
        let burned = burn(&pdf, &[sel], 1.0).unwrap();
        let re = first_page_operations(&burned)
            .into_iter()
            .find(|op| op.operator == "re")
            .unwrap();
        let values: Vec<f32> = re.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(values, vec![0.0, 762.0, 150.0, 30.0]);
        assert_eq!(AnnotationKind::SelectionField.default_size(), (150.0, 30.0));
    }
}
