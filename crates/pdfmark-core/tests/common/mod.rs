//! Shared fixtures for pipeline tests

#![allow(dead_code)]

use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};

/// US Letter document with `count` pages, each showing "Page N"
pub fn letter_pdf(count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for n in 1..=count {
        let text = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", n);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save fixture");
    bytes
}

/// Decoded content operations of a 1-based page
pub fn page_operations(pdf: &[u8], page_number: u32) -> Vec<lopdf::content::Operation> {
    let doc = Document::load_mem(pdf).expect("load burned pdf");
    let page_id = doc.get_pages()[&page_number];
    let content = doc.get_page_content(page_id).expect("page content");
    Content::decode(&content).expect("decode content").operations
}

/// Strings shown with Tj on a page, in drawing order
pub fn shown_strings(pdf: &[u8], page_number: u32) -> Vec<String> {
    page_operations(pdf, page_number)
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| op.operands.first())
        .filter_map(|o| o.as_str().ok())
        .map(|s| String::from_utf8_lossy(s).to_string())
        .collect()
}
