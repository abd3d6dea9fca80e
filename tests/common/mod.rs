#![allow(dead_code)]

use expediente_pdf::{load_document, LinkAction, DEFAULT_MARKER};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::path::Path;

/// A link annotation with a `URI` action, stored as its own object.
pub fn link_annotation(uri: &str, x: i64) -> Dictionary {
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => Object::Array(vec![x.into(), 700.into(), (x + 80).into(), 715.into()]),
        "Border" => Object::Array(vec![0.into(), 0.into(), 0.into()]),
        "A" => dictionary! {
            "Type" => "Action",
            "S" => "URI",
            "URI" => Object::string_literal(uri),
        },
    }
}

/// Document with one page per entry of `pages`, each page carrying one link
/// annotation per URI, in order.
pub fn build_document(pages: &[&[&str]]) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for uris in pages {
        let annots: Vec<Object> = uris
            .iter()
            .enumerate()
            .map(|(i, uri)| Object::Reference(doc.add_object(link_annotation(uri, 50 + 100 * i as i64))))
            .collect();
        let content = lopdf::Stream::new(
            Dictionary::new(),
            b"BT /F1 12 Tf 50 705 Td (Anexos) Tj ET".to_vec(),
        );
        let content_id = doc.add_object(content);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "Contents" => content_id,
            "Annots" => Object::Array(annots),
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(kids),
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn write_document(pages: &[&[&str]], path: &Path) {
    let mut doc = build_document(pages);
    doc.save(path).unwrap();
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap(),
        other => other,
    }
}

/// Annotation dictionaries of every page, in page and `/Annots` order.
pub fn annotations(doc: &Document) -> Vec<Vec<Dictionary>> {
    let pages: Vec<ObjectId> = doc.get_pages().values().cloned().collect();
    pages
        .into_iter()
        .map(|pid| {
            let page = doc.get_object(pid).unwrap().as_dict().unwrap();
            match page.get(b"Annots") {
                Ok(obj) => resolve(doc, obj)
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|a| resolve(doc, a).as_dict().unwrap().clone())
                    .collect(),
                Err(_) => Vec::new(),
            }
        })
        .collect()
}

/// Link actions of every page as the crate understands them.
pub fn actions(doc: &Document) -> Vec<Vec<Option<LinkAction>>> {
    annotations(doc)
        .iter()
        .map(|page| {
            page.iter()
                .map(|annot| {
                    let action = resolve(doc, annot.get(b"A").unwrap()).as_dict().unwrap();
                    LinkAction::from_dict(doc, action, DEFAULT_MARKER)
                })
                .collect()
        })
        .collect()
}

pub fn catalog(doc: &Document) -> Dictionary {
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_object(root).unwrap().as_dict().unwrap().clone()
}

pub fn reload(path: &Path) -> Document {
    load_document(path).unwrap()
}
