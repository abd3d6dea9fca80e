//! Post-render pass: turn marked `URI` link actions into `GoToR` / `Launch`
//! actions, add the viewer notice, and replace the file atomically.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::action::{self, resolve, LinkAction, DEFAULT_MARKER};
use crate::error::{RelinkError, Result};
use crate::notice::{self, NoticeOptions, OpenActionPolicy};
use crate::page_count::load_document;
use crate::swap::write_atomically;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteOptions {
    /// Prefix identifying links that still need normalizing.
    pub marker: String,
    /// Open-time advisory; `None` leaves the catalog alone.
    pub notice: Option<NoticeOptions>,
    pub open_action: OpenActionPolicy,
    /// Do everything except writing the file.
    pub dry_run: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            notice: Some(NoticeOptions::default()),
            open_action: OpenActionPolicy::default(),
            dry_run: false,
        }
    }
}

/// Where a document is in the rewrite. Anything short of `Swapped` means the
/// file on disk is still the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStage {
    Loaded,
    Mutating,
    Finalized,
    Swapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkResult {
    Rewritten { action: LinkAction },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    /// 1-based page number.
    pub page: u32,
    /// Position in the page's `/Annots` array.
    pub index: usize,
    /// Marked payload as found in the document.
    pub target: String,
    pub result: LinkResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteReport {
    pub path: PathBuf,
    pub pages: usize,
    pub stage: RewriteStage,
    pub notice_installed: bool,
    pub links: Vec<LinkOutcome>,
}

impl RewriteReport {
    fn new(path: &Path, pages: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            pages,
            stage: RewriteStage::Loaded,
            notice_installed: false,
            links: Vec::new(),
        }
    }

    pub fn rewritten(&self) -> usize {
        self.links
            .iter()
            .filter(|l| matches!(l.result, LinkResult::Rewritten { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.links.len() - self.rewritten()
    }
}

/// Rewrite the PDF at `path` in place.
pub fn rewrite_file(path: &Path, opts: &RewriteOptions) -> Result<RewriteReport> {
    let mut doc = load_document(path)?;
    let mut report = RewriteReport::new(path, doc.get_pages().len());
    log::info!("{}: loaded, {} page(s)", path.display(), report.pages);

    report.stage = RewriteStage::Mutating;
    report.links = relink_document(&mut doc, &opts.marker)?;
    if let Some(notice) = &opts.notice {
        notice::install_open_action(&mut doc, notice, opts.open_action)?;
        report.notice_installed = true;
    }

    if opts.dry_run {
        log::info!("{}: dry run, file left as is", path.display());
        return Ok(report);
    }

    let stage = &mut report.stage;
    write_atomically(path, |out| {
        doc.save_to(out).map_err(|e| RelinkError::write(path, e))?;
        *stage = RewriteStage::Finalized;
        Ok(())
    })?;
    report.stage = RewriteStage::Swapped;
    log::info!(
        "{}: {} link(s) rewritten, {} skipped",
        path.display(),
        report.rewritten(),
        report.skipped()
    );
    Ok(report)
}

/// Replace every marked link action in `doc`, page by page in `/Annots` order.
/// Malformed targets are logged and left untouched.
pub fn relink_document(doc: &mut Document, marker: &str) -> Result<Vec<LinkOutcome>> {
    let mut outcomes = Vec::new();
    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

    for (page, page_id) in pages {
        for (index, slot) in annotation_slots(doc, page_id)?.into_iter().enumerate() {
            let Some((target, action_ref)) = marked_link(doc, &slot, marker) else {
                continue;
            };
            log::debug!("page {page}, annotation {index}: marked target '{target}'");

            let result = match action::resolve_marked(&target) {
                Ok(replacement) => {
                    log::info!("page {page}: '{target}' -> {}", describe(&replacement));
                    let dict = Object::Dictionary(replacement.to_dict());
                    match action_ref {
                        Some(id) => {
                            doc.objects.insert(id, dict);
                        }
                        None => {
                            annotation_mut(doc, &slot)?.set("A", dict);
                        }
                    }
                    LinkResult::Rewritten {
                        action: replacement,
                    }
                }
                Err(e) => {
                    log::warn!("page {page}, annotation {index}: {e}; left unchanged");
                    LinkResult::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(LinkOutcome {
                page,
                index,
                target,
                result,
            });
        }
    }
    Ok(outcomes)
}

fn describe(action: &LinkAction) -> String {
    match action {
        LinkAction::GoToRemote { path, page_index, .. } => {
            format!("GoToR {path} (page {page_index}, new window)")
        }
        LinkAction::Launch { path } => format!("Launch {path}"),
        LinkAction::UriMarked { marker, path } => format!("URI {marker}{path}"),
        LinkAction::RunScript { .. } => String::from("JavaScript"),
    }
}

// ========== annotation addressing ==========

/// Where the `/Annots` array of a page lives.
#[derive(Debug, Clone, Copy)]
enum AnnotsArray {
    InPage(ObjectId),
    Indirect(ObjectId),
}

/// One entry of a page's `/Annots`.
#[derive(Debug, Clone, Copy)]
enum AnnotSlot {
    Indirect(ObjectId),
    Inline { array: AnnotsArray, index: usize },
}

fn annotation_slots(doc: &Document, page_id: ObjectId) -> Result<Vec<AnnotSlot>> {
    let page = doc.get_object(page_id)?.as_dict()?;
    let (array, entries) = match page.get(b"Annots") {
        Err(_) => return Ok(Vec::new()),
        Ok(Object::Reference(id)) => (
            AnnotsArray::Indirect(*id),
            doc.get_object(*id).and_then(|o| o.as_array()),
        ),
        Ok(obj) => (AnnotsArray::InPage(page_id), obj.as_array()),
    };
    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("page object {page_id:?}: /Annots is not an array ({e}); no links read");
            return Ok(Vec::new());
        }
    };
    Ok(entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Object::Reference(id) => AnnotSlot::Indirect(*id),
            _ => AnnotSlot::Inline { array, index },
        })
        .collect())
}

fn annotation<'a>(doc: &'a Document, slot: &AnnotSlot) -> Option<&'a Dictionary> {
    match *slot {
        AnnotSlot::Indirect(id) => doc.get_object(id).ok()?.as_dict().ok(),
        AnnotSlot::Inline { array, index } => {
            let entries = match array {
                AnnotsArray::InPage(pid) => {
                    doc.get_object(pid).ok()?.as_dict().ok()?.get(b"Annots").ok()?.as_array().ok()?
                }
                AnnotsArray::Indirect(aid) => doc.get_object(aid).ok()?.as_array().ok()?,
            };
            entries.get(index)?.as_dict().ok()
        }
    }
}

fn annotation_mut<'a>(doc: &'a mut Document, slot: &AnnotSlot) -> Result<&'a mut Dictionary> {
    let dict = match *slot {
        AnnotSlot::Indirect(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        AnnotSlot::Inline { array, index } => {
            let entries = match array {
                AnnotsArray::InPage(pid) => doc
                    .get_object_mut(pid)?
                    .as_dict_mut()?
                    .get_mut(b"Annots")?
                    .as_array_mut()?,
                AnnotsArray::Indirect(aid) => doc.get_object_mut(aid)?.as_array_mut()?,
            };
            entries
                .get_mut(index)
                .ok_or_else(|| RelinkError::Structure(format!("annotation {index} vanished")))?
                .as_dict_mut()?
        }
    };
    Ok(dict)
}

/// The marked payload of a link annotation, plus the object id of its action
/// when `/A` is an indirect reference.
fn marked_link(
    doc: &Document,
    slot: &AnnotSlot,
    marker: &str,
) -> Option<(String, Option<ObjectId>)> {
    let annot = annotation(doc, slot)?;
    if !matches!(resolve(doc, annot.get(b"Subtype").ok()?), Object::Name(n) if n == b"Link") {
        return None;
    }
    let (action, action_id) = match annot.get(b"A").ok()? {
        Object::Reference(id) => (doc.get_object(*id).ok()?.as_dict().ok()?, Some(*id)),
        obj => (obj.as_dict().ok()?, None),
    };
    match LinkAction::from_dict(doc, action, marker)? {
        LinkAction::UriMarked { path, .. } => Some((path, action_id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn marked(uri: &str) -> Dictionary {
        dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => Object::Array(vec![0.into(), 0.into(), 10.into(), 10.into()]),
            "A" => dictionary! { "S" => "URI", "URI" => Object::string_literal(uri) },
        }
    }

    /// One page whose `/Annots` holds inline dictionaries.
    fn inline_doc(annots: Vec<Dictionary>) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
            "Annots" => Object::Array(annots.into_iter().map(Object::Dictionary).collect()),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Object::Array(vec![Object::Reference(page_id)]),
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        (doc, page_id)
    }

    fn page_action(doc: &Document, page_id: ObjectId, index: usize) -> Option<LinkAction> {
        let annots = doc
            .get_object(page_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Annots")
            .unwrap()
            .as_array()
            .unwrap();
        let a = annots[index].as_dict().unwrap().get(b"A").unwrap().as_dict().unwrap();
        LinkAction::from_dict(doc, a, DEFAULT_MARKER)
    }

    #[test]
    fn inline_annotations_are_rewritten_in_place() {
        let (mut doc, page_id) = inline_doc(vec![
            marked("relative:reports/summary.pdf"),
            marked("relative:images\\photo.jpg"),
        ]);
        let outcomes = relink_document(&mut doc, DEFAULT_MARKER).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            page_action(&doc, page_id, 0),
            Some(LinkAction::GoToRemote {
                path: "reports/summary.pdf".into(),
                page_index: 0,
                new_window: true,
            })
        );
        assert_eq!(
            page_action(&doc, page_id, 1),
            Some(LinkAction::Launch {
                path: "images/photo.jpg".into()
            })
        );
    }

    #[test]
    fn empty_payload_is_skipped_not_fatal() {
        let (mut doc, page_id) = inline_doc(vec![marked("relative:"), marked("relative:a.pdf")]);
        let outcomes = relink_document(&mut doc, DEFAULT_MARKER).unwrap();
        assert!(matches!(outcomes[0].result, LinkResult::Skipped { .. }));
        assert!(matches!(outcomes[1].result, LinkResult::Rewritten { .. }));
        assert!(page_action(&doc, page_id, 0).unwrap().is_marked());
    }

    #[test]
    fn other_annotations_pass_through() {
        let web = dictionary! {
            "Subtype" => "Link",
            "A" => dictionary! { "S" => "URI", "URI" => Object::string_literal("https://example.org") },
        };
        let note = dictionary! {
            "Subtype" => "Text",
            "A" => dictionary! { "S" => "URI", "URI" => Object::string_literal("relative:x.pdf") },
        };
        let (mut doc, page_id) = inline_doc(vec![web.clone(), note.clone()]);
        let outcomes = relink_document(&mut doc, DEFAULT_MARKER).unwrap();
        assert!(outcomes.is_empty());
        let annots = doc.get_object(page_id).unwrap().as_dict().unwrap().get(b"Annots").unwrap();
        assert_eq!(
            annots.as_array().unwrap(),
            &vec![Object::Dictionary(web), Object::Dictionary(note)]
        );
    }

    #[test]
    fn custom_marker_is_honoured() {
        let (mut doc, page_id) = inline_doc(vec![marked("local:anexo.docx")]);
        assert!(relink_document(&mut doc, DEFAULT_MARKER).unwrap().is_empty());
        relink_document(&mut doc, "local:").unwrap();
        assert_eq!(
            page_action(&doc, page_id, 0),
            Some(LinkAction::Launch {
                path: "anexo.docx".into()
            })
        );
    }

    #[test]
    fn annots_array_stored_as_its_own_object() {
        let (mut doc, page_id) = inline_doc(vec![]);
        let annots_id = doc.add_object(Object::Array(vec![
            Object::Dictionary(marked("relative:anexos/acta.pdf")),
            Object::Dictionary(marked("relative:anexos/foto.png")),
        ]));
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", Object::Reference(annots_id));

        let outcomes = relink_document(&mut doc, DEFAULT_MARKER).unwrap();
        assert_eq!(outcomes.len(), 2);

        let annots = doc.get_object(annots_id).unwrap().as_array().unwrap();
        let action_at = |i: usize| {
            let a = annots[i].as_dict().unwrap().get(b"A").unwrap().as_dict().unwrap();
            LinkAction::from_dict(&doc, a, DEFAULT_MARKER)
        };
        assert_eq!(
            action_at(0),
            Some(LinkAction::GoToRemote {
                path: "anexos/acta.pdf".into(),
                page_index: 0,
                new_window: true,
            })
        );
        assert_eq!(
            action_at(1),
            Some(LinkAction::Launch {
                path: "anexos/foto.png".into()
            })
        );
    }

    #[test]
    fn page_with_broken_annots_does_not_stop_the_rest() {
        let (mut doc, first_page) = inline_doc(vec![]);
        doc.get_object_mut(first_page)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", Object::Null);

        let pages_id = doc
            .get_object(first_page)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Parent")
            .unwrap()
            .as_reference()
            .unwrap();
        let dangling = doc.add_object(Object::Integer(7));
        let second_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Annots" => Object::Reference(dangling),
        });
        let third_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Annots" => Object::Array(vec![Object::Dictionary(marked("relative:a.pdf"))]),
        });
        {
            let pages = doc.get_object_mut(pages_id).unwrap().as_dict_mut().unwrap();
            pages.set(
                "Kids",
                Object::Array(vec![
                    Object::Reference(first_page),
                    Object::Reference(second_page),
                    Object::Reference(third_page),
                ]),
            );
            pages.set("Count", 3);
        }

        let outcomes = relink_document(&mut doc, DEFAULT_MARKER).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].page, 3);
        assert!(matches!(
            page_action(&doc, third_page, 0),
            Some(LinkAction::GoToRemote { .. })
        ));
    }

    #[test]
    fn shared_action_object_is_replaced_once() {
        let (mut doc, page_id) = inline_doc(vec![]);
        let action_id = doc.add_object(dictionary! {
            "S" => "URI",
            "URI" => Object::string_literal("relative:doc.pdf"),
        });
        let link = |doc: &mut Document| {
            doc.add_object(dictionary! { "Subtype" => "Link", "A" => action_id })
        };
        let (a, b) = (link(&mut doc), link(&mut doc));
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", Object::Array(vec![Object::Reference(a), Object::Reference(b)]));

        // The second link already sees the replaced action.
        let outcomes = relink_document(&mut doc, DEFAULT_MARKER).unwrap();
        assert_eq!(outcomes.len(), 1);
        let action = doc.get_object(action_id).unwrap().as_dict().unwrap();
        assert!(matches!(
            LinkAction::from_dict(&doc, action, DEFAULT_MARKER),
            Some(LinkAction::GoToRemote { .. })
        ));
    }
}
