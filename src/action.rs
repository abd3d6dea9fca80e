use lopdf::{Dictionary, Document, Object, StringFormat};
use serde::{Deserialize, Serialize};

use crate::error::{RelinkError, Result};

/// Marker prefix written into link hrefs before rendering.
pub const DEFAULT_MARKER: &str = "relative:";

/// The link actions this crate reads and writes.
///
/// Anything else found in a document (plain web URIs, `GoTo`, named actions...)
/// has no variant here and is copied through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkAction {
    /// `/S /URI` whose URI starts with the marker. `marker` keeps the prefix
    /// exactly as found, `path` is the raw remainder.
    UriMarked { marker: String, path: String },
    /// `/S /GoToR`: open another PDF at a page.
    GoToRemote {
        path: String,
        page_index: u32,
        new_window: bool,
    },
    /// `/S /Launch`: let the OS open the file with its default handler.
    Launch { path: String },
    /// `/S /JavaScript`.
    RunScript { code: String },
}

impl LinkAction {
    /// Read an action dictionary. `marker` decides which URI actions count as marked
    /// (matched case-insensitively, since renderers may lowercase URL schemes).
    pub fn from_dict(doc: &Document, dict: &Dictionary, marker: &str) -> Option<LinkAction> {
        let kind = match dict.get(b"S").ok()? {
            Object::Name(n) => n.as_slice(),
            _ => return None,
        };
        match kind {
            b"URI" => {
                let uri = string_value(doc, dict.get(b"URI").ok()?)?;
                let (head, tail) = split_marker(&uri, marker)?;
                Some(LinkAction::UriMarked {
                    marker: head.to_string(),
                    path: tail.to_string(),
                })
            }
            b"GoToR" => {
                let path = file_spec_value(doc, dict.get(b"F").ok()?)?;
                let page_index = match dict.get(b"D").ok().map(|d| resolve(doc, d)) {
                    Some(Object::Array(dest)) => match dest.first() {
                        Some(Object::Integer(i)) => u32::try_from(*i).unwrap_or(0),
                        _ => 0,
                    },
                    _ => 0,
                };
                let new_window = matches!(dict.get(b"NewWindow"), Ok(Object::Boolean(true)));
                Some(LinkAction::GoToRemote {
                    path,
                    page_index,
                    new_window,
                })
            }
            b"Launch" => Some(LinkAction::Launch {
                path: file_spec_value(doc, dict.get(b"F").ok()?)?,
            }),
            b"JavaScript" => {
                let code = match resolve(doc, dict.get(b"JS").ok()?) {
                    Object::Stream(s) => decode_text(&s.content),
                    other => string_value(doc, other)?,
                };
                Some(LinkAction::RunScript { code })
            }
            _ => None,
        }
    }

    /// Build the action dictionary for this variant.
    pub fn to_dict(&self) -> Dictionary {
        let mut d = Dictionary::new();
        d.set("Type", "Action");
        match self {
            LinkAction::UriMarked { marker, path } => {
                d.set("S", "URI");
                d.set(
                    "URI",
                    Object::String(format!("{marker}{path}").into_bytes(), StringFormat::Literal),
                );
            }
            LinkAction::GoToRemote {
                path,
                page_index,
                new_window,
            } => {
                d.set("S", "GoToR");
                d.set("F", file_spec(path));
                d.set(
                    "D",
                    Object::Array(vec![
                        Object::Integer(i64::from(*page_index)),
                        Object::Name(b"Fit".to_vec()),
                    ]),
                );
                d.set("NewWindow", *new_window);
            }
            LinkAction::Launch { path } => {
                d.set("S", "Launch");
                d.set("F", file_spec(path));
                d.set("NewWindow", true);
            }
            LinkAction::RunScript { code } => {
                d.set("S", "JavaScript");
                d.set("JS", text_string(code));
            }
        }
        d
    }

    pub fn is_marked(&self) -> bool {
        matches!(self, LinkAction::UriMarked { .. })
    }
}

/// Convert a relative reference to forward-slash form: `\` becomes `/`, runs of
/// slashes collapse and leading `./` segments are dropped.
pub fn normalize_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    let mut rest = out.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Pick the replacement action for a relative target: `GoToR` (page 0, new window)
/// for `.pdf` files, `Launch` for everything else.
pub fn classify_target(path: &str) -> Result<LinkAction> {
    let path = normalize_separators(path.trim());
    if path.is_empty() || path == "." {
        return Err(RelinkError::malformed("empty target path"));
    }
    if path.ends_with('/') {
        return Err(RelinkError::malformed(format!("'{path}' names a folder")));
    }
    if is_pdf_path(&path) {
        Ok(LinkAction::GoToRemote {
            path,
            page_index: 0,
            new_window: true,
        })
    } else {
        Ok(LinkAction::Launch { path })
    }
}

/// Decode the payload of a marked URI and classify it.
pub fn resolve_marked(payload: &str) -> Result<LinkAction> {
    let decoded = urlencoding::decode(payload)
        .map_err(|e| RelinkError::malformed(format!("bad percent-encoding in '{payload}': {e}")))?;
    if decoded.contains('\0') {
        return Err(RelinkError::malformed("path contains a NUL byte"));
    }
    classify_target(&decoded)
}

/// Last path segment ends in `.pdf`, ignoring ASCII case. A bare `.pdf` name counts.
pub fn is_pdf_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).as_bytes();
    name.len() >= 4 && name[name.len() - 4..].eq_ignore_ascii_case(b".pdf")
}

/// Split `uri` into (marker as written, remainder) if it carries `marker`.
pub(crate) fn split_marker<'a>(uri: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    if marker.is_empty() || uri.len() < marker.len() || !uri.is_char_boundary(marker.len()) {
        return None;
    }
    let (head, tail) = uri.split_at(marker.len());
    head.eq_ignore_ascii_case(marker).then_some((head, tail))
}

// ========== PDF string helpers ==========

/// PDF text string: plain bytes when ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// File specification for `/F`: a bare string for ASCII paths, a `/Filespec`
/// dictionary with a unicode `/UF` entry otherwise.
fn file_spec(path: &str) -> Object {
    let bytes = Object::String(path.as_bytes().to_vec(), StringFormat::Literal);
    if path.is_ascii() {
        return bytes;
    }
    let mut d = Dictionary::new();
    d.set("Type", "Filespec");
    d.set("F", bytes);
    d.set("UF", text_string(path));
    Object::Dictionary(d)
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn string_value(doc: &Document, obj: &Object) -> Option<String> {
    match resolve(doc, obj) {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

fn file_spec_value(doc: &Document, obj: &Object) -> Option<String> {
    match resolve(doc, obj) {
        Object::Dictionary(d) => d
            .get(b"UF")
            .ok()
            .and_then(|o| string_value(doc, o))
            .or_else(|| d.get(b"F").ok().and_then(|o| string_value(doc, o))),
        other => string_value(doc, other),
    }
}

pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}
