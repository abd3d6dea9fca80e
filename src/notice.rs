use clap::ValueEnum;
use lopdf::{dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::action::LinkAction;
use crate::error::{RelinkError, Result};

/// Marks scripts installed by this crate so a later run can recognise them.
const SCRIPT_TAG: &str = "/* expediente-pdf viewer notice */";

/// What to do with an `/OpenAction` the document already carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OpenActionPolicy {
    /// Drop the existing open action.
    Replace,
    /// Run the notice first, then the existing open action via `/Next`.
    #[default]
    Chain,
}

impl OpenActionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenActionPolicy::Replace => "replace",
            OpenActionPolicy::Chain => "chain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeOptions {
    /// Text shown by `app.alert` in viewers that cannot follow file links.
    pub message: String,
    /// `app.viewerType` values of full-featured readers.
    pub trusted_viewers: Vec<String>,
}

impl Default for NoticeOptions {
    fn default() -> Self {
        Self {
            message: String::from(
                "Este expediente contiene enlaces a documentos adjuntos. \
                 Para abrirlos, use Adobe Acrobat o Adobe Acrobat Reader.",
            ),
            trusted_viewers: vec![
                String::from("Reader"),
                String::from("Exchange"),
                String::from("Exchange-Pro"),
            ],
        }
    }
}

/// JavaScript run on open: alert unless the viewer reports a trusted type.
pub fn advisory_script(notice: &NoticeOptions) -> String {
    let viewers = notice
        .trusted_viewers
        .iter()
        .map(|v| js_quote(v))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{SCRIPT_TAG}\n\
         try {{\n\
         \x20 var known = [{viewers}];\n\
         \x20 if (known.indexOf(app.viewerType) < 0) {{\n\
         \x20   app.alert({{ cMsg: {msg}, nIcon: 3, cTitle: \"Aviso\" }});\n\
         \x20 }}\n\
         }} catch (e) {{}}\n",
        msg = js_quote(&notice.message),
    )
}

/// Set the catalog `/OpenAction` to the advisory script.
///
/// With [`OpenActionPolicy::Chain`], a foreign open action is kept as `/Next`.
/// A notice left by an earlier run is replaced (its `/Next` carried over), so
/// applying this twice gives the same catalog.
pub fn install_open_action(
    doc: &mut Document,
    notice: &NoticeOptions,
    policy: OpenActionPolicy,
) -> Result<()> {
    let root_id = catalog_id(doc)?;
    let existing = doc.get_object(root_id)?.as_dict()?.get(b"OpenAction").ok().cloned();

    let next = match (policy, existing) {
        (OpenActionPolicy::Replace, _) | (_, None) => None,
        (OpenActionPolicy::Chain, Some(old)) => chained_action(doc, old),
    };

    let script = LinkAction::RunScript {
        code: advisory_script(notice),
    };
    let mut action = script.to_dict();
    if let Some(next) = next {
        log::info!("keeping existing open action after the viewer notice");
        action.set("Next", next);
    }

    let catalog = doc.get_object_mut(root_id)?.as_dict_mut()?;
    catalog.set("OpenAction", Object::Dictionary(action));
    Ok(())
}

pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .map_err(|e| RelinkError::Structure(format!("trailer has no /Root reference: {e}")))
}

/// The action to run after the notice, given the current `/OpenAction`.
fn chained_action(doc: &Document, old: Object) -> Option<Object> {
    let (is_action, own_next) = {
        let dict = match &old {
            Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
            Object::Dictionary(d) => Some(d),
            _ => None,
        };
        let own_next = dict
            .filter(|d| is_own_notice(doc, d))
            .map(|d| d.get(b"Next").ok().cloned());
        (dict.is_some(), own_next)
    };
    if let Some(next) = own_next {
        log::debug!("replacing viewer notice from a previous run");
        return next;
    }
    if is_action {
        return Some(old);
    }
    match old {
        // A bare destination array: wrap it so it can sit in /Next.
        Object::Array(_) => Some(Object::Dictionary(dictionary! {
            "S" => "GoTo",
            "D" => old,
        })),
        other => {
            log::warn!("dropping unrecognised /OpenAction {other:?}");
            None
        }
    }
}

fn is_own_notice(doc: &Document, dict: &lopdf::Dictionary) -> bool {
    matches!(
        LinkAction::from_dict(doc, dict, ""),
        Some(LinkAction::RunScript { code }) if code.starts_with(SCRIPT_TAG)
    )
}

/// Double-quoted JavaScript string literal.
fn js_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
