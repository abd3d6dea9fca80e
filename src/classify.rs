//! Pre-render pass over the hyperlinks of a case-file page.
//!
//! Local targets get the marker prefix so the rewriter can find them after
//! rendering, and links to local PDFs get their page count in the visible text.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::action::{is_pdf_path, normalize_separators, split_marker, DEFAULT_MARKER};
use crate::page_count::page_count;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyOptions {
    pub marker: String,
    /// Visible text for links to local PDFs; `{pages}` and `{text}` are replaced.
    pub label: String,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            label: String::from("{pages} páginas - {text}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub href: String,
    pub text: String,
}

impl Hyperlink {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Has a URL scheme or is protocol-relative.
    Remote,
    /// In-page anchor, or empty.
    Fragment,
    /// Already carries the marker.
    Marked,
    LocalPdf,
    LocalFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLink {
    pub href: String,
    pub text: String,
    pub kind: LinkKind,
    /// Page count of a local PDF that could be read.
    pub pages: Option<usize>,
}

/// Classify `links` relative to the case folder `base`.
pub fn classify_links(
    base: &Path,
    links: &[Hyperlink],
    opts: &ClassifyOptions,
) -> Vec<ClassifiedLink> {
    links.iter().map(|l| classify_link(base, l, opts)).collect()
}

pub fn classify_link(base: &Path, link: &Hyperlink, opts: &ClassifyOptions) -> ClassifiedLink {
    let href = link.href.trim();
    let untouched = |kind| ClassifiedLink {
        href: link.href.clone(),
        text: link.text.clone(),
        kind,
        pages: None,
    };

    if href.is_empty() || href.starts_with('#') {
        return untouched(LinkKind::Fragment);
    }
    if split_marker(href, &opts.marker).is_some() {
        return untouched(LinkKind::Marked);
    }
    if is_remote(href) {
        return untouched(LinkKind::Remote);
    }

    // Query and fragment do not name a file.
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let path = normalize_separators(path);
    let marked = format!("{}{}", opts.marker, path);

    if !is_pdf_path(&path) {
        log::info!("'{path}': local file, will be launched");
        return ClassifiedLink {
            href: marked,
            text: link.text.clone(),
            kind: LinkKind::LocalFile,
            pages: None,
        };
    }

    let decoded = urlencoding::decode(&path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.clone());
    let on_disk = base.join(decoded);
    let pages = if on_disk.is_file() {
        match page_count(&on_disk) {
            Ok(n) => Some(n),
            Err(e) => {
                log::warn!("error reading PDF '{}': {e}", on_disk.display());
                None
            }
        }
    } else {
        log::warn!("PDF not found: {}", on_disk.display());
        None
    };

    let text = match pages {
        Some(n) => {
            log::info!("'{path}': {n} page(s)");
            opts.label
                .replace("{pages}", &n.to_string())
                .replace("{text}", &link.text)
        }
        None => link.text.clone(),
    };
    ClassifiedLink {
        href: marked,
        text,
        kind: LinkKind::LocalPdf,
        pages,
    }
}

/// `scheme:` or `//host` prefix. A single letter before `:` is a drive, not a scheme.
fn is_remote(href: &str) -> bool {
    if href.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    scheme.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
