use lopdf::Document;
use std::path::Path;

use crate::error::{RelinkError, Result};

/// Load a PDF from disk. Every read in this crate goes through here so that
/// parse failures always surface as [`RelinkError::SourceUnreadable`].
pub fn load_document(path: &Path) -> Result<Document> {
    let doc = Document::load(path).map_err(|e| RelinkError::unreadable(path, e))?;
    if doc.trailer.get(b"Root").is_err() {
        return Err(RelinkError::unreadable(path, "trailer has no /Root"));
    }
    Ok(doc)
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize> {
    let doc = load_document(path)?;
    Ok(doc.get_pages().len())
}
