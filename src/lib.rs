//! Link normalization for rendered case-file PDFs.
//!
//! Before rendering, [`classify`] marks hrefs that point at local files and adds
//! page counts to links to local PDFs. After rendering, [`rewrite`] turns the
//! marked `URI` actions into `GoToR` / `Launch` actions and swaps the file in place.

pub mod action;
pub mod classify;
pub mod error;
pub mod notice;
pub mod page_count;
pub mod rewrite;
pub mod swap;

pub use action::{classify_target, normalize_separators, LinkAction, DEFAULT_MARKER};
pub use classify::{classify_links, ClassifiedLink, ClassifyOptions, Hyperlink, LinkKind};
pub use error::{RelinkError, Result};
pub use notice::{NoticeOptions, OpenActionPolicy};
pub use page_count::{load_document, page_count};
pub use rewrite::{rewrite_file, RewriteOptions, RewriteReport, RewriteStage};
