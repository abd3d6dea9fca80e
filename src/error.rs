//! Error taxonomy for link normalization.
//!
//! Per-link problems ([`RelinkError::MalformedMarkedAction`]) are absorbed by the
//! rewriter and only show up in its report; everything else aborts the document.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RelinkError>;

#[derive(Debug, thiserror::Error)]
pub enum RelinkError {
    /// The input PDF could not be read or parsed.
    #[error("cannot read PDF '{}': {reason}", .path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    /// The page tree or catalog does not have the shape we need to edit it.
    #[error("unexpected document structure: {0}")]
    Structure(String),

    /// A marked link whose payload is not a usable relative path.
    #[error("malformed marked link: {reason}")]
    MalformedMarkedAction { reason: String },

    /// The temporary output could not be produced. The original is untouched.
    #[error("cannot write output for '{}': {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    /// The finished temporary file could not be moved over the original.
    #[error(
        "cannot replace '{}' (rewritten copy kept at '{}'): {source}",
        .target.display(),
        .temp.display()
    )]
    SwapFailure {
        target: PathBuf,
        temp: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("cannot expand input pattern: {0}")]
    Glob(#[from] glob::GlobError),
}

impl RelinkError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RelinkError::SourceUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RelinkError::MalformedMarkedAction {
            reason: reason.into(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RelinkError::WriteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit status for the CLI. A failed swap gets its own code because
    /// it can leave the original path without a valid file.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelinkError::SwapFailure { .. } => 2,
            _ => 1,
        }
    }
}

impl From<lopdf::Error> for RelinkError {
    fn from(e: lopdf::Error) -> Self {
        RelinkError::Structure(e.to_string())
    }
}
