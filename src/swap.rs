use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{RelinkError, Result};

/// Replace `target` with whatever `write` produces, never exposing a partial file.
///
/// The content goes to a temporary sibling (same directory, so the final step is
/// a plain rename on the same filesystem). If `write` fails the temporary file is
/// removed and `target` is untouched. If the rename fails the temporary file is
/// kept and its path returned in [`RelinkError::SwapFailure`].
pub fn write_atomically<F>(target: &Path, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".expediente-")
        .suffix(".pdf.tmp")
        .tempfile_in(dir)
        .map_err(|e| RelinkError::write(target, e))?;
    log::debug!("writing {}", tmp.path().display());

    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out)?;
        out.flush().map_err(|e| RelinkError::write(target, e))?;
    }
    // The temp file is created 0600; the replacement keeps the original's mode.
    if let Ok(meta) = fs::metadata(target) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| RelinkError::write(target, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| RelinkError::write(target, e))?;

    tmp.persist(target).map_err(|e| {
        let tempfile::PersistError { error, file } = e;
        let temp = file.path().to_path_buf();
        if let Err(keep) = file.into_temp_path().keep() {
            log::error!("could not keep {}: {}", temp.display(), keep);
        }
        RelinkError::SwapFailure {
            target: target.to_path_buf(),
            temp,
            source: error,
        }
    })?;
    Ok(target.to_path_buf())
}
