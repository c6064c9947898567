//! Whole-file reads and atomic writes
//!
//! Configuration files are always read into a complete buffer before parsing
//! and replaced through a rename, so readers never see a torn file. There is
//! no cross-process lock: two concurrent writers both succeed and the last
//! rename wins.

use std::fs;
use std::io::Write;

use crate::{Error, NormalizedPath, Result};

/// Write content atomically to a file.
///
/// The content goes to a uniquely named temporary file in the target's
/// directory (same filesystem), is flushed to disk, and is then renamed over
/// the target. Permissions of an existing target are carried over.
pub fn write_atomic(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    let native_path = path.to_native();

    let parent = match native_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().map_err(|e| Error::io(&native_path, e))?,
    };
    fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;

    let prefix = format!(".{}.", path.file_name().unwrap_or("condarc"));
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| Error::io(&parent, e))?;

    if let Ok(metadata) = fs::metadata(&native_path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| Error::io(temp.path(), e))?;
    }

    temp.write_all(content)
        .map_err(|e| Error::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(temp.path(), e))?;

    temp.persist(&native_path).map_err(|e| Error::Persist {
        path: native_path.clone(),
        source: e.error,
    })?;

    tracing::debug!(path = %path, bytes = content.len(), "Atomically replaced file");
    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Read text content, returning `None` when the file does not exist.
pub fn read_text_if_exists(path: &NormalizedPath) -> Result<Option<String>> {
    match read_text(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write text content to a file atomically.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

/// Whether an existing file is marked read-only.
///
/// Missing files report `false`: they can be created.
pub fn is_read_only(path: &NormalizedPath) -> bool {
    fs::metadata(path.to_native())
        .map(|m| m.permissions().readonly())
        .unwrap_or(false)
}
