//! Atomic file writes and JSON file helpers.
//!
//! Every artifact is written to a hidden temp file next to its target and
//! renamed into place, so an interrupted run never leaves a half-written file.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CatalogError, Result};

/// Write `contents` to `path` via temp file + rename. Creates parent dirs.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
    }

    let temp = temp_path(path);
    std::fs::write(&temp, contents).map_err(|e| CatalogError::io(&temp, e))?;

    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(CatalogError::io(path, e));
    }

    tracing::debug!(path = %path.display(), "wrote file");
    Ok(())
}

/// Serialize `data` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| CatalogError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, json)
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| CatalogError::parse(format!("invalid JSON in {}: {e}", path.display())))
}

/// List files in `dir` whose extension is one of `extensions` (case-insensitive),
/// sorted by file name. Hidden files are skipped.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CatalogError::io(dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.') || n.starts_with("~$"));
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
            !hidden && ext_ok
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// File stem as an owned string (empty when the path has none).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".into());
    path.with_file_name(format!(".{name}.tmp"))
}
