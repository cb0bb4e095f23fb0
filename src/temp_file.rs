//! In-flight download files.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use tempfile::TempPath;

/// Suffix carried by every in-flight download
pub const TEMP_SUFFIX: &str = ".sync.tmp";

/// Create a fresh temp file next to `target`, so the final rename stays on one
/// filesystem.
///
/// The name gets a random component and is created exclusively, so no file
/// already in the directory is ever opened or truncated. The file is removed
/// when the returned [`TempPath`] drops unless it was persisted.
pub fn create_sibling(target: &Path) -> io::Result<(std::fs::File, TempPath)> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut prefix = OsString::from(".");
    if let Some(name) = target.file_name() {
        prefix.push(name);
    }
    prefix.push(".");

    let file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    Ok(file.into_parts())
}
