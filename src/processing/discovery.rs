//! Input file enumeration

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;

/// List the regular files under `dir`, sorted by path
///
/// Files are not filtered by extension: anything that fails to decode is
/// reported later as a per-file failure.
pub fn discover_files<P: AsRef<Path>>(dir: P, recursive: bool) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Input directory does not exist: {}", dir.display()),
        )
        .into());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!("Discovered {} files in {:?}", files.len(), dir);
    Ok(files)
}
