use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{FinderError, Result};

/// Files found under a directory, split by the extension allow-list.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    pub images: Vec<PathBuf>,
    pub total_files: usize,
}

/// Enumerate image files in `directory`.
///
/// Only the top level is read unless `recursive` is set. Directories named
/// `skip_dir` are never entered. Extensions are compared case-insensitively.
pub fn discover_images(
    directory: &Path,
    extensions: &[String],
    recursive: bool,
    skip_dir: Option<&str>,
) -> Result<Discovered> {
    let meta = std::fs::metadata(directory).map_err(|e| FinderError::filesystem(directory, e))?;
    if !meta.is_dir() {
        return Err(FinderError::filesystem(
            directory,
            io::Error::new(io::ErrorKind::Other, "not a directory"),
        ));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut discovered = Discovered::default();

    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && skip_dir.is_some_and(|skip| entry.file_name() == skip))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        discovered.total_files += 1;

        let path = entry.path();
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                discovered.images.push(path.to_path_buf());
            }
        }
    }

    discovered.images.sort();

    Ok(discovered)
}
