use std::path::{Path, PathBuf};

use crate::config::ThumbnailConfig;
use crate::error::{FinderError, Result};

/// Names and writes thumbnails into a subfolder next to each source image.
#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    folder_name: String,
    infix: String,
    width: u32,
    height: u32,
}

impl ThumbnailStore {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            folder_name: config.folder_name.clone(),
            infix: config.infix.clone(),
            width: config.width,
            height: config.height,
        }
    }

    /// Requested render size as (width, height).
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Thumbnail location for `original`: `<dir>/<folder>/<stem><infix>.<ext>`.
    pub fn path_for(&self, original: &Path) -> PathBuf {
        let dir = original.parent().unwrap_or_else(|| Path::new("."));
        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let name = match original.extension() {
            Some(ext) => format!("{}{}.{}", stem, self.infix, ext.to_string_lossy()),
            None => format!("{}{}", stem, self.infix),
        };

        dir.join(&self.folder_name).join(name)
    }

    /// Write rendered thumbnail bytes, replacing any previous file.
    pub async fn save(&self, original: &Path, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.path_for(original);

        if let Some(folder) = target.parent() {
            tokio::fs::create_dir_all(folder)
                .await
                .map_err(|e| FinderError::filesystem(folder, e))?;
        }

        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| FinderError::filesystem(&target, e))?;

        Ok(target)
    }
}
