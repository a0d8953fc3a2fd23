pub mod discovery;
pub mod metadata;
pub mod thumbnails;

use std::path::{Path, PathBuf};

use crate::config::ScannerConfig;
use crate::error::Result;

pub use discovery::discover_images;
pub use metadata::{extract_metadata, ImageMetadata};
pub use thumbnails::ThumbnailStore;

/// Image files selected from one directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub directory: PathBuf,
    /// Every regular file seen, image or not.
    pub file_count: usize,
    pub images: Vec<PathBuf>,
}

impl Catalog {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

pub struct Scanner {
    config: ScannerConfig,
    skip_dir: Option<String>,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            skip_dir: None,
        }
    }

    /// Never descend into a folder with this name (the thumbnails folder).
    pub fn skipping(mut self, folder_name: impl Into<String>) -> Self {
        self.skip_dir = Some(folder_name.into());
        self
    }

    pub fn scan_directory(&self, directory: &Path) -> Result<Catalog> {
        let discovered = discover_images(
            directory,
            &self.config.image_extensions,
            self.config.recursive,
            self.skip_dir.as_deref(),
        )?;

        tracing::info!(
            directory = %directory.display(),
            files = discovered.total_files,
            images = discovered.images.len(),
            "Catalog scanned"
        );

        Ok(Catalog {
            directory: directory.to_path_buf(),
            file_count: discovered.total_files,
            images: discovered.images,
        })
    }
}
