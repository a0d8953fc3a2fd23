use chrono::NaiveDateTime;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{FinderError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub taken_at: Option<NaiveDateTime>,
    pub title: Option<String>,
}

impl ImageMetadata {
    /// One-line summary shown with a result: `"<date taken> <title>"`.
    pub fn summary(&self) -> String {
        let taken = self
            .taken_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let title = self.title.as_deref().unwrap_or_default();

        format!("{} {}", taken, title).trim().to_string()
    }
}

/// Read EXIF fields from an image.
///
/// Files without an EXIF container yield empty metadata rather than an error.
pub fn extract_metadata(path: &Path) -> Result<ImageMetadata> {
    let mut metadata = ImageMetadata::default();

    let file = File::open(path).map_err(|e| FinderError::filesystem(path, e))?;
    let mut bufreader = BufReader::new(file);

    let exif = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No EXIF data");
            return Ok(metadata);
        }
    };

    if let Some(field) = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) {
        metadata.taken_at = parse_exif_datetime(&ascii_value(field));
    }

    if let Some(field) = exif.get_field(exif::Tag::ImageDescription, exif::In::PRIMARY) {
        let title = ascii_value(field);
        if !title.is_empty() {
            metadata.title = Some(title);
        }
    }

    Ok(metadata)
}

fn ascii_value(field: &exif::Field) -> String {
    field
        .display_value()
        .to_string()
        .trim_matches('"')
        .trim()
        .to_string()
}

/// EXIF stores `2019:07:04 18:30:00`; display formatting may already use dashes.
fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
