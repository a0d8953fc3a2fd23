use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::scanner::ThumbnailStore;
use crate::services::{TextRegion, VisionService};

use super::{ImageRecord, SearchOptions};

/// Optional per-image calls to the vision service.
///
/// The enabled calls run concurrently and are all awaited. A failed call
/// only leaves its own field empty.
pub struct Enricher {
    vision: Arc<dyn VisionService>,
    thumbnails: ThumbnailStore,
}

impl Enricher {
    pub fn new(vision: Arc<dyn VisionService>, thumbnails: ThumbnailStore) -> Self {
        Self { vision, thumbnails }
    }

    pub async fn enrich(&self, record: &mut ImageRecord, image: &[u8], options: &SearchOptions) {
        let (thumbnail, caption, text) = tokio::join!(
            async {
                if options.thumbnail {
                    self.thumbnail(&record.path, image).await
                } else {
                    Some(record.path.clone())
                }
            },
            async {
                if options.caption {
                    self.caption(&record.path, image).await
                } else {
                    String::new()
                }
            },
            async {
                if options.text {
                    self.text(&record.path, image).await
                } else {
                    String::new()
                }
            },
        );

        record.thumbnail = thumbnail;
        record.caption = caption;
        record.text = text;
    }

    async fn thumbnail(&self, path: &Path, image: &[u8]) -> Option<PathBuf> {
        let (width, height) = self.thumbnails.size();

        let rendered = match self.vision.thumbnail(width, height, image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Thumbnail request failed");
                return None;
            }
        };

        match self.thumbnails.save(path, &rendered).await {
            Ok(saved) => Some(saved),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write thumbnail");
                None
            }
        }
    }

    async fn caption(&self, path: &Path, image: &[u8]) -> String {
        match self.vision.describe(image).await {
            Ok(captions) => captions.into_iter().next().unwrap_or_default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Caption request failed");
                String::new()
            }
        }
    }

    async fn text(&self, path: &Path, image: &[u8]) -> String {
        match self.vision.recognize_text(image).await {
            Ok(regions) => first_line(&regions),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Text recognition failed");
                String::new()
            }
        }
    }
}

/// Words of the first line of the first region. Later lines are ignored.
fn first_line(regions: &[TextRegion]) -> String {
    regions
        .first()
        .and_then(|region| region.lines.first())
        .map(|words| words.join(" "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThumbnailConfig;
    use crate::services::fake::FakeVision;
    use std::fs;
    use std::sync::atomic::Ordering;

    fn words(line: &[&str]) -> Vec<String> {
        line.iter().map(|w| w.to_string()).collect()
    }

    fn setup(vision: FakeVision) -> (tempfile::TempDir, Arc<FakeVision>, Enricher, ImageRecord) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("party.jpg");
        fs::write(&path, b"party").unwrap();

        let vision = Arc::new(vision);
        let enricher = Enricher::new(
            vision.clone(),
            ThumbnailStore::new(&ThumbnailConfig::default()),
        );
        let record = ImageRecord::new(path, "Male 25".to_string());
        (dir, vision, enricher, record)
    }

    #[test]
    fn test_first_line_only() {
        let regions = vec![
            TextRegion {
                lines: vec![words(&["HAPPY", "BIRTHDAY"]), words(&["second", "line"])],
            },
            TextRegion {
                lines: vec![words(&["other"])],
            },
        ];
        assert_eq!(first_line(&regions), "HAPPY BIRTHDAY");
        assert_eq!(first_line(&[]), "");
        assert_eq!(first_line(&[TextRegion::default()]), "");
    }

    #[tokio::test]
    async fn test_all_enrichments() {
        let (dir, vision, enricher, mut record) = setup(FakeVision {
            captions: vec!["a group of people".to_string(), "a crowd".to_string()],
            regions: vec![TextRegion {
                lines: vec![words(&["HAPPY", "BIRTHDAY"]), words(&["ignored"])],
            }],
            ..Default::default()
        });
        let options = SearchOptions {
            thumbnail: true,
            caption: true,
            text: true,
            ..Default::default()
        };

        let image = fs::read(&record.path).unwrap();
        enricher.enrich(&mut record, &image, &options).await;

        let thumb = dir.path().join("FaceThumbnails").join("party_thumb.jpg");
        assert_eq!(record.thumbnail.as_deref(), Some(thumb.as_path()));
        assert_eq!(fs::read(&thumb).unwrap(), b"thumb 100x100 party");
        assert_eq!(record.caption, "a group of people");
        assert_eq!(record.text, "HAPPY BIRTHDAY");
        assert_eq!(vision.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_caption_failure_keeps_thumbnail() {
        let (dir, _vision, enricher, mut record) = setup(FakeVision {
            fail_caption: true,
            ..Default::default()
        });
        let options = SearchOptions {
            thumbnail: true,
            caption: true,
            ..Default::default()
        };

        let image = fs::read(&record.path).unwrap();
        enricher.enrich(&mut record, &image, &options).await;

        assert_eq!(
            record.thumbnail,
            Some(dir.path().join("FaceThumbnails").join("party_thumb.jpg"))
        );
        assert_eq!(record.caption, "");
    }

    #[tokio::test]
    async fn test_thumbnail_failure_leaves_field_empty() {
        let (_dir, _vision, enricher, mut record) = setup(FakeVision {
            fail_thumbnail: true,
            captions: vec!["a dog".to_string()],
            ..Default::default()
        });
        let options = SearchOptions {
            thumbnail: true,
            caption: true,
            ..Default::default()
        };

        let image = fs::read(&record.path).unwrap();
        enricher.enrich(&mut record, &image, &options).await;

        assert!(record.thumbnail.is_none());
        assert_eq!(record.caption, "a dog");
    }

    #[tokio::test]
    async fn test_disabled_calls_are_not_made() {
        let (_dir, vision, enricher, mut record) = setup(FakeVision::default());

        let image = fs::read(&record.path).unwrap();
        enricher
            .enrich(&mut record, &image, &SearchOptions::default())
            .await;

        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
        assert_eq!(record.thumbnail.as_ref(), Some(&record.path));
        assert!(record.caption.is_empty());
        assert!(record.text.is_empty());
    }
}
