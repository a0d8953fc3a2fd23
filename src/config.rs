use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FinderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_face_service")]
    pub face: ServiceConfig,

    #[serde(default = "default_vision_service")]
    pub vision: ServiceConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub search: SearchDefaults,
}

/// Endpoint and credentials of one remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://westcentralus.api.cognitive.microsoft.com".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_face_service() -> ServiceConfig {
    ServiceConfig::default()
}

fn default_vision_service() -> ServiceConfig {
    ServiceConfig::default()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the API key, failing when it is missing or blank.
    pub fn require_key(&self, service: &str) -> std::result::Result<&str, FinderError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(FinderError::Config(format!(
                "missing {} subscription key",
                service
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Descend into subdirectories. The thumbnails folder is always skipped.
    #[serde(default)]
    pub recursive: bool,
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "bmp".to_string(),
        "gif".to_string(),
        "jpg".to_string(),
        "png".to_string(),
    ]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            recursive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_size")]
    pub width: u32,

    #[serde(default = "default_thumb_size")]
    pub height: u32,

    /// Subfolder created next to the source images.
    #[serde(default = "default_thumb_folder")]
    pub folder_name: String,

    /// Inserted between the file stem and its extension.
    #[serde(default = "default_thumb_infix")]
    pub infix: String,
}

fn default_thumb_size() -> u32 {
    100
}

fn default_thumb_folder() -> String {
    "FaceThumbnails".to_string()
}

fn default_thumb_infix() -> String {
    "_thumb".to_string()
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: default_thumb_size(),
            height: default_thumb_size(),
            folder_name: default_thumb_folder(),
            infix: default_thumb_infix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for a training run after this many seconds.
    #[serde(default = "default_training_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_training_timeout_secs() -> u64 {
    600
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_training_timeout_secs(),
        }
    }
}

impl TrainingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults for a search run; CLI flags override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_true")]
    pub thumbnail: bool,

    #[serde(default)]
    pub caption: bool,

    #[serde(default)]
    pub text: bool,

    #[serde(default)]
    pub metadata: bool,

    #[serde(default = "default_min_age")]
    pub min_age: f64,

    #[serde(default = "default_max_age")]
    pub max_age: f64,
}

fn default_true() -> bool {
    true
}

fn default_min_age() -> f64 {
    10.0
}

fn default_max_age() -> f64 {
    80.0
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            thumbnail: true,
            caption: false,
            text: false,
            metadata: false,
            min_age: default_min_age(),
            max_age: default_max_age(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            face: ServiceConfig::default(),
            vision: ServiceConfig::default(),
            scanner: ScannerConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            training: TrainingConfig::default(),
            search: SearchDefaults::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults if no file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config.with_env_overrides())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config.with_env_overrides())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// API keys from the environment win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("FACEFINDER_FACE_KEY") {
            self.face.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("FACEFINDER_VISION_KEY") {
            self.vision.api_key = Some(key);
        }
        self
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facefinder")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FACEFINDER_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
