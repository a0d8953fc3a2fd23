use async_trait::async_trait;
use serde::Deserialize;
use std::io::Read;

use super::{agent, http_error, run_blocking, TextRegion, VisionService};
use crate::config::ServiceConfig;
use crate::error::{FinderError, Result};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Client for the Computer Vision REST API.
#[derive(Clone)]
pub struct VisionClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    description: Description,
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    captions: Vec<Caption>,
}

#[derive(Debug, Deserialize)]
struct Caption {
    text: String,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    regions: Vec<OcrRegion>,
}

#[derive(Debug, Deserialize)]
struct OcrRegion {
    #[serde(default)]
    lines: Vec<OcrLine>,
}

#[derive(Debug, Deserialize)]
struct OcrLine {
    #[serde(default)]
    words: Vec<OcrWord>,
}

#[derive(Debug, Deserialize)]
struct OcrWord {
    text: String,
}

impl OcrResponse {
    fn into_regions(self) -> Vec<TextRegion> {
        self.regions
            .into_iter()
            .map(|region| TextRegion {
                lines: region
                    .lines
                    .into_iter()
                    .map(|line| line.words.into_iter().map(|w| w.text).collect())
                    .collect(),
            })
            .collect()
    }
}

impl VisionClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: std::time::Duration) -> Self {
        Self {
            agent: agent(timeout),
            base_url: format!("{}/vision/v3.2", endpoint.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let key = config.require_key("vision")?;
        Ok(Self::new(&config.endpoint, key, config.timeout()))
    }

    fn post(&self, path: &str) -> ureq::Request {
        self.agent
            .post(&format!("{}/{}", self.base_url, path))
            .set(KEY_HEADER, &self.api_key)
            .set("Content-Type", "application/octet-stream")
    }
}

#[async_trait]
impl VisionService for VisionClient {
    async fn thumbnail(&self, width: u32, height: u32, image: &[u8]) -> Result<Vec<u8>> {
        let client = self.clone();
        let image = image.to_vec();
        run_blocking("thumbnail", move || {
            let response = client
                .post("generateThumbnail")
                .query("width", &width.to_string())
                .query("height", &height.to_string())
                .query("smartCropping", "true")
                .send_bytes(&image)
                .map_err(|e| http_error("thumbnail", e))?;

            let mut bytes = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut bytes)
                .map_err(|e| FinderError::service("thumbnail", e))?;
            Ok(bytes)
        })
        .await
    }

    async fn describe(&self, image: &[u8]) -> Result<Vec<String>> {
        let client = self.clone();
        let image = image.to_vec();
        run_blocking("describe", move || {
            let described: DescribeResponse = client
                .post("describe")
                .query("maxCandidates", "1")
                .send_bytes(&image)
                .map_err(|e| http_error("describe", e))?
                .into_json()
                .map_err(|e| FinderError::service("describe", e))?;

            Ok(described
                .description
                .captions
                .into_iter()
                .map(|c| c.text)
                .collect())
        })
        .await
    }

    async fn recognize_text(&self, image: &[u8]) -> Result<Vec<TextRegion>> {
        let client = self.clone();
        let image = image.to_vec();
        run_blocking("recognize_text", move || {
            let ocr: OcrResponse = client
                .post("ocr")
                .query("language", "unk")
                .query("detectOrientation", "true")
                .send_bytes(&image)
                .map_err(|e| http_error("recognize_text", e))?
                .into_json()
                .map_err(|e| FinderError::service("recognize_text", e))?;

            Ok(ocr.into_regions())
        })
        .await
    }
}
