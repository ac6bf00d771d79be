use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::convert::DEFAULT_PARAGRAPHS_PER_CHUNK;
use crate::speech::SpeechConfig;

/// Application configuration as read from YAML, before secrets are injected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub convert: ConvertSection,
    #[serde(default)]
    pub download: DownloadSection,
}

impl AppConfig {
    pub fn trace_loaded(&self) {
        info!(
            region = %self.speech.region,
            voice = %self.speech.voice,
            output_format = %self.speech.output_format,
            paragraphs_per_chunk = self.convert.paragraphs_per_chunk,
            "Loaded AppConfig"
        );
        debug!(
            endpoint = ?self.speech.endpoint,
            timeout_secs = self.download.timeout_secs,
            user_agent = %self.download.user_agent,
            api_key_set = self.speech.api_key.is_some(),
            "AppConfig loaded (details)"
        );
    }
}

/// Chunking behaviour of split conversions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertSection {
    #[serde(default = "default_paragraphs_per_chunk")]
    pub paragraphs_per_chunk: usize,
}

impl Default for ConvertSection {
    fn default() -> Self {
        Self {
            paragraphs_per_chunk: default_paragraphs_per_chunk(),
        }
    }
}

fn default_paragraphs_per_chunk() -> usize {
    DEFAULT_PARAGRAPHS_PER_CHUNK
}

/// HTTP settings for fetching source documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_user_agent() -> String {
    "audible-book".to_string()
}
