#![doc = "Speech synthesis client: bridges the Synthesizer trait to the Azure Cognitive Services text-to-speech REST API."]
//
//! # Speech client
//!
//! [`AzureSpeechClient`] posts SSML to the regional `cognitiveservices/v1`
//! endpoint and streams the returned audio into the caller's sink.
//!
//! - Construct it from a [`SpeechConfig`]; the API key is injected from the
//!   environment by [`crate::load_config`].
//! - `endpoint` overrides the regional URL (private endpoints, local test
//!   servers).
//! - The service caps a single request at roughly ten minutes of audio. The
//!   client does not enforce that; oversize requests come back as
//!   [`SynthesisError::Rejected`].

use async_trait::async_trait;
use futures::StreamExt;
use quick_xml::escape::escape;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::contract::Synthesizer;
use crate::error::SynthesisError;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OUTPUT_FORMAT_HEADER: &str = "X-Microsoft-OutputFormat";
const SSML_CONTENT_TYPE: &str = "application/ssml+xml";

/// Settings for the speech service. `api_key` never comes from the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            voice: default_voice(),
            language: default_language(),
            output_format: default_output_format(),
            api_key: None,
        }
    }
}

fn default_region() -> String {
    "westeurope".to_string()
}

fn default_voice() -> String {
    "en-US-JennyNeural".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_output_format() -> String {
    "audio-16khz-128kbitrate-mono-mp3".to_string()
}

impl SpeechConfig {
    /// The synthesis URL: `endpoint` when set, the regional endpoint otherwise.
    pub fn endpoint_url(&self) -> Result<Url, SynthesisError> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            ),
        };
        Url::parse(&raw).map_err(|e| SynthesisError::InvalidEndpoint {
            endpoint: raw.clone(),
            message: e.to_string(),
        })
    }

    /// File extension matching the configured output format.
    pub fn file_extension(&self) -> &'static str {
        let format = self.output_format.to_ascii_lowercase();
        if format.contains("mp3") {
            "mp3"
        } else if format.starts_with("riff") || format.contains("wav") {
            "wav"
        } else if format.starts_with("ogg") {
            "ogg"
        } else if format.starts_with("webm") {
            "webm"
        } else {
            "bin"
        }
    }
}

/// Wrap plain text in the SSML envelope expected by the service.
pub fn build_ssml(text: &str, voice: &str, language: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{lang}'><voice xml:lang='{lang}' name='{voice}'>{body}</voice></speak>",
        lang = escape(language),
        voice = escape(voice),
        body = escape(text),
    )
}

pub struct AzureSpeechClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    voice: String,
    language: String,
    output_format: String,
    user_agent: String,
}

impl AzureSpeechClient {
    pub fn new(config: &SpeechConfig) -> Result<Self, SynthesisError> {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &SpeechConfig) -> Result<Self, SynthesisError> {
        let api_key = match &config.api_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => {
                error!("Speech API key missing from configuration");
                return Err(SynthesisError::MissingApiKey);
            }
        };
        let endpoint = config.endpoint_url().map_err(|e| {
            error!(error = ?e, "Invalid speech endpoint");
            e
        })?;
        info!(
            endpoint = %endpoint,
            voice = %config.voice,
            output_format = %config.output_format,
            "Initialized AzureSpeechClient"
        );
        Ok(Self {
            client,
            endpoint,
            api_key,
            voice: config.voice.clone(),
            language: config.language.clone(),
            output_format: config.output_format.clone(),
            user_agent: crate::config::default_user_agent(),
        })
    }
}

#[async_trait]
impl Synthesizer for AzureSpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        sink: &mut Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), SynthesisError> {
        let ssml = build_ssml(text, &self.voice, &self.language);
        debug!(
            endpoint = %self.endpoint,
            text_chars = text.chars().count(),
            ssml_bytes = ssml.len(),
            "Sending synthesis request"
        );

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, SSML_CONTENT_TYPE)
            .header(OUTPUT_FORMAT_HEADER, &self.output_format)
            .header(USER_AGENT, &self.user_agent)
            .body(ssml)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Synthesis cancelled before response");
                return Err(SynthesisError::Cancelled);
            }
            res = request => res,
        };

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = ?e, endpoint = %self.endpoint, "Failed to send synthesis request");
                return Err(SynthesisError::Http(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(status = %status, "Synthesis cancelled while reading error body");
                    return Err(SynthesisError::Cancelled);
                }
                body = response.text() => body
                    .unwrap_or_else(|_| String::from("<Failed to decode response body>")),
            };
            error!(
                status = %status,
                endpoint = %self.endpoint,
                "Speech service returned error. Response body: {body}"
            );
            return Err(SynthesisError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(written, "Synthesis cancelled while streaming audio");
                    return Err(SynthesisError::Cancelled);
                }
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    written += chunk.len();
                    sink.extend_from_slice(&chunk);
                }
                Some(Err(e)) => {
                    error!(error = ?e, written, "Failed while streaming synthesized audio");
                    return Err(SynthesisError::Http(e));
                }
                None => break,
            }
        }

        info!(bytes = written, "Synthesized audio");
        Ok(())
    }
}
