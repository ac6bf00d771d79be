//! High-level pipeline: orchestrates fetch → parse → synthesize for one document.
//!
//! [`BookToSpeech`] holds the three collaborators (see [`crate::contract`]) and
//! exposes the conversion modes:
//!   - [`BookToSpeech::convert_whole`]: all paragraph text in one synthesis call,
//!     written into a caller-supplied sink
//!   - [`BookToSpeech::convert_split`]: one synthesis call and one [`AudioChunk`]
//!     per group of `paragraphs_per_chunk` paragraphs
//!   - [`BookToSpeech::extract_text`]: the same extraction without synthesis
//!
//! # Error Handling
//! Every failure is logged where it surfaces and returned unchanged as a
//! [`ConvertError`]. Nothing is retried and nothing partial is returned: a
//! failing split conversion drops the chunks it already synthesized.
//!
//! # Concurrency
//! Calls take `&self` and keep no state between invocations. Synthesis calls
//! are issued strictly one after another.

use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::contract::{DocumentNode, DocumentParser, Fetcher, Synthesizer};
use crate::error::{ConvertError, SynthesisError};
use crate::preprocess::TextAccumulator;

/// Paragraphs per synthesis call in split mode.
pub const DEFAULT_PARAGRAPHS_PER_CHUNK: usize = 20;

/// Audio for one flushed group of paragraphs.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Zero-based position in flush order.
    pub index: usize,
    pub paragraphs: usize,
    /// The normalized text this chunk was synthesized from.
    pub text: String,
    pub audio: Vec<u8>,
}

impl AudioChunk {
    /// Lowercase hex SHA-256 of the audio bytes.
    pub fn audio_sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.audio);
        format!("{:x}", hasher.finalize())
    }
}

/// Result of a whole-document conversion; the audio itself went to the caller's sink.
#[derive(Debug, Clone, Serialize)]
pub struct WholeConversion {
    pub conversion_id: Uuid,
    pub paragraphs: usize,
    pub text_chars: usize,
    pub audio_bytes: usize,
    pub ignored_element_types: Vec<String>,
}

/// Result of a split conversion.
#[derive(Debug, Clone)]
pub struct SplitConversion {
    pub conversion_id: Uuid,
    pub chunks: Vec<AudioChunk>,
    pub ignored_element_types: Vec<String>,
}

impl SplitConversion {
    pub fn paragraphs(&self) -> usize {
        self.chunks.iter().map(|c| c.paragraphs).sum()
    }
}

/// Normalized text of a document, without synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    pub conversion_id: Uuid,
    pub text: String,
    pub paragraphs: usize,
    pub ignored_element_types: Vec<String>,
}

/// The book-to-speech pipeline.
pub struct BookToSpeech<F, P, S> {
    fetcher: F,
    parser: P,
    synthesizer: S,
    paragraphs_per_chunk: usize,
}

impl<F, P, S> BookToSpeech<F, P, S>
where
    F: Fetcher,
    P: DocumentParser,
{
    pub fn new(fetcher: F, parser: P, synthesizer: S) -> Self {
        Self {
            fetcher,
            parser,
            synthesizer,
            paragraphs_per_chunk: DEFAULT_PARAGRAPHS_PER_CHUNK,
        }
    }

    /// Override the split size. Values below 1 are treated as 1.
    pub fn with_paragraphs_per_chunk(mut self, paragraphs_per_chunk: usize) -> Self {
        self.paragraphs_per_chunk = paragraphs_per_chunk.max(1);
        self
    }

    pub fn paragraphs_per_chunk(&self) -> usize {
        self.paragraphs_per_chunk
    }

    /// Fetch and parse the document, returning its nodes in reading order.
    async fn load_nodes(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentNode>, ConvertError> {
        let bytes = self.fetcher.fetch(url, cancel).await?;
        debug!(bytes = bytes.len(), "[CONVERT] Fetched document bytes");
        let nodes = self.parser.parse(&bytes)?;
        debug!(nodes = nodes.len(), "[CONVERT] Parsed document nodes");
        Ok(nodes)
    }

    /// Fetch, parse and normalize the document without calling the synthesizer.
    pub async fn extract_text(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<ExtractedText, ConvertError> {
        let conversion_id = Uuid::new_v4();
        let span = info_span!("extract_text", %conversion_id, url = %url);
        async {
            info!("[CONVERT] Starting text extraction");
            let result: Result<ExtractedText, ConvertError> = async {
                let nodes = self.load_nodes(url, cancel).await?;
                let (mut accumulator, ignored) = accumulate(nodes);
                Ok(ExtractedText {
                    conversion_id,
                    paragraphs: accumulator.paragraphs(),
                    text: accumulator.take(),
                    ignored_element_types: ignored,
                })
            }
            .await;
            match &result {
                Ok(extracted) => info!(
                    paragraphs = extracted.paragraphs,
                    ignored = extracted.ignored_element_types.len(),
                    "[CONVERT] Text extraction complete"
                ),
                Err(e) => error!(stage = e.stage(), error = ?e, "[CONVERT][ERROR] {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

impl<F, P, S> BookToSpeech<F, P, S>
where
    F: Fetcher,
    P: DocumentParser,
    S: Synthesizer,
{
    /// Synthesize the accumulated text into a fresh sink and reset the accumulator.
    async fn flush(
        &self,
        accumulator: &mut TextAccumulator,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<AudioChunk, ConvertError> {
        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled.into());
        }
        let paragraphs = accumulator.paragraphs();
        let text = accumulator.take();
        let mut audio = Vec::new();
        info!(
            chunk = index,
            paragraphs,
            text_chars = text.chars().count(),
            "[CONVERT] Flushing chunk to synthesis"
        );
        self.synthesizer.synthesize(&text, &mut audio, cancel).await?;
        info!(chunk = index, bytes = audio.len(), "[CONVERT] Chunk synthesized");
        Ok(AudioChunk {
            index,
            paragraphs,
            text,
            audio,
        })
    }

    /// Convert the whole document with a single synthesis call into `sink`.
    ///
    /// The speech service caps one call at about ten minutes of audio; longer
    /// books belong in [`Self::convert_split`]. A document without paragraphs
    /// leaves the sink untouched and makes no synthesis call.
    pub async fn convert_whole(
        &self,
        url: &Url,
        sink: &mut Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<WholeConversion, ConvertError> {
        let conversion_id = Uuid::new_v4();
        let span = info_span!("convert_whole", %conversion_id, url = %url);
        async {
            info!("[CONVERT] Starting whole-document conversion");
            let result: Result<WholeConversion, ConvertError> = async {
                let nodes = self.load_nodes(url, cancel).await?;
                let (mut accumulator, ignored) = accumulate(nodes);

                let paragraphs = accumulator.paragraphs();
                let text = accumulator.take();
                let before = sink.len();
                if paragraphs > 0 {
                    if cancel.is_cancelled() {
                        return Err(SynthesisError::Cancelled.into());
                    }
                    self.synthesizer.synthesize(&text, sink, cancel).await?;
                } else {
                    info!("[CONVERT] Document has no paragraphs, skipping synthesis");
                }

                Ok(WholeConversion {
                    conversion_id,
                    paragraphs,
                    text_chars: text.chars().count(),
                    audio_bytes: sink.len() - before,
                    ignored_element_types: ignored,
                })
            }
            .await;
            match &result {
                Ok(report) => info!(
                    paragraphs = report.paragraphs,
                    bytes = report.audio_bytes,
                    "[CONVERT] Whole-document conversion complete"
                ),
                Err(e) => error!(stage = e.stage(), error = ?e, "[CONVERT][ERROR] {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Convert the document into one audio chunk per `paragraphs_per_chunk` paragraphs.
    pub async fn convert_split(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<SplitConversion, ConvertError> {
        let conversion_id = Uuid::new_v4();
        let span = info_span!(
            "convert_split",
            %conversion_id,
            url = %url,
            paragraphs_per_chunk = self.paragraphs_per_chunk
        );
        async {
            info!("[CONVERT] Starting split conversion");
            let result: Result<SplitConversion, ConvertError> = async {
                let nodes = self.load_nodes(url, cancel).await?;
                let mut accumulator = TextAccumulator::new();
                let mut ignored = Vec::new();
                let mut chunks = Vec::new();
                for node in nodes {
                    match node {
                        DocumentNode::Paragraph(text) => {
                            accumulator.push_paragraph(&text);
                            if accumulator.paragraphs() >= self.paragraphs_per_chunk {
                                let chunk =
                                    self.flush(&mut accumulator, chunks.len(), cancel).await?;
                                chunks.push(chunk);
                            }
                        }
                        DocumentNode::StructuredBlock | DocumentNode::SectionBoundary => {}
                        DocumentNode::Other(type_name) => ignored.push(type_name),
                    }
                }
                if !accumulator.is_empty() {
                    let chunk = self.flush(&mut accumulator, chunks.len(), cancel).await?;
                    chunks.push(chunk);
                }
                Ok(SplitConversion {
                    conversion_id,
                    chunks,
                    ignored_element_types: ignored,
                })
            }
            .await;
            match &result {
                Ok(conversion) => info!(
                    chunks = conversion.chunks.len(),
                    paragraphs = conversion.paragraphs(),
                    "[CONVERT] Split conversion complete"
                ),
                Err(e) => error!(stage = e.stage(), error = ?e, "[CONVERT][ERROR] {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Append every paragraph to one accumulator and collect the names of ignored elements.
fn accumulate(nodes: Vec<DocumentNode>) -> (TextAccumulator, Vec<String>) {
    let mut accumulator = TextAccumulator::new();
    let mut ignored = Vec::new();
    for node in nodes {
        match node {
            DocumentNode::Paragraph(text) => accumulator.push_paragraph(&text),
            DocumentNode::StructuredBlock | DocumentNode::SectionBoundary => {}
            DocumentNode::Other(type_name) => ignored.push(type_name),
        }
    }
    (accumulator, ignored)
}
