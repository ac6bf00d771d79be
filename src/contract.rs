#![allow(unused)]

//! # contract: collaborator interfaces for the book-to-speech pipeline
//!
//! This module defines the three seams the pipeline talks through:
//! fetching document bytes ([`Fetcher`]), turning bytes into an ordered list
//! of body nodes ([`DocumentParser`]) and turning text into audio
//! ([`Synthesizer`]).
//!
//! ## Interface & Extensibility
//! - Implement a trait to plug in another transport, container reader or
//!   speech provider; the pipeline only depends on these signatures.
//! - Each trait reports failures through its own error enum from
//!   [`crate::error`], so mocks and real clients fail in the same shape.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`; with the default
//!   `test-export-mocks` feature the generated `MockFetcher`,
//!   `MockDocumentParser` and `MockSynthesizer` are exported for
//!   integration tests.

use async_trait::async_trait;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use mockall::{automock, predicate::*};

use crate::error::{FetchError, ParseError, SynthesisError};

/// One top-level element of the document body, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentNode {
    /// Narrative paragraph with its plain text.
    Paragraph(String),
    /// Structured-content placeholder (form content); never spoken.
    StructuredBlock,
    /// Section-properties boundary; never spoken.
    SectionBoundary,
    /// Any other body element, by qualified element name. Recorded, not spoken.
    Other(String),
}

/// Downloads the raw bytes behind a URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the resource. Must give up with [`FetchError::Cancelled`] once
    /// `cancel` fires.
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError>;
}

/// Parses document bytes into the ordered top-level body nodes.
///
/// Any handle on the underlying container must be released before `parse`
/// returns, on success and on error alike.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DocumentParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<DocumentNode>, ParseError>;
}

/// Synthesizes speech for a text and writes the audio into a sink.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Append the audio for `text` to `sink`.
    ///
    /// On error the sink may hold partial audio and must be treated as unusable.
    async fn synthesize(
        &self,
        text: &str,
        sink: &mut Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), SynthesisError>;
}
