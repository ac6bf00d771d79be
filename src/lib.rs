#![doc = "audible-book: narrate Word documents through a cloud text-to-speech service."]

//! The crate fetches a `.docx` document from a URL, extracts the text of its
//! body paragraphs and hands that text to a speech-synthesis service, either
//! in one call or in groups of paragraphs.
//!
//! # Layout
//! - [`contract`]: collaborator traits (fetch, parse, synthesize) and mocks
//! - [`convert`]: the `BookToSpeech` pipeline
//! - [`preprocess`], [`download`], [`speech`]: the production collaborators
//! - [`config`], [`load_config`], [`cli`]: configuration and command-line glue

pub mod cli;
pub mod config;
pub mod contract;
pub mod convert;
pub mod download;
pub mod error;
pub mod load_config;
pub mod preprocess;
pub mod speech;

pub use cli::{run, Cli, Commands};
