///
/// This module implements the CLI interface for audible-book: command parsing,
/// configuration loading, wiring the pipeline collaborators and writing the
/// resulting audio files.
///
/// All conversion logic lives in [`crate::convert`]; this module is glue.
///
/// ## Commands
/// - `extract`: print the normalized paragraph text of a document
/// - `convert`: narrate the whole document into one audio file
/// - `convert-split`: narrate the document into one audio file per paragraph group
///
/// ## How To Use
/// - From the shell: `audible-book --help`.
/// - From tests: call [`run`] with a constructed [`Cli`].
use crate::config::AppConfig;
use crate::convert::{BookToSpeech, SplitConversion, WholeConversion};
use crate::download::HttpFetcher;
use crate::load_config::{default_config, load_config};
use crate::preprocess::DocxParser;
use crate::speech::AzureSpeechClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// CLI for audible-book: narrate Word documents with a cloud text-to-speech service.
#[derive(Parser)]
#[clap(
    name = "audible-book",
    version,
    about = "Fetch a .docx book from a URL and turn its paragraphs into speech"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the normalized paragraph text of the document, without synthesis
    Extract {
        /// URL of the .docx document
        #[clap(long)]
        url: String,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Narrate the whole document with a single synthesis call (about ten minutes of audio at most)
    Convert {
        /// URL of the .docx document
        #[clap(long)]
        url: String,
        /// Audio file to write
        #[clap(long)]
        output: PathBuf,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Narrate the document as one audio file per group of paragraphs
    ConvertSplit {
        /// URL of the .docx document
        #[clap(long)]
        url: String,
        /// Directory that receives chunk_001.<ext>, chunk_002.<ext>, ...
        #[clap(long)]
        output_dir: PathBuf,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct ChunkReport {
    index: usize,
    file: PathBuf,
    paragraphs: usize,
    text_chars: usize,
    audio_bytes: usize,
    audio_sha256: String,
}

#[derive(Debug, Serialize)]
struct SplitReport {
    conversion_id: Uuid,
    paragraphs: usize,
    chunks: Vec<ChunkReport>,
    ignored_element_types: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WholeReport<'a> {
    file: &'a Path,
    #[serde(flatten)]
    conversion: &'a WholeConversion,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling conversion");
                cancel.cancel();
            }
        })
    };

    let result = dispatch(cli.command, &cancel).await;
    ctrl_c.abort();

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

async fn dispatch(command: Commands, cancel: &CancellationToken) -> Result<()> {
    match command {
        Commands::Extract { url, config } => {
            let url = parse_url(&url)?;
            let config = resolve_config(config)?;
            let fetcher =
                HttpFetcher::from_config(&config.download).context("Failed to construct downloader")?;
            let pipeline = BookToSpeech::new(fetcher, DocxParser::new(), ());
            let extracted = pipeline.extract_text(&url, cancel).await?;
            tracing::info!(
                command = "extract",
                paragraphs = extracted.paragraphs,
                ignored_element_types = ?extracted.ignored_element_types,
                "Extraction complete"
            );
            print!("{}", extracted.text);
            Ok(())
        }
        Commands::Convert {
            url,
            output,
            config,
        } => {
            let url = parse_url(&url)?;
            let config = resolve_config(config)?;
            let pipeline = build_pipeline(&config)?;
            tracing::info!(command = "convert", url = %url, output = %output.display(), "Starting whole-document conversion");

            let mut audio = Vec::new();
            let conversion = pipeline.convert_whole(&url, &mut audio, cancel).await?;
            write_atomically(&output, &audio)?;

            let report = WholeReport {
                file: &output,
                conversion: &conversion,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::ConvertSplit {
            url,
            output_dir,
            config,
        } => {
            let url = parse_url(&url)?;
            let config = resolve_config(config)?;
            let pipeline = build_pipeline(&config)?;
            tracing::info!(command = "convert-split", url = %url, output_dir = %output_dir.display(), "Starting split conversion");

            let conversion = pipeline.convert_split(&url, cancel).await?;
            let report = write_chunks(&output_dir, config.speech.file_extension(), &conversion)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("Invalid document URL: {raw}"))
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(default_config()),
    }
}

fn build_pipeline(
    config: &AppConfig,
) -> Result<BookToSpeech<HttpFetcher, DocxParser, AzureSpeechClient>> {
    let fetcher =
        HttpFetcher::from_config(&config.download).context("Failed to construct downloader")?;
    let synthesizer =
        AzureSpeechClient::new(&config.speech).context("Failed to construct speech client")?;
    Ok(BookToSpeech::new(fetcher, DocxParser::new(), synthesizer)
        .with_paragraphs_per_chunk(config.convert.paragraphs_per_chunk))
}

/// Write through a temp file in the target directory so a failed write never
/// leaves a truncated audio file behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Wrote audio file");
    Ok(())
}

fn write_chunks(
    output_dir: &Path,
    extension: &str,
    conversion: &SplitConversion,
) -> Result<SplitReport> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut chunks = Vec::with_capacity(conversion.chunks.len());
    for chunk in &conversion.chunks {
        let file = output_dir.join(format!("chunk_{:03}.{extension}", chunk.index + 1));
        write_atomically(&file, &chunk.audio)?;
        chunks.push(ChunkReport {
            index: chunk.index,
            file,
            paragraphs: chunk.paragraphs,
            text_chars: chunk.text.chars().count(),
            audio_bytes: chunk.audio.len(),
            audio_sha256: chunk.audio_sha256(),
        });
    }

    Ok(SplitReport {
        conversion_id: conversion.conversion_id,
        paragraphs: conversion.paragraphs(),
        chunks,
        ignored_element_types: conversion.ignored_element_types.clone(),
    })
}
