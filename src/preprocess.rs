//! Turning document bytes into speakable text.
//!
//! [`DocxParser`] opens a WordprocessingML container and classifies the
//! direct children of `w:body` into [`DocumentNode`]s. [`normalize_paragraph`]
//! and [`TextAccumulator`] implement the text rules shared by every
//! conversion mode.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, error, info};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::contract::{DocumentNode, DocumentParser};
use crate::error::ParseError;

const PACKAGE_RELS_PART: &str = "_rels/.rels";
const DEFAULT_MAIN_PART: &str = "word/document.xml";
const OFFICE_DOCUMENT_REL_SUFFIX: &str = "/officeDocument";

/// Largest decompressed part the parser will read.
pub const MAX_PART_BYTES: u64 = 128 * 1024 * 1024;

/// Replace every `.` with a single space; leave everything else untouched.
pub fn normalize_paragraph(text: &str) -> String {
    text.replace('.', " ")
}

/// Growable text buffer plus the number of paragraphs added since the last flush.
#[derive(Debug, Default)]
pub struct TextAccumulator {
    buffer: String,
    paragraphs: usize,
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the normalized paragraph followed by a line terminator.
    pub fn push_paragraph(&mut self, text: &str) {
        self.buffer.push_str(&normalize_paragraph(text));
        self.buffer.push('\n');
        self.paragraphs += 1;
    }

    pub fn paragraphs(&self) -> usize {
        self.paragraphs
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs == 0
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Hand out the accumulated text and reset the buffer and counter.
    pub fn take(&mut self) -> String {
        self.paragraphs = 0;
        std::mem::take(&mut self.buffer)
    }
}

/// DocumentParser for `.docx` (Office Open XML WordprocessingML) containers.
///
/// Part sizes declared in the container are not trusted: every part is read
/// through a cap of `max_part_bytes` decompressed bytes.
#[derive(Debug, Clone, Copy)]
pub struct DocxParser {
    max_part_bytes: u64,
}

impl Default for DocxParser {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_PART_BYTES,
        }
    }
}

impl DocxParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_part_bytes(mut self, max_part_bytes: u64) -> Self {
        self.max_part_bytes = max_part_bytes;
        self
    }
}

impl DocumentParser for DocxParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<DocumentNode>, ParseError> {
        debug!(bytes = bytes.len(), "Opening document container");
        // The archive lives only inside this call; dropping it closes the container.
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            error!(error = ?e, "Failed to open document container");
            ParseError::Archive(e)
        })?;

        let main_part = resolve_main_part(&mut archive, self.max_part_bytes)?;
        let xml = read_part(&mut archive, &main_part, self.max_part_bytes)?
            .ok_or_else(|| {
                error!(part = %main_part, "Main document part not found in container");
                ParseError::MissingPart(main_part.clone())
            })?;

        let nodes = classify_body(&main_part, &xml)?;

        let ignored: BTreeSet<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                DocumentNode::Other(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        if !ignored.is_empty() {
            debug!(element_types = ?ignored, "Body contains elements that will not be spoken");
        }
        info!(
            part = %main_part,
            nodes = nodes.len(),
            "Parsed document body"
        );
        Ok(nodes)
    }
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, ParseError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            error!(error = ?e, part = name, "Failed to open document part");
            return Err(ParseError::Archive(e));
        }
    };
    let mut buf = Vec::new();
    file.by_ref().take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        error!(
            part = name,
            limit,
            declared = file.size(),
            "Document part exceeds size limit"
        );
        return Err(ParseError::PartTooLarge {
            part: name.to_string(),
            limit,
        });
    }
    Ok(Some(buf))
}

/// Locate the main document part through the package relationships.
fn resolve_main_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    limit: u64,
) -> Result<String, ParseError> {
    let Some(rels) = read_part(archive, PACKAGE_RELS_PART, limit)? else {
        debug!(
            fallback = DEFAULT_MAIN_PART,
            "No package relationships, using default main part"
        );
        return Ok(DEFAULT_MAIN_PART.to_string());
    };

    let mut reader = Reader::from_reader(rels.as_slice());
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"Relationship" {
                    continue;
                }
                let rel_type = attribute(&e, b"Type", PACKAGE_RELS_PART)?;
                if rel_type.is_some_and(|t| t.ends_with(OFFICE_DOCUMENT_REL_SUFFIX)) {
                    if let Some(target) = attribute(&e, b"Target", PACKAGE_RELS_PART)? {
                        let part = target.trim_start_matches('/').to_string();
                        debug!(part = %part, "Resolved main document part");
                        return Ok(part);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error(PACKAGE_RELS_PART, e)),
        }
    }

    debug!(
        fallback = DEFAULT_MAIN_PART,
        "No officeDocument relationship, using default main part"
    );
    Ok(DEFAULT_MAIN_PART.to_string())
}

fn attribute(e: &BytesStart<'_>, key: &[u8], part: &str) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Xml {
            part: part.to_string(),
            message: err.to_string(),
        })?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|err| xml_error(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn xml_error(part: &str, e: quick_xml::Error) -> ParseError {
    error!(error = ?e, part, "Malformed XML in document part");
    ParseError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    }
}

fn is_body_level(stack: &[Vec<u8>]) -> bool {
    stack.len() == 2 && stack[0] == b"document" && stack[1] == b"body"
}

fn classify(e: &BytesStart<'_>) -> DocumentNode {
    match e.local_name().as_ref() {
        b"p" => DocumentNode::Paragraph(String::new()),
        b"sdt" => DocumentNode::StructuredBlock,
        b"sectPr" => DocumentNode::SectionBoundary,
        _ => DocumentNode::Other(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
    }
}

/// Walk the main part and classify every direct child of `w:body`.
///
/// Paragraph text is the concatenation of every `w:t` run beneath the
/// paragraph, at any depth.
fn classify_body(part: &str, xml: &[u8]) -> Result<Vec<DocumentNode>, ParseError> {
    let mut reader = Reader::from_reader(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut nodes = Vec::new();
    let mut paragraph: Option<String> = None;
    let mut saw_body = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if is_body_level(&stack) {
                    match classify(&e) {
                        DocumentNode::Paragraph(_) => paragraph = Some(String::new()),
                        node => nodes.push(node),
                    }
                }
                stack.push(e.local_name().as_ref().to_vec());
                if stack.len() == 2 && is_body_level(&stack) {
                    saw_body = true;
                }
            }
            Ok(Event::Empty(e)) => {
                if is_body_level(&stack) {
                    nodes.push(classify(&e));
                } else if stack.len() == 1
                    && stack[0] == b"document"
                    && e.local_name().as_ref() == b"body"
                {
                    saw_body = true;
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(text) = paragraph.as_mut() {
                    if stack.last().is_some_and(|n| n == b"t") {
                        let unescaped = t.unescape().map_err(|e| xml_error(part, e))?;
                        text.push_str(&unescaped);
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(text) = paragraph.as_mut() {
                    if stack.last().is_some_and(|n| n == b"t") {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
                if is_body_level(&stack) {
                    if let Some(text) = paragraph.take() {
                        nodes.push(DocumentNode::Paragraph(text));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error(part, e)),
        }
    }

    if !saw_body {
        error!(part, "Main document part has no body");
        return Err(ParseError::MissingBody);
    }
    Ok(nodes)
}
