//! Document content I/O.
//!
//! A document file is plain text. Later format versions may carry an
//! embedded metadata header: a single first line of the form
//! `<!-- draftguard: { ... } -->`. The header is stripped on read and
//! re-inserted verbatim on write, so stripping and re-inserting round-trips
//! byte-for-byte even if the embedded JSON carries fields this version does
//! not understand.

use std::path::Path;

use tokio::fs;
use tracing::instrument;

use crate::storage::{Error, Result};

const HEADER_PREFIX: &str = "<!-- draftguard:";
const HEADER_SUFFIX: &str = "-->";

/// An embedded metadata header, kept verbatim for lossless re-insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHeader {
    /// The complete original header line, exactly as read.
    raw_line: String,
    /// The parsed payload. Unknown fields are preserved via `raw_line`.
    pub value: serde_json::Value,
}

/// Document content split into optional header and body.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContent {
    pub header: Option<DocumentHeader>,
    pub body: String,
}

impl DocumentContent {
    pub fn from_body(body: impl Into<String>) -> Self {
        DocumentContent { header: None, body: body.into() }
    }

    /// Splits raw file content. A first line that is a well-formed header
    /// comment with a JSON payload becomes the header; anything else leaves
    /// the content untouched as body.
    pub fn parse(raw: &str) -> Self {
        let Some((first_line, rest)) = raw.split_once('\n') else {
            return DocumentContent::from_body(raw);
        };
        let trimmed = first_line.trim_end_matches('\r');
        let payload = trimmed
            .strip_prefix(HEADER_PREFIX)
            .and_then(|s| s.strip_suffix(HEADER_SUFFIX));
        match payload.and_then(|p| serde_json::from_str(p).ok()) {
            Some(value) => DocumentContent {
                header: Some(DocumentHeader { raw_line: first_line.to_string(), value }),
                body: rest.to_string(),
            },
            None => DocumentContent::from_body(raw),
        }
    }

    /// Re-assembles the raw file content, re-inserting the header verbatim.
    pub fn to_raw(&self) -> String {
        match &self.header {
            Some(header) => format!("{}\n{}", header.raw_line, self.body),
            None => self.body.clone(),
        }
    }

    /// Paragraphs are non-empty lines of the body; comment anchors index
    /// into this sequence.
    pub fn paragraph_count(&self) -> usize {
        self.body.lines().filter(|l| !l.trim().is_empty()).count()
    }
}

/// Reads and splits a document file.
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn read(path: &Path) -> Result<DocumentContent> {
    let raw = fs::read_to_string(path).await.map_err(|e| Error::from_io(e, path))?;
    Ok(DocumentContent::parse(&raw))
}

/// Writes a document file, preserving any header.
#[instrument(skip(path, content), fields(path = %path.display()))]
pub async fn write(path: &Path, content: &DocumentContent) -> Result<()> {
    fs::write(path, content.to_raw()).await.map_err(|e| Error::from_io(e, path))
}
