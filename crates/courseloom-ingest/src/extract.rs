//! Text extraction keyed by mime type.
//!
//! Extractors are registered up front in an `ExtractorRegistry`; the host
//! application injects parsers for binary formats (PDF, DOCX) it supports.
//! Unknown mime types resolve to nothing and the caller fails explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use courseloom_core::{Error, Result};

/// Extracts plain text from raw file bytes of a known mime type.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String>;
}

/// Mime type → extractor table, resolved at construction time.
#[derive(Default)]
pub struct ExtractorRegistry {
    by_mime: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in text handlers: plain text and Markdown.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let plain = Arc::new(PlainTextExtractor);
        for mime in ["text/plain", "text/markdown", "text/x-markdown"] {
            registry.register(mime, plain.clone());
        }
        registry
    }

    pub fn register(&mut self, mime_type: &str, extractor: Arc<dyn TextExtractor>) {
        self.by_mime
            .insert(normalize_mime(mime_type), extractor);
    }

    pub fn supports(&self, mime_type: &str) -> bool {
        self.by_mime.contains_key(&normalize_mime(mime_type))
    }

    /// Look up the extractor for a mime type, if one is registered.
    pub fn get(&self, mime_type: &str) -> Option<&Arc<dyn TextExtractor>> {
        self.by_mime.get(&normalize_mime(mime_type))
    }
}

/// Lowercase and strip parameters: `Text/Plain; charset=utf-8` → `text/plain`.
fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_lowercase()
}

/// UTF-8 text extractor for plain text and Markdown uploads.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        let content = String::from_utf8_lossy(bytes).into_owned();
        if looks_binary(&content) {
            return Err(Error::Extraction(format!(
                "content does not look like text for mime type {mime_type}"
            )));
        }
        Ok(content)
    }
}

/// Heuristic from file sniffing: too many control characters means a binary
/// file mislabeled with a text mime type.
fn looks_binary(content: &str) -> bool {
    if content.is_empty() {
        return false;
    }
    let control = content
        .chars()
        .filter(|c| c.is_control() && *c != '\n' && *c != '\r' && *c != '\t')
        .count();
    control > content.chars().count() / 10
}
