//! Immutable source text.
//!
//! A [`Document`] is loaded once and never mutated in place. Every splice
//! returns a new value, so a half-applied edit can never leak into the
//! caller's copy.

use crate::anchor::Span;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// An owned UTF-8 text plus the handful of size metrics the report needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    text: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("offset {offset} is outside document of length {len}")]
    OutOfRange { offset: usize, len: usize },

    #[error("offset {offset} splits a UTF-8 character")]
    NotCharBoundary { offset: usize },
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Decode raw bytes, rejecting anything that is not valid UTF-8.
    pub fn from_utf8(bytes: Vec<u8>) -> Result<Self, std::string::FromUtf8Error> {
        String::from_utf8(bytes).map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in Unicode scalar values.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Number of `\n` characters.
    pub fn line_count(&self) -> usize {
        self.text.bytes().filter(|b| *b == b'\n').count()
    }

    /// xxh3-64 of the UTF-8 bytes.
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.text.as_bytes())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Return a new document with `fragment` inserted at byte `offset`.
    pub fn insert(&self, offset: usize, fragment: &str) -> Result<Document, DocumentError> {
        self.replace(Span::new(offset, offset), fragment)
    }

    /// Return a new document with `span` replaced by `fragment`.
    pub fn replace(&self, span: Span, fragment: &str) -> Result<Document, DocumentError> {
        self.check_offset(span.start)?;
        self.check_offset(span.end)?;
        if span.start > span.end {
            return Err(DocumentError::OutOfRange {
                offset: span.start,
                len: self.text.len(),
            });
        }

        let mut text = String::with_capacity(self.text.len() - span.len() + fragment.len());
        text.push_str(&self.text[..span.start]);
        text.push_str(fragment);
        text.push_str(&self.text[span.end..]);
        Ok(Document { text })
    }

    fn check_offset(&self, offset: usize) -> Result<(), DocumentError> {
        if offset > self.text.len() {
            return Err(DocumentError::OutOfRange {
                offset,
                len: self.text.len(),
            });
        }
        if !self.text.is_char_boundary(offset) {
            return Err(DocumentError::NotCharBoundary { offset });
        }
        Ok(())
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl AsRef<str> for Document {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
