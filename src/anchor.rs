//! Anchor resolution.
//!
//! An [`Anchor`] names one location in a text by the text found there. It is
//! resolved fresh against whatever the document looks like *now*, which is what
//! keeps a sequence of insertions from invalidating each other's positions.
//!
//! A search window narrows where the needle may match:
//!
//! - raw `start` / `end` byte bounds,
//! - an `after` scope: the search begins where another anchor's match ends,
//! - a `before` scope: the search stops where another anchor's match starts.
//!
//! Scopes nest, so "the first `</div>` after the last `<div className=...`
//! that precedes `Kitchen Explorer</h1>`" is a three-level anchor.
//!
//! Failure is always a tagged [`ResolveError`], never a sentinel offset.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum similarity for a line to be offered as a near-miss suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Half-open byte range `[start, end)` of a resolved match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which match inside the search window an anchor selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Occurrence {
    /// Lowest-offset match.
    #[default]
    First,
    /// Highest-offset match (a bounded reverse find).
    Last,
    /// Exactly one match or a resolution error.
    Unique,
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrence::First => write!(f, "first"),
            Occurrence::Last => write!(f, "last"),
            Occurrence::Unique => write!(f, "unique"),
        }
    }
}

/// The text an anchor looks for.
#[derive(Debug, Clone)]
pub enum Needle {
    Literal(String),
    Regex(Regex),
}

impl Needle {
    /// Non-overlapping matches lying entirely inside `text[lo..hi]`, ascending.
    fn find_all(&self, text: &str, lo: usize, hi: usize) -> Vec<(usize, usize)> {
        match self {
            Needle::Literal(lit) => text[lo..hi]
                .match_indices(lit.as_str())
                .map(|(at, m)| (lo + at, lo + at + m.len()))
                .collect(),
            Needle::Regex(re) => regex_matches(re, text, lo, hi).collect(),
        }
    }

    fn find_first(&self, text: &str, lo: usize, hi: usize) -> Option<(usize, usize)> {
        match self {
            Needle::Literal(lit) => text[lo..hi]
                .find(lit.as_str())
                .map(|at| (lo + at, lo + at + lit.len())),
            Needle::Regex(re) => regex_matches(re, text, lo, hi).next(),
        }
    }

    fn find_last(&self, text: &str, lo: usize, hi: usize) -> Option<(usize, usize)> {
        match self {
            Needle::Literal(lit) => text[lo..hi]
                .rfind(lit.as_str())
                .map(|at| (lo + at, lo + at + lit.len())),
            Needle::Regex(re) => regex_matches(re, text, lo, hi).last(),
        }
    }

    pub fn is_empty_literal(&self) -> bool {
        matches!(self, Needle::Literal(lit) if lit.is_empty())
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Needle::Literal(lit) => Some(lit),
            Needle::Regex(_) => None,
        }
    }
}

impl PartialEq for Needle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Needle::Literal(a), Needle::Literal(b)) => a == b,
            (Needle::Regex(a), Needle::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Needle {}

impl fmt::Display for Needle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Needle::Literal(lit) => write!(f, "{lit:?}"),
            Needle::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Regex matches inside `[lo, hi)`, searched against the whole text so that
/// `^`, `$` and `\b` see the real surrounding characters, not the window edges.
fn regex_matches<'a>(
    re: &'a Regex,
    text: &'a str,
    lo: usize,
    hi: usize,
) -> impl Iterator<Item = (usize, usize)> + 'a {
    let mut next = Some(lo);
    std::iter::from_fn(move || {
        while let Some(at) = next {
            let m = re.find_at(text, at)?;
            if m.start() > hi {
                next = None;
                return None;
            }
            let step = next_char_boundary(text, m.start());
            if m.end() <= hi {
                next = if m.end() > m.start() { Some(m.end()) } else { step };
                return Some((m.start(), m.end()));
            }
            // Overruns the window; a later start may still fit.
            next = step;
        }
        None
    })
}

fn next_char_boundary(text: &str, at: usize) -> Option<usize> {
    text[at..].chars().next().map(|c| at + c.len_utf8())
}

/// A rule that identifies one location in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub needle: Needle,
    pub occurrence: Occurrence,
    /// Lowest byte offset a match may start at.
    pub start: Option<usize>,
    /// Highest byte offset a match may end at.
    pub end: Option<usize>,
    /// Search only after this anchor's match.
    pub after: Option<Box<Anchor>>,
    /// Search only before this anchor's match.
    pub before: Option<Box<Anchor>>,
}

/// Why an anchor could not be pinned to one location.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("{needle} not found in bytes {window_start}..{window_end}")]
    NotFound {
        needle: String,
        window_start: usize,
        window_end: usize,
    },

    #[error("{needle} matched {count} locations, expected exactly 1")]
    Ambiguous { needle: String, count: usize },

    #[error("'{side}' scope unresolved: {source}")]
    Scope {
        side: ScopeSide,
        source: Box<ResolveError>,
    },

    #[error("search window is empty: start {lo} is past end {hi}")]
    EmptyWindow { lo: usize, hi: usize },

    #[error("bound {offset} is invalid for a document of {len} bytes")]
    InvalidBound { offset: usize, len: usize },

    #[error("empty literal needle")]
    EmptyNeedle,
}

impl ResolveError {
    /// The innermost failure, looking through scope wrappers.
    pub fn root_cause(&self) -> &ResolveError {
        match self {
            ResolveError::Scope { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSide {
    After,
    Before,
}

impl fmt::Display for ScopeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSide::After => write!(f, "after"),
            ScopeSide::Before => write!(f, "before"),
        }
    }
}

impl Anchor {
    /// First occurrence of a literal string anywhere in the document.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::with_needle(Needle::Literal(text.into()))
    }

    /// First match of a regular expression.
    pub fn regex(re: Regex) -> Self {
        Self::with_needle(Needle::Regex(re))
    }

    pub fn with_needle(needle: Needle) -> Self {
        Self {
            needle,
            occurrence: Occurrence::First,
            start: None,
            end: None,
            after: None,
            before: None,
        }
    }

    pub fn occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    pub fn last(self) -> Self {
        self.occurrence(Occurrence::Last)
    }

    pub fn unique(self) -> Self {
        self.occurrence(Occurrence::Unique)
    }

    pub fn starting_at(mut self, offset: usize) -> Self {
        self.start = Some(offset);
        self
    }

    pub fn ending_at(mut self, offset: usize) -> Self {
        self.end = Some(offset);
        self
    }

    pub fn after(mut self, scope: Anchor) -> Self {
        self.after = Some(Box::new(scope));
        self
    }

    pub fn before(mut self, scope: Anchor) -> Self {
        self.before = Some(Box::new(scope));
        self
    }

    /// Compute the `[lo, hi)` byte window this anchor searches in `text`.
    pub fn window(&self, text: &str) -> Result<(usize, usize), ResolveError> {
        let len = text.len();
        let mut lo = self.start.unwrap_or(0);
        let mut hi = self.end.map_or(len, |end| end.min(len));

        if lo > len {
            return Err(ResolveError::InvalidBound { offset: lo, len });
        }
        for offset in [lo, hi] {
            if !text.is_char_boundary(offset) {
                return Err(ResolveError::InvalidBound { offset, len });
            }
        }

        if let Some(scope) = &self.after {
            let span = scope.resolve(text).map_err(|e| ResolveError::Scope {
                side: ScopeSide::After,
                source: Box::new(e),
            })?;
            lo = lo.max(span.end);
        }
        if let Some(scope) = &self.before {
            let span = scope.resolve(text).map_err(|e| ResolveError::Scope {
                side: ScopeSide::Before,
                source: Box::new(e),
            })?;
            hi = hi.min(span.start);
        }

        if lo > hi {
            return Err(ResolveError::EmptyWindow { lo, hi });
        }
        Ok((lo, hi))
    }

    /// Resolve this anchor against `text`.
    pub fn resolve(&self, text: &str) -> Result<Span, ResolveError> {
        if self.needle.is_empty_literal() {
            return Err(ResolveError::EmptyNeedle);
        }

        let (lo, hi) = self.window(text)?;

        let found = match self.occurrence {
            Occurrence::First => self.needle.find_first(text, lo, hi),
            Occurrence::Last => self.needle.find_last(text, lo, hi),
            Occurrence::Unique => {
                let matches = self.needle.find_all(text, lo, hi);
                if matches.len() > 1 {
                    return Err(ResolveError::Ambiguous {
                        needle: self.needle.to_string(),
                        count: matches.len(),
                    });
                }
                matches.into_iter().next()
            }
        };

        let (start, end) = found.ok_or_else(|| ResolveError::NotFound {
            needle: self.needle.to_string(),
            window_start: lo,
            window_end: hi,
        })?;

        let span = Span::new(start, end);
        tracing::trace!(needle = %self.needle, ?span, "anchor resolved");
        Ok(span)
    }

    /// Best near-miss line for an unresolved literal needle, if any is close.
    ///
    /// Only single-line literals are considered; the comparison runs over the
    /// trimmed lines of the anchor's window (or the whole text when the window
    /// itself cannot be computed).
    pub fn suggest(&self, text: &str) -> Option<String> {
        let literal = self.needle.as_literal()?.trim();
        if literal.is_empty() || literal.contains('\n') {
            return None;
        }

        let (lo, hi) = self.window(text).unwrap_or((0, text.len()));
        text[lo..hi]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| (strsim::normalized_levenshtein(literal, line), line))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, line)| line.to_string())
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.occurrence, self.needle)?;
        if let Some(start) = self.start {
            write!(f, " from {start}")?;
        }
        if let Some(end) = self.end {
            write!(f, " until {end}")?;
        }
        if let Some(scope) = &self.after {
            write!(f, " after ({scope})")?;
        }
        if let Some(scope) = &self.before {
            write!(f, " before ({scope})")?;
        }
        Ok(())
    }
}
