// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Source location tracking.
//!
//! Every syntax node can carry a [`Span`] indicating its position in the
//! source file. Spans are byte offsets into the original text; the
//! [`SourceText`] collaborator owns that text and answers line/column
//! questions for rendering and for span reconstruction.

use std::ops::Range;

/// A span of source code, represented as a byte offset range.
///
/// # Examples
///
/// ```
/// use lumen_core::source::Span;
///
/// let span = Span::new(0, 10);
/// assert_eq!(span.start(), 0);
/// assert_eq!(span.end(), 10);
/// assert_eq!(span.len(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    start: u32,
    end: u32,
}

impl Span {
    /// Creates a new span from start and end byte offsets.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Returns the start byte offset.
    #[must_use]
    pub const fn start(self) -> u32 {
        self.start
    }

    /// Returns the end byte offset (exclusive).
    #[must_use]
    pub const fn end(self) -> u32 {
        self.end
    }

    /// Returns the length of the span in bytes.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end - self.start
    }

    /// Returns true if the span is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Returns true if `other` is fully contained within `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Creates a span that covers both `self` and `other`.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        let start = if self.start < other.start {
            self.start
        } else {
            other.start
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Self { start, end }
    }

    /// Converts to a `Range<usize>` for indexing into source text.
    #[must_use]
    pub const fn as_range(self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

impl From<Range<u32>> for Span {
    fn from(range: Range<u32>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl From<Range<usize>> for Span {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "source files over 4GB are not supported"
    )]
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start as u32, range.end as u32)
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.as_range()
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start as usize, span.len() as usize).into()
    }
}

/// The source text under analysis, with a line index built once.
///
/// `SourceText` is a read-only collaborator: the analyzer consults it for
/// slicing and line/column arithmetic but never mutates it.
#[derive(Debug, Clone)]
pub struct SourceText {
    text: String,
    /// Byte offset of the start of each line, in ascending order.
    line_starts: Vec<u32>,
}

impl SourceText {
    /// Wraps source text, indexing line starts.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0u32];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(u32::try_from(idx + 1).unwrap_or(u32::MAX));
            }
        }
        Self { text, line_starts }
    }

    /// The full source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the source in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns true if the source is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of lines (an empty source has one empty line).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The text covered by `span`, if the span is in bounds on character
    /// boundaries.
    #[must_use]
    pub fn slice(&self, span: Span) -> Option<&str> {
        self.text.get(span.as_range())
    }

    /// One-based line and column of a byte offset.
    ///
    /// Columns are one-based byte columns within the line.
    #[must_use]
    pub fn line_col(&self, offset: u32) -> (usize, usize) {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        // partition_point returns the count of line starts at or before
        // offset, which is exactly the one-based line number.
        let line_start = self.line_starts[line - 1];
        (line, (offset - line_start) as usize + 1)
    }

    /// Byte offset of the start of a one-based line number.
    #[must_use]
    pub fn offset_of_line(&self, line: usize) -> Option<u32> {
        if line == 0 {
            return None;
        }
        self.line_starts.get(line - 1).copied()
    }

    /// The text of a one-based line, without its terminating newline.
    #[must_use]
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = self.offset_of_line(line)? as usize;
        let end = match self.line_starts.get(line) {
            Some(&next) => (next as usize).saturating_sub(1),
            None => self.text.len(),
        };
        self.text.get(start..end)
    }
}
