//! Source text with a line index.
//!
//! A [`SourceFile`] pairs the text of a document with its display name and
//! the byte offsets of every line start, so diagnostics can report 1-based
//! line and column positions without rescanning the text.

use std::{fmt, sync::Arc};

use crate::span::Span;

/// A 1-based line and column position. Columns count characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The text of a document together with its name and line index.
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    text: Arc<str>,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    /// Display name of the document (path, URL, hash, or label).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle to the text.
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line and column of a byte offset. Offsets past the end map to the
    /// end of the text.
    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .text
            .get(line_start..offset)
            .map_or(offset - line_start, |prefix| prefix.chars().count());
        Location {
            line: line + 1,
            column: column + 1,
        }
    }

    /// Location of the start of a span.
    pub fn span_location(&self, span: Span) -> Location {
        self.location(span.start())
    }

    /// The text of a 1-based line, without its line break.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map_or(self.text.len(), |next| next - 1);
        self.text
            .get(start..end)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locations() {
        let file = SourceFile::new("doc.yaml", "name: a\ntypes:\n  Point: Text\n");
        assert_eq!(file.location(0), Location { line: 1, column: 1 });
        assert_eq!(file.location(6), Location { line: 1, column: 7 });
        assert_eq!(file.location(8), Location { line: 2, column: 1 });
        assert_eq!(file.location(17), Location { line: 3, column: 3 });
        assert_eq!(file.location(1000).line, 4);
    }

    #[test]
    fn test_columns_count_characters() {
        let file = SourceFile::new("doc.yaml", "é: x");
        assert_eq!(file.location(2), Location { line: 1, column: 2 });
    }

    #[test]
    fn test_line_text() {
        let file = SourceFile::new("doc.yaml", "a: 1\r\nb: 2\n");
        assert_eq!(file.line_text(1), Some("a: 1"));
        assert_eq!(file.line_text(2), Some("b: 2"));
        assert_eq!(file.line_text(3), Some(""));
        assert_eq!(file.line_text(0), None);
        assert_eq!(file.line_text(9), None);
    }
}
