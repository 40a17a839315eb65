//! Diagnostics: one problem found in a document, with where and why.
//!
//! A [`Diagnostic`] is raised by every stage, from the lexer to the linker,
//! and carries the [`SourceFile`] its spans index into. Diagnostics from
//! imported documents therefore keep pointing at the right text after they
//! are gathered under the root.

use std::{fmt, sync::Arc};

use crate::{
    error::error_code::ErrorCode,
    source::{Location, SourceFile},
    span::Span,
};

/// Whether a diagnostic stops the document from being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The document or resolution is unusable.
    Error,
    /// Something was ignored; the result is still usable.
    Warning,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        *self == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        *self == Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// A message attached to a span.
///
/// The primary label marks the offending text (`^^^` when rendered);
/// secondary labels add context such as where a conflicting import was
/// first loaded.
#[derive(Debug, Clone)]
pub struct Label {
    span: Span,
    message: String,
    primary: bool,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: true,
        }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            primary: false,
            ..Self::primary(span, message)
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_secondary(&self) -> bool {
        !self.primary
    }
}

/// An error or warning about a document.
///
/// Built with the `with_*` methods:
///
/// ```
/// use blue_parser::{Diagnostic, ErrorCode, Span};
///
/// let diag = Diagnostic::error("unresolved reference `Adress`")
///     .with_code(ErrorCode::E200)
///     .with_label(Span::new(24..30), "no type named `Adress`")
///     .with_help("did you mean `Address`?");
/// assert_eq!(diag.to_string(), "error[E200]: unresolved reference `Adress`");
/// ```
///
/// Rendered by the CLI as:
///
/// ```text
/// error[E200]: unresolved reference `Adress`
///   --> users.yaml:4:13
///    |
///  4 |       home: Adress
///    |             ^^^^^^ no type named `Adress`
///    |
///    = help: did you mean `Address`?
/// ```
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    code: Option<ErrorCode>,
    message: String,
    labels: Vec<Label>,
    help: Option<String>,
    source: Option<Arc<SourceFile>>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            help: None,
            source: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Labels in the order they were added.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The document the labels point into.
    pub fn source(&self) -> Option<&Arc<SourceFile>> {
        self.source.as_ref()
    }

    pub fn primary_span(&self) -> Option<Span> {
        self.labels
            .iter()
            .find(|label| label.is_primary())
            .map(Label::span)
    }

    /// 1-based line and column of the primary label, once a source is
    /// attached.
    pub fn location(&self) -> Option<Location> {
        let span = self.primary_span()?;
        self.source
            .as_ref()
            .map(|source| source.span_location(span))
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attach the document the spans index into. The first source wins, so
    /// an importer re-wrapping a child's diagnostics cannot repoint them.
    pub fn with_source(mut self, source: Arc<SourceFile>) -> Self {
        self.source.get_or_insert(source);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.severity.to_string())?;
        if let Some(code) = self.code {
            write!(f, "[{code}]")?;
        }
        write!(f, ": {}", self.message)?;

        let Some(source) = &self.source else {
            return Ok(());
        };
        match self.location() {
            Some(location) => write!(f, " (at {}:{location})", source.name()),
            None => write!(f, " (in {})", source.name()),
        }
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> Arc<SourceFile> {
        Arc::new(SourceFile::new("shapes.yaml", text))
    }

    #[test]
    fn test_severity() {
        assert!(Severity::Error.is_error());
        assert!(!Severity::Error.is_warning());
        assert!(Severity::Warning.is_warning());
        assert_eq!(Severity::Warning.to_string(), "warning");
    }

    #[test]
    fn test_labels_keep_order_and_kind() {
        let diag = Diagnostic::error("import conflict: `geo`")
            .with_code(ErrorCode::E201)
            .with_secondary_label(Span::new(0..4), "first loaded here")
            .with_label(Span::new(10..20), "different content here");

        let labels = diag.labels();
        assert_eq!(labels.len(), 2);
        assert!(labels[0].is_secondary());
        assert!(labels[1].is_primary());
        assert_eq!(labels[1].message(), "different content here");
        assert_eq!(diag.primary_span(), Some(Span::new(10..20)));
    }

    #[test]
    fn test_display() {
        let warning = Diagnostic::warning("unknown top-level key `tpyes`").with_code(ErrorCode::E101);
        assert_eq!(
            warning.to_string(),
            "warning[E101]: unknown top-level key `tpyes`"
        );
        assert_eq!(
            Diagnostic::error("bad").with_help("fix it").to_string(),
            "error: bad"
        );
    }

    #[test]
    fn test_location_needs_source_and_primary_label() {
        let diag = Diagnostic::error("unresolved reference `Sqaure`")
            .with_code(ErrorCode::E200)
            .with_label(Span::new(16..22), "not declared");
        assert_eq!(diag.location(), None);

        let diag = diag.with_source(source("types:\n  Shape: Sqaure\n"));
        assert_eq!(diag.location(), Some(Location { line: 2, column: 10 }));
        assert_eq!(
            diag.to_string(),
            "error[E200]: unresolved reference `Sqaure` (at shapes.yaml:2:10)"
        );

        let unlabelled = Diagnostic::error("empty document").with_source(source(""));
        assert_eq!(unlabelled.location(), None);
        assert_eq!(unlabelled.to_string(), "error: empty document (in shapes.yaml)");
    }

    #[test]
    fn test_first_source_wins() {
        let diag = Diagnostic::error("x")
            .with_source(Arc::new(SourceFile::new("child.yaml", "")))
            .with_source(Arc::new(SourceFile::new("root.yaml", "")));
        assert_eq!(diag.source().map(|s| s.name()), Some("child.yaml"));
    }
}
