//! [`ParseError`]: every diagnostic of a document that failed to parse.

use std::sync::Arc;

use thiserror::Error;

use crate::{error::Diagnostic, source::SourceFile};

/// A document that could not be parsed or elaborated.
///
/// Holds at least one error diagnostic, plus any warnings raised alongside.
#[derive(Debug, Error)]
#[error("{}", summary(.diagnostics))]
pub struct ParseError {
    diagnostics: Vec<Diagnostic>,
}

fn summary(diagnostics: &[Diagnostic]) -> String {
    let errors = diagnostics.iter().filter(|d| d.severity().is_error());
    let mut errors = errors.peekable();
    let Some(first) = errors.peek().map(|d| d.to_string()) else {
        return "document has no errors".to_string();
    };
    match errors.count() {
        1 => first,
        n => format!("{first} (+{} more)", n - 1),
    }
}

impl ParseError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Point every diagnostic without a source at `source`.
    pub fn with_source(mut self, source: &Arc<SourceFile>) -> Self {
        self.diagnostics = self
            .diagnostics
            .into_iter()
            .map(|d| d.with_source(Arc::clone(source)))
            .collect();
        self
    }
}

impl From<Diagnostic> for ParseError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::new(vec![diagnostic])
    }
}

impl From<Vec<Diagnostic>> for ParseError {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self::new(diagnostics)
    }
}
