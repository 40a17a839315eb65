//! Accumulates diagnostics while a stage keeps going past the first error.

use crate::error::{Diagnostic, ParseError};

/// Diagnostics gathered by the lexer, parser, or elaborator.
///
/// Stages emit everything they find and decide at the end: any error turns
/// the whole batch into a [`ParseError`], otherwise the warnings are handed
/// back alongside the result.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity().is_error() {
            self.errors += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// The warnings if no error was emitted, else every diagnostic in
    /// emission order.
    pub fn finish(self) -> Result<Vec<Diagnostic>, ParseError> {
        if self.has_errors() {
            Err(ParseError::new(self.diagnostics))
        } else {
            Ok(self.diagnostics)
        }
    }
}
