//! Thread-safe diagnostic collection.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use blue_parser::Diagnostic;

/// Collects diagnostics in report order.
///
/// Unlike the parser's collector, a `Reporter` is shared: sibling imports
/// loaded on the rayon pool report into the same instance.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Mutex<Vec<Diagnostic>>,
    errors: AtomicBool,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        if diagnostic.severity().is_error() {
            self.errors.store(true, Ordering::Release);
            debug!(diagnostic:% = diagnostic; "Reported error");
        } else {
            warn!(diagnostic:% = diagnostic; "Reported warning");
        }
        self.diagnostics.lock().push(diagnostic);
    }

    /// Append several diagnostics, keeping their order.
    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }

    /// Whether any error has been reported since creation.
    ///
    /// Draining does not reset this flag.
    pub fn has_errors(&self) -> bool {
        self.errors.load(Ordering::Acquire)
    }

    /// Number of diagnostics waiting to be drained.
    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every collected diagnostic, leaving the reporter empty.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }
}
