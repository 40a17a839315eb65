//! Error adapter for converting BlueError to miette diagnostics.
//!
//! Parse errors and failed resolutions carry many diagnostics, possibly from
//! several documents. Each one becomes its own [`Reportable`], rendered
//! against the source text it points into; errors without diagnostics
//! (I/O, fetch, configuration) become a single plain report.

use std::fmt;

use miette::{
    Diagnostic as MietteDiagnostic, GraphicalReportHandler, LabeledSpan, Severity as MietteSeverity,
    SourceCode, SourceSpan,
};

use blue::BlueError;
use blue_parser::{Diagnostic, Severity, Span};

/// One renderable report.
pub enum Reportable<'a> {
    /// A diagnostic and, when known, the text of its document.
    Diagnostic {
        diag: &'a Diagnostic,
        src: Option<&'a str>,
    },
    /// An error without source locations.
    Error(&'a BlueError),
}

impl<'a> Reportable<'a> {
    pub fn diagnostic(diag: &'a Diagnostic) -> Self {
        Reportable::Diagnostic {
            diag,
            src: diag.source().map(|source| source.text()),
        }
    }
}

impl fmt::Debug for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Diagnostic { diag, .. } => {
                f.debug_tuple("Diagnostic").field(diag).finish()
            }
            Reportable::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Diagnostic { diag, .. } => match diag.source() {
                Some(source) => write!(f, "{}: {}", source.name(), diag.message()),
                None => f.write_str(diag.message()),
            },
            Reportable::Error(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Reportable::Diagnostic { .. } => None,
            Reportable::Error(err) => err.source(),
        }
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self {
            Reportable::Diagnostic { diag, .. } => {
                return diag.code().map(|c| Box::new(c) as Box<dyn fmt::Display>);
            }
            Reportable::Error(err) => match err {
                BlueError::Io(_) => "blue::io",
                BlueError::Parse(_) => return None,
                BlueError::Fetch(_) => "blue::fetch",
                BlueError::Resolution(_) => "blue::resolution",
                BlueError::Unification(_) => "blue::unification",
                BlueError::Serialize(_) => "blue::serialize",
                BlueError::InvalidInput { .. } => "blue::input",
            },
        };
        Some(Box::new(code))
    }

    fn severity(&self) -> Option<MietteSeverity> {
        let severity = match self {
            Reportable::Diagnostic { diag, .. } => diag.severity(),
            Reportable::Error(_) => Severity::Error,
        };
        Some(match severity {
            Severity::Error => MietteSeverity::Error,
            Severity::Warning => MietteSeverity::Warning,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic { diag, .. } => {
                diag.help().map(|h| Box::new(h) as Box<dyn fmt::Display>)
            }
            Reportable::Error(BlueError::InvalidInput { .. }) => Some(Box::new(
                "inputs are file paths, http(s) URLs or `sha256:` content hashes",
            )),
            Reportable::Error(_) => None,
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        match self {
            Reportable::Diagnostic { src: Some(src), .. } => Some(src as &dyn SourceCode),
            _ => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        // Spans are meaningless without the text they index.
        let Reportable::Diagnostic { diag, src: Some(_) } = self else {
            return None;
        };
        if diag.labels().is_empty() {
            return None;
        }

        Some(Box::new(diag.labels().iter().map(|label| {
            let span = span_to_miette(label.span());
            let message = Some(label.message().to_string());
            if label.is_primary() {
                LabeledSpan::new_primary_with_span(message, span)
            } else {
                LabeledSpan::new_with_span(message, span)
            }
        })))
    }
}

fn span_to_miette(span: Span) -> SourceSpan {
    SourceSpan::new(span.start().into(), span.len())
}

/// Convert a [`BlueError`] into a list of reportable errors.
///
/// Errors carrying diagnostics yield one [`Reportable`] per diagnostic;
/// every other variant yields a single [`Reportable`].
pub fn to_reportables(err: &BlueError) -> Vec<Reportable<'_>> {
    let diagnostics = err.diagnostics();
    if diagnostics.is_empty() {
        return vec![Reportable::Error(err)];
    }
    diagnostics.iter().map(Reportable::diagnostic).collect()
}

/// Render a reportable with miette's graphical handler.
pub fn render(reportable: &Reportable<'_>) -> String {
    let mut out = String::new();
    match GraphicalReportHandler::new().render_report(&mut out, reportable) {
        Ok(()) => out,
        Err(_) => reportable.to_string(),
    }
}
