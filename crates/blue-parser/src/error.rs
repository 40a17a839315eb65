//! Diagnostics shared by every stage of the Blue toolchain.
//!
//! The lexer, parser, and elaborator emit [`Diagnostic`]s into a
//! [`DiagnosticCollector`] and keep going; a stage that saw any error hands
//! back a [`ParseError`] holding all of them. The resolver and linker in the
//! `blue` crate raise the same [`Diagnostic`] type, so one renderer covers
//! syntax errors and broken imports alike.
//!
//! Codes are grouped by stage: `E0xx` syntax, `E1xx` elaboration, `E2xx`
//! resolution, `E3xx` unification, `E9xx` internal. See [`ErrorCode`].

mod collector;
mod diagnostic;
mod error_code;
mod parse_error;

pub use collector::DiagnosticCollector;
pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use parse_error::ParseError;

/// Result of a step that fails with a single diagnostic.
pub(crate) type Result<T> = std::result::Result<T, Diagnostic>;
