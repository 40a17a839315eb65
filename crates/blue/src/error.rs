//! Error types for Blue operations.
//!
//! [`BlueError`] is returned by the [`Engine`](crate::Engine) entry points.
//! [`ResolutionError`] is what a finished or cancelled resolution turns into
//! when the caller asks for a plain `Result`.

use std::io;

use thiserror::Error;

use blue_core::UnificationError;
use blue_parser::{Diagnostic, ParseError};

use crate::{fetch::FetchError, serialize::SerializeError};

/// The main error type for Blue operations.
#[derive(Debug, Error)]
pub enum BlueError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Syntax or elaboration errors, each diagnostic carrying its source.
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("{0}")]
    Unification(#[from] UnificationError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("Invalid input `{input}`: {message}")]
    InvalidInput { input: String, message: String },
}

impl BlueError {
    /// The diagnostics carried by this error, if it has any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            BlueError::Parse(err) => err.diagnostics(),
            BlueError::Resolution(ResolutionError::Failed { diagnostics }) => diagnostics,
            _ => &[],
        }
    }
}

/// Why a resolution did not produce a usable graph.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The cancellation token fired. The partial graph was discarded.
    #[error("resolution was cancelled")]
    Cancelled,

    /// At least one error diagnostic was raised.
    #[error("resolution failed with {} error(s)", count_errors(.diagnostics))]
    Failed { diagnostics: Vec<Diagnostic> },
}

fn count_errors(diagnostics: &[Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|d| d.severity().is_error())
        .count()
}
