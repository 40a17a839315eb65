//! Error codes for the Blue diagnostic system.
//!
//! Error codes are organized by phase:
//! - `E0xx` - Syntax errors
//! - `E1xx` - Elaboration errors (type DSL)
//! - `E2xx` - Import resolution and linking errors
//! - `E3xx` - Unification errors
//! - `E9xx` - Internal errors

use std::fmt;

/// Error codes for categorizing diagnostic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    // =========================================================================
    // Syntax Errors (E0xx)
    // =========================================================================
    /// Invalid UTF-8.
    ///
    /// The document bytes are not valid UTF-8 text.
    E001,

    /// Unexpected character.
    ///
    /// A character was encountered that is not valid in this context.
    E002,

    /// Unterminated string or collection.
    ///
    /// A quoted string or flow collection was opened but never closed.
    E003,

    /// Invalid escape sequence.
    ///
    /// An unrecognized escape was used in a double-quoted string.
    /// Valid escapes are: `\0`, `\a`, `\b`, `\t`, `\n`, `\v`, `\f`, `\r`,
    /// `\e`, `\ `, `\"`, `\/`, `\\`, `\N`, `\_`, `\L`, `\P`, `\xXX`,
    /// `\uXXXX` and `\UXXXXXXXX`.
    E004,

    /// Invalid indentation.
    ///
    /// Indentation used a tab, or a line was indented inconsistently with
    /// its siblings.
    E005,

    /// Duplicate mapping key.
    ///
    /// The same key appears twice in one mapping.
    E006,

    /// Unexpected end of input.
    ///
    /// The document ended before a complete value was parsed.
    E007,

    // =========================================================================
    // Elaboration Errors (E1xx)
    // =========================================================================
    /// Document root is not a mapping.
    ///
    /// A type document must be a mapping with `types`, `imports`, and
    /// optional metadata keys.
    E100,

    /// Unknown top-level key.
    ///
    /// The document has a top-level key that the type DSL does not use.
    /// This is reported as a warning.
    E101,

    /// Invalid type expression.
    ///
    /// A value in a type position is not a primitive name, a reference, or a
    /// recognised type constructor.
    E102,

    /// Invalid import declaration.
    ///
    /// An import alias or reference is malformed.
    E103,

    /// Invalid name.
    ///
    /// A declared type name is not an identifier or shadows a primitive, or
    /// the document `name` is not a non-empty string.
    E104,

    /// Invalid `extends` clause.
    ///
    /// `extends` must be a reference or a list of references.
    E105,

    // =========================================================================
    // Resolution Errors (E2xx)
    // =========================================================================
    /// Unresolved reference.
    ///
    /// A reference names a type that no loaded document defines.
    E200,

    /// Import conflict.
    ///
    /// The same document identifier was reached with different content.
    E201,

    /// Cyclic import.
    ///
    /// A document imports itself, directly or through other documents.
    E202,

    /// Fetch failure.
    ///
    /// An imported document could not be read or downloaded.
    E203,

    /// Unknown import alias.
    ///
    /// A qualified reference uses an alias the document does not import.
    E204,

    /// Import depth exceeded.
    ///
    /// The import chain is deeper than the configured maximum.
    E205,

    /// Recursive type.
    ///
    /// A type refers to itself and recursive types are not enabled.
    E206,

    // =========================================================================
    // Unification Errors (E3xx)
    // =========================================================================
    /// Type mismatch.
    ///
    /// Two types that must unify have incompatible shapes.
    E300,

    /// Unification error.
    ///
    /// A type could not be merged with its bases, for example because two
    /// references name different definitions or a base is not an object.
    E301,

    // =========================================================================
    // Internal Errors (E9xx)
    // =========================================================================
    /// Internal error.
    ///
    /// An invariant of the engine was violated.
    E900,
}

impl ErrorCode {
    /// Returns the numeric code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            // Syntax errors
            ErrorCode::E001 => "E001",
            ErrorCode::E002 => "E002",
            ErrorCode::E003 => "E003",
            ErrorCode::E004 => "E004",
            ErrorCode::E005 => "E005",
            ErrorCode::E006 => "E006",
            ErrorCode::E007 => "E007",
            // Elaboration errors
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            ErrorCode::E103 => "E103",
            ErrorCode::E104 => "E104",
            ErrorCode::E105 => "E105",
            // Resolution errors
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
            ErrorCode::E202 => "E202",
            ErrorCode::E203 => "E203",
            ErrorCode::E204 => "E204",
            ErrorCode::E205 => "E205",
            ErrorCode::E206 => "E206",
            // Unification errors
            ErrorCode::E300 => "E300",
            ErrorCode::E301 => "E301",
            // Internal errors
            ErrorCode::E900 => "E900",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            // Syntax errors
            ErrorCode::E001 => "invalid UTF-8",
            ErrorCode::E002 => "unexpected character",
            ErrorCode::E003 => "unterminated string or collection",
            ErrorCode::E004 => "invalid escape sequence",
            ErrorCode::E005 => "invalid indentation",
            ErrorCode::E006 => "duplicate mapping key",
            ErrorCode::E007 => "unexpected end of input",
            // Elaboration errors
            ErrorCode::E100 => "document root is not a mapping",
            ErrorCode::E101 => "unknown top-level key",
            ErrorCode::E102 => "invalid type expression",
            ErrorCode::E103 => "invalid import declaration",
            ErrorCode::E104 => "invalid name",
            ErrorCode::E105 => "invalid extends clause",
            // Resolution errors
            ErrorCode::E200 => "unresolved reference",
            ErrorCode::E201 => "import conflict",
            ErrorCode::E202 => "cyclic import",
            ErrorCode::E203 => "fetch failure",
            ErrorCode::E204 => "unknown import alias",
            ErrorCode::E205 => "import depth exceeded",
            ErrorCode::E206 => "recursive type",
            // Unification errors
            ErrorCode::E300 => "type mismatch",
            ErrorCode::E301 => "unification error",
            // Internal errors
            ErrorCode::E900 => "internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
