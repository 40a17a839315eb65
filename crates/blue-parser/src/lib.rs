//! # Blue Parser
//!
//! Parser for Blue type documents. This crate takes source text written in
//! JSON or a YAML subset to an elaborated [`Module`] of type declarations.
//!
//! ## Usage
//!
//! ```
//! # use blue_parser::{parse, Origin, ParseError};
//!
//! fn main() -> Result<(), ParseError> {
//!     let source = "
//! name: shapes
//! types:
//!   Point:
//!     fields:
//!       x: Integer
//!       y: Integer
//! ";
//!
//!     let document = parse(source, Origin::Memory("shapes".into()))?;
//!     assert!(document.module().types.contains_key("Point"));
//!     Ok(())
//! }
//! ```

mod ast;
mod document;
mod elaborate;
pub mod error;
mod lexer;
mod parser;
mod reference;
mod source;
mod span;
mod tokens;

pub use ast::{Mapping, MappingEntry, Node, NodeKind};
pub use document::{Document, Origin};
pub use elaborate::{ImportDecl, Module, TypeDecl, is_identifier, is_reference};
pub use error::{Diagnostic, ErrorCode, ParseError, Severity};
pub use parser::parse_node;
pub use reference::{ImportRef, ImportRefError};
pub use source::{Location, SourceFile};
pub use span::{Span, Spanned};

/// Parse source text into an elaborated document.
///
/// This is the main entry point of the crate. It runs the whole pipeline:
///
/// 1. **Tokenize** - Convert source text to tokens
/// 2. **Parse** - Build the syntax tree from tokens
/// 3. **Elaborate** - Map the tree to the type DSL
///
/// # Returns
///
/// Returns the [`Document`] on success, or a [`ParseError`] with every
/// diagnostic, each pointing into the document source.
pub fn parse(text: &str, origin: Origin) -> Result<Document, ParseError> {
    Document::parse(text, origin)
}

/// Parse raw bytes, validating UTF-8 first.
pub fn parse_bytes(bytes: &[u8], origin: Origin) -> Result<Document, ParseError> {
    Document::parse_bytes(bytes, origin)
}
