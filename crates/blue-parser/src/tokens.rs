//! Token definitions produced by the [`lexer`](super::lexer).

use std::fmt;

use crate::span::Span;

/// How a scalar was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    /// Unquoted; resolved to null, boolean, number, or string by content.
    Plain,
    SingleQuoted,
    DoubleQuoted,
    /// `|` block scalar.
    Literal,
    /// `>` block scalar.
    Folded,
}

impl ScalarStyle {
    /// Everything except plain scalars is always a string.
    pub fn is_plain(self) -> bool {
        matches!(self, ScalarStyle::Plain)
    }

    pub fn is_quoted(self) -> bool {
        matches!(self, ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Start of a block-context line, with its indentation in spaces.
    Indent(usize),
    /// `---`
    DocumentStart,
    /// `...`
    DocumentEnd,
    /// `- ` in block context.
    SequenceEntry,
    /// `:` used as a mapping value indicator.
    Colon,
    Comma,
    FlowMappingStart,
    FlowMappingEnd,
    FlowSequenceStart,
    FlowSequenceEnd,
    Scalar(ScalarStyle, String),
}

impl Token {
    /// Whether a `:` directly after this token is a value indicator even
    /// without following whitespace (JSON-style `"key":value`).
    pub fn allows_adjacent_colon(&self) -> bool {
        match self {
            Token::Scalar(style, _) => style.is_quoted(),
            Token::FlowMappingEnd | Token::FlowSequenceEnd => true,
            _ => false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Indent(_) => write!(f, "line break"),
            Token::DocumentStart => write!(f, "`---`"),
            Token::DocumentEnd => write!(f, "`...`"),
            Token::SequenceEntry => write!(f, "`-`"),
            Token::Colon => write!(f, "`:`"),
            Token::Comma => write!(f, "`,`"),
            Token::FlowMappingStart => write!(f, "`{{`"),
            Token::FlowMappingEnd => write!(f, "`}}`"),
            Token::FlowSequenceStart => write!(f, "`[`"),
            Token::FlowSequenceEnd => write!(f, "`]`"),
            Token::Scalar(_, value) => write!(f, "scalar `{value}`"),
        }
    }
}

/// A token with its span and the byte column it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedToken {
    pub token: Token,
    pub span: Span,
    pub column: usize,
}

impl PositionedToken {
    pub fn new(token: Token, span: Span, column: usize) -> Self {
        Self {
            token,
            span,
            column,
        }
    }
}
