//! Parser from tokens to the document tree.
//!
//! A recursive descent parser over the token stream produced by the
//! [`lexer`](crate::lexer). Block structure is driven by the
//! [`Token::Indent`] tokens at the start of each line; flow collections and
//! JSON are parsed from their bracket tokens.
//!
//! Structural errors stop parsing and are returned as a single diagnostic.
//! Duplicate keys are reported without stopping, so every duplicate in a
//! document shows up in one run.

use std::collections::HashMap;

use log::{debug, trace};
use winnow::{
    ModalResult, Parser as _,
    ascii::{digit0, digit1},
    combinator::{alt, opt},
    token::one_of,
};

use crate::{
    ast::{Mapping, Node, NodeKind},
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ParseError, Result},
    lexer,
    span::{Span, Spanned},
    tokens::{PositionedToken, ScalarStyle, Token},
};

/// Where a block value hangs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    /// After `key:`.
    MappingKey,
    /// After `-`.
    SequenceEntry,
}

struct Parser<'t> {
    tokens: &'t [PositionedToken],
    pos: usize,
    diagnostics: DiagnosticCollector,
    /// Length of the source, for spans at the end of input.
    eof: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [PositionedToken], eof: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: DiagnosticCollector::new(),
            eof,
        }
    }

    // ============================================================================
    // Token Access
    // ============================================================================

    fn peek(&self) -> Option<&'t PositionedToken> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&'t Token> {
        self.peek().map(|t| &t.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    fn bump(&mut self) -> Option<&'t PositionedToken> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eof_span(&self) -> Span {
        Span::new(self.eof..self.eof)
    }

    /// Whether the next tokens are `scalar :`.
    fn at_mapping_key(&self) -> bool {
        matches!(self.peek_token(), Some(Token::Scalar(..)))
            && matches!(self.peek_nth(1), Some(Token::Colon))
    }

    /// Whether the current line has no more tokens.
    fn at_line_end(&self) -> bool {
        matches!(
            self.peek_token(),
            None | Some(Token::Indent(_) | Token::DocumentStart | Token::DocumentEnd)
        )
    }

    // ============================================================================
    // Documents
    // ============================================================================

    fn document(&mut self) -> Result<Node> {
        let explicit_start = matches!(self.peek_token(), Some(Token::DocumentStart));
        if explicit_start {
            self.bump();
        }

        let root = match self.peek() {
            None => Node::new(NodeKind::Null, self.eof_span()),
            Some(PositionedToken {
                token: Token::DocumentEnd,
                span,
                ..
            }) => Node::new(NodeKind::Null, Span::new(span.start()..span.start())),
            Some(PositionedToken {
                token: Token::Indent(indent),
                ..
            }) => {
                self.bump();
                self.block_value_at(*indent)?
            }
            // Content on the `---` line itself.
            Some(token) => self.block_value_at(token.column)?,
        };

        if matches!(self.peek_token(), Some(Token::DocumentEnd)) {
            self.bump();
        }

        match self.peek() {
            None => Ok(root),
            Some(PositionedToken {
                token: Token::DocumentStart,
                span,
                ..
            }) => Err(Diagnostic::error("multiple documents in one stream are not supported")
                .with_code(ErrorCode::E002)
                .with_label(*span, "second document starts here")
                .with_help("split the documents into separate files")),
            Some(PositionedToken {
                token: Token::Indent(_),
                span,
                ..
            }) => Err(Diagnostic::error("inconsistent indentation")
                .with_code(ErrorCode::E005)
                .with_label(*span, "does not match any enclosing block")
                .with_help("align this line with a key or sequence entry above it")),
            Some(token) => Err(Diagnostic::error(format!("unexpected {}", token.token))
                .with_code(ErrorCode::E002)
                .with_label(token.span, "trailing content")),
        }
    }

    // ============================================================================
    // Block Collections
    // ============================================================================

    /// Parse the value starting at the current token, on a line indented by
    /// `indent`.
    fn block_value_at(&mut self, indent: usize) -> Result<Node> {
        match self.peek_token() {
            Some(Token::SequenceEntry) => self.block_sequence(indent),
            _ if self.at_mapping_key() => self.block_mapping(indent),
            _ => {
                let value = self.flow_value()?;
                self.expect_line_end()?;
                Ok(value)
            }
        }
    }

    fn block_mapping(&mut self, indent: usize) -> Result<Node> {
        trace!(indent; "Parsing block mapping");
        let mut mapping = Mapping::new();
        let mut first_seen: HashMap<String, Span> = HashMap::new();
        let mut span: Option<Span> = None;

        loop {
            let (key, colon) = self.mapping_key()?;
            let value = self.block_child(indent, Parent::MappingKey, colon)?;

            let entry_span = key.span().union(value.span()).union(colon);
            span = Some(span.map_or(entry_span, |s| s.union(entry_span)));
            self.insert_entry(&mut mapping, &mut first_seen, key, value);

            match self.peek() {
                Some(PositionedToken {
                    token: Token::Indent(next),
                    ..
                }) if *next == indent => {
                    if self.peek_nth(1).is_some_and(|t| matches!(t, Token::Scalar(..)))
                        && matches!(self.peek_nth(2), Some(Token::Colon))
                    {
                        self.bump();
                        continue;
                    }
                    let Some(found) = self.tokens.get(self.pos + 1) else {
                        break;
                    };
                    return Err(Diagnostic::error(format!(
                        "expected a mapping key, found {}",
                        found.token
                    ))
                    .with_code(ErrorCode::E002)
                    .with_label(found.span, "expected `key: value`"));
                }
                Some(PositionedToken {
                    token: Token::Indent(next),
                    span,
                    ..
                }) if *next > indent => {
                    return Err(Diagnostic::error("unexpected indentation")
                        .with_code(ErrorCode::E005)
                        .with_label(*span, format!("indented {next} spaces, expected {indent}"))
                        .with_help("only a key with an empty value can be followed by a deeper block"));
                }
                _ => break,
            }
        }

        Ok(Node::new(
            NodeKind::Mapping(mapping),
            span.unwrap_or_default(),
        ))
    }

    fn block_sequence(&mut self, indent: usize) -> Result<Node> {
        trace!(indent; "Parsing block sequence");
        let mut items = Vec::new();
        let mut span: Option<Span> = None;

        loop {
            let Some(dash) = self.bump() else {
                break;
            };
            let item = self.block_child(dash.column, Parent::SequenceEntry, dash.span)?;
            let item_span = dash.span.union(item.span());
            span = Some(span.map_or(item_span, |s| s.union(item_span)));
            items.push(item);

            match self.peek() {
                Some(PositionedToken {
                    token: Token::Indent(next),
                    ..
                }) if *next == indent && matches!(self.peek_nth(1), Some(Token::SequenceEntry)) => {
                    self.bump();
                }
                Some(PositionedToken {
                    token: Token::Indent(next),
                    span,
                    ..
                }) if *next > indent => {
                    return Err(Diagnostic::error("unexpected indentation")
                        .with_code(ErrorCode::E005)
                        .with_label(*span, format!("indented {next} spaces, expected {indent}"))
                        .with_help("sequence entries must line up under each other"));
                }
                _ => break,
            }
        }

        Ok(Node::new(
            NodeKind::Sequence(items),
            span.unwrap_or_default(),
        ))
    }

    /// Parse the value after `key:` or `-`.
    ///
    /// `indent` is the indentation of the key or the column of the dash;
    /// a value on the following lines must be indented deeper, except for
    /// a sequence under a mapping key, which may sit at the key's level.
    fn block_child(&mut self, indent: usize, parent: Parent, anchor: Span) -> Result<Node> {
        let empty = Node::new(NodeKind::Null, Span::new(anchor.end()..anchor.end()));

        let Some(token) = self.peek() else {
            return Ok(empty);
        };
        match &token.token {
            Token::DocumentStart | Token::DocumentEnd => Ok(empty),
            Token::Indent(next) if *next > indent => {
                self.bump();
                self.block_value_at(*next)
            }
            Token::Indent(next)
                if *next == indent
                    && parent == Parent::MappingKey
                    && matches!(self.peek_nth(1), Some(Token::SequenceEntry)) =>
            {
                self.bump();
                self.block_sequence(indent)
            }
            Token::Indent(_) => Ok(empty),
            Token::SequenceEntry if parent == Parent::SequenceEntry => {
                self.block_sequence(token.column)
            }
            Token::Scalar(..) if parent == Parent::SequenceEntry && self.at_mapping_key() => {
                self.block_mapping(token.column)
            }
            Token::SequenceEntry => Err(Diagnostic::error(
                "a block sequence cannot start on the same line as its key",
            )
            .with_code(ErrorCode::E002)
            .with_label(token.span, "sequence entry")
            .with_help("move the sequence to the next line and indent it")),
            Token::Scalar(..) if self.at_mapping_key() => Err(Diagnostic::error(
                "a nested mapping cannot start on the same line as its key",
            )
            .with_code(ErrorCode::E002)
            .with_label(token.span, "nested key")
            .with_help("move the nested mapping to the next line and indent it")),
            _ => {
                let value = self.flow_value()?;
                self.expect_line_end()?;
                Ok(value)
            }
        }
    }

    /// Parse `key :` and return the key with the colon's span.
    fn mapping_key(&mut self) -> Result<(Spanned<String>, Span)> {
        let Some(token) = self.bump() else {
            return Err(self.unexpected_end("a mapping key"));
        };
        let Token::Scalar(_, key) = &token.token else {
            return Err(
                Diagnostic::error(format!("expected a mapping key, found {}", token.token))
                    .with_code(ErrorCode::E002)
                    .with_label(token.span, "expected a key"),
            );
        };
        let key = Spanned::new(key.clone(), token.span);

        match self.bump() {
            Some(PositionedToken {
                token: Token::Colon,
                span,
                ..
            }) => Ok((key, *span)),
            Some(other) => Err(Diagnostic::error(format!(
                "expected `:` after mapping key, found {}",
                other.token
            ))
            .with_code(ErrorCode::E002)
            .with_label(other.span, "expected `:`")),
            None => Err(self.unexpected_end("`:` after mapping key")),
        }
    }

    fn expect_line_end(&self) -> Result<()> {
        let Some(token) = self.peek().filter(|_| !self.at_line_end()) else {
            return Ok(());
        };
        let mut diagnostic = Diagnostic::error(format!("unexpected {} after value", token.token))
            .with_code(ErrorCode::E002)
            .with_label(token.span, "expected end of line");
        if matches!(token.token, Token::Colon) {
            diagnostic = diagnostic.with_help("quote the value if it contains `: `");
        }
        Err(diagnostic)
    }

    // ============================================================================
    // Flow Collections and Scalars
    // ============================================================================

    fn flow_value(&mut self) -> Result<Node> {
        let Some(token) = self.bump() else {
            return Err(self.unexpected_end("a value"));
        };
        match &token.token {
            Token::Scalar(style, text) => Ok(scalar_node(*style, text, token.span)),
            Token::FlowMappingStart => self.flow_mapping(token.span),
            Token::FlowSequenceStart => self.flow_sequence(token.span),
            other => Err(Diagnostic::error(format!("expected a value, found {other}"))
                .with_code(ErrorCode::E002)
                .with_label(token.span, "expected a value")),
        }
    }

    fn flow_sequence(&mut self, open: Span) -> Result<Node> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.unterminated(open, "`]`")),
                Some(PositionedToken {
                    token: Token::FlowSequenceEnd,
                    span,
                    ..
                }) => {
                    self.bump();
                    return Ok(Node::new(NodeKind::Sequence(items), open.union(*span)));
                }
                Some(_) => {}
            }

            items.push(self.flow_value()?);
            self.flow_separator(open, &Token::FlowSequenceEnd, "`]`")?;
        }
    }

    fn flow_mapping(&mut self, open: Span) -> Result<Node> {
        let mut mapping = Mapping::new();
        let mut first_seen: HashMap<String, Span> = HashMap::new();
        loop {
            match self.peek() {
                None => return Err(self.unterminated(open, "`}`")),
                Some(PositionedToken {
                    token: Token::FlowMappingEnd,
                    span,
                    ..
                }) => {
                    self.bump();
                    return Ok(Node::new(NodeKind::Mapping(mapping), open.union(*span)));
                }
                Some(_) => {}
            }

            let Some(token) = self.bump() else {
                return Err(self.unterminated(open, "`}`"));
            };
            let Token::Scalar(_, key) = &token.token else {
                return Err(
                    Diagnostic::error(format!("expected a mapping key, found {}", token.token))
                        .with_code(ErrorCode::E002)
                        .with_label(token.span, "expected a key"),
                );
            };
            let key = Spanned::new(key.clone(), token.span);

            let value = match self.peek() {
                Some(PositionedToken {
                    token: Token::Colon,
                    span,
                    ..
                }) => {
                    let colon = *span;
                    self.bump();
                    match self.peek_token() {
                        Some(Token::Comma | Token::FlowMappingEnd) => {
                            Node::new(NodeKind::Null, Span::new(colon.end()..colon.end()))
                        }
                        _ => self.flow_value()?,
                    }
                }
                // `{a, b}`: keys without values.
                Some(PositionedToken {
                    token: Token::Comma | Token::FlowMappingEnd,
                    ..
                }) => Node::new(NodeKind::Null, Span::new(key.span().end()..key.span().end())),
                None => return Err(self.unterminated(open, "`}`")),
                Some(other) => {
                    return Err(Diagnostic::error(format!(
                        "expected `:` after mapping key, found {}",
                        other.token
                    ))
                    .with_code(ErrorCode::E002)
                    .with_label(other.span, "expected `:`"));
                }
            };

            self.insert_entry(&mut mapping, &mut first_seen, key, value);
            self.flow_separator(open, &Token::FlowMappingEnd, "`}`")?;
        }
    }

    /// After a flow item: consume a `,` or leave the closing bracket.
    fn flow_separator(&mut self, open: Span, close: &Token, close_name: &str) -> Result<()> {
        match self.peek() {
            Some(PositionedToken {
                token: Token::Comma,
                ..
            }) => {
                self.bump();
                Ok(())
            }
            Some(token) if &token.token == close => Ok(()),
            None => Err(self.unterminated(open, close_name)),
            Some(token) => Err(Diagnostic::error(format!(
                "expected `,` or {close_name}, found {}",
                token.token
            ))
            .with_code(ErrorCode::E002)
            .with_label(token.span, "unexpected token")
            .with_secondary_label(open, "collection opened here")),
        }
    }

    fn insert_entry(
        &mut self,
        mapping: &mut Mapping,
        first_seen: &mut HashMap<String, Span>,
        key: Spanned<String>,
        value: Node,
    ) {
        if let Some(first) = first_seen.get(key.as_str()) {
            self.diagnostics.emit(
                Diagnostic::error(format!("duplicate key `{}`", key.as_str()))
                    .with_code(ErrorCode::E006)
                    .with_label(key.span(), "duplicate key")
                    .with_secondary_label(*first, "first defined here")
                    .with_help("remove the duplicate or use a different key"),
            );
            return;
        }
        first_seen.insert(key.inner().clone(), key.span());
        mapping.push(key, value);
    }

    // ============================================================================
    // Errors
    // ============================================================================

    fn unexpected_end(&self, expected: &str) -> Diagnostic {
        Diagnostic::error(format!("unexpected end of input, expected {expected}"))
            .with_code(ErrorCode::E007)
            .with_label(self.eof_span(), "input ends here")
    }

    fn unterminated(&self, open: Span, close_name: &str) -> Diagnostic {
        Diagnostic::error("unterminated flow collection")
            .with_code(ErrorCode::E003)
            .with_label(open, "opened here")
            .with_secondary_label(self.eof_span(), "input ends here")
            .with_help(format!("add the closing {close_name}"))
    }
}

// ============================================================================
// Plain Scalar Resolution
// ============================================================================

fn sign(input: &mut &str) -> ModalResult<()> {
    opt(one_of(['-', '+'])).void().parse_next(input)
}

fn decimal_integer(input: &mut &str) -> ModalResult<()> {
    (sign, digit1).void().parse_next(input)
}

fn float_literal(input: &mut &str) -> ModalResult<()> {
    (
        sign,
        alt(((digit1, opt(('.', digit0))).void(), ('.', digit1).void())),
        opt((one_of(['e', 'E']), sign, digit1)),
    )
        .void()
        .parse_next(input)
}

/// `0x` hexadecimal or `0o` octal integers.
fn radix_integer(text: &str) -> Option<i64> {
    let (digits, radix) = match text.strip_prefix("0x") {
        Some(digits) => (digits, 16),
        None => (text.strip_prefix("0o")?, 8),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

/// Resolve the type of a plain scalar: null, boolean, integer, float, or
/// string, in that order.
pub(crate) fn resolve_plain(text: &str) -> NodeKind {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return NodeKind::Null,
        "true" | "True" | "TRUE" => return NodeKind::Bool(true),
        "false" | "False" | "FALSE" => return NodeKind::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return NodeKind::Float(f64::INFINITY);
        }
        "-.inf" | "-.Inf" | "-.INF" => return NodeKind::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return NodeKind::Float(f64::NAN),
        _ => {}
    }

    if decimal_integer.parse(text).is_ok() {
        // Integers beyond i64 fall back to floats.
        return match text.parse::<i64>() {
            Ok(value) => NodeKind::Integer(value),
            Err(_) => text
                .parse::<f64>()
                .map_or_else(|_| NodeKind::String(text.to_string()), NodeKind::Float),
        };
    }
    if let Some(value) = radix_integer(text) {
        return NodeKind::Integer(value);
    }
    if float_literal.parse(text).is_ok() {
        if let Ok(value) = text.parse::<f64>() {
            return NodeKind::Float(value);
        }
    }
    NodeKind::String(text.to_string())
}

fn scalar_node(style: ScalarStyle, text: &str, span: Span) -> Node {
    let kind = if style.is_plain() {
        resolve_plain(text)
    } else {
        NodeKind::String(text.to_string())
    };
    Node::new(kind, span)
}

// ============================================================================
// Entry Points
// ============================================================================

/// Build the document tree from a token stream.
///
/// `source_len` is the byte length of the source the tokens came from and
/// anchors end-of-input diagnostics.
pub fn parse_tokens(
    tokens: &[PositionedToken],
    source_len: usize,
) -> std::result::Result<Node, ParseError> {
    let mut parser = Parser::new(tokens, source_len);
    let root = parser.document();

    let mut diagnostics = parser.diagnostics;
    let root = root.unwrap_or_else(|diagnostic| {
        diagnostics.emit(diagnostic);
        Node::detached(NodeKind::Null)
    });
    diagnostics.finish().map(|_| root)
}

/// Parse YAML-subset or JSON text into a document tree.
///
/// An empty or comment-only document is `null`.
pub fn parse_node(source: &str) -> std::result::Result<Node, ParseError> {
    let tokens = lexer::tokenize(source)?;
    debug!(tokens = tokens.len(); "Tokenized document");
    parse_tokens(&tokens, source.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Node {
        parse_node(source).unwrap_or_else(|e| panic!("failed to parse {source:?}: {e}"))
    }

    fn error_codes(source: &str) -> Vec<ErrorCode> {
        parse_node(source)
            .expect_err("expected parse errors")
            .diagnostics()
            .iter()
            .filter_map(Diagnostic::code)
            .collect()
    }

    fn null() -> Node {
        Node::detached(NodeKind::Null)
    }

    fn int(i: i64) -> Node {
        Node::detached(NodeKind::Integer(i))
    }

    fn string(s: &str) -> Node {
        Node::detached(NodeKind::String(s.to_string()))
    }

    fn seq(items: Vec<Node>) -> Node {
        Node::detached(NodeKind::Sequence(items))
    }

    fn map(entries: Vec<(&str, Node)>) -> Node {
        let mut mapping = Mapping::new();
        for (key, value) in entries {
            mapping.push(Spanned::new(key.to_string(), Span::default()), value);
        }
        Node::detached(NodeKind::Mapping(mapping))
    }

    #[test]
    fn test_nested_block_mapping() {
        let node = parse("name: shapes\ntypes:\n  Point:\n    x: Integer\n    y: Integer\n");
        assert_eq!(
            node,
            map(vec![
                ("name", string("shapes")),
                (
                    "types",
                    map(vec![(
                        "Point",
                        map(vec![("x", string("Integer")), ("y", string("Integer"))])
                    )])
                ),
            ])
        );
    }

    #[test]
    fn test_block_sequences() {
        assert_eq!(parse("- 1\n- two\n-\n"), seq(vec![int(1), string("two"), null()]));

        // Indentless sequence under a key.
        assert_eq!(
            parse("union:\n- Text\n- Integer\nnext: 1\n"),
            map(vec![
                ("union", seq(vec![string("Text"), string("Integer")])),
                ("next", int(1)),
            ])
        );
    }

    #[test]
    fn test_compact_collections_in_sequences() {
        assert_eq!(
            parse("- name: a\n  size: 1\n- name: b\n"),
            seq(vec![
                map(vec![("name", string("a")), ("size", int(1))]),
                map(vec![("name", string("b"))]),
            ])
        );
        assert_eq!(
            parse("- - 1\n  - 2\n- 3\n"),
            seq(vec![seq(vec![int(1), int(2)]), int(3)])
        );
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let yaml = parse("a: 1\nb:\n  - true\n  - null\nc: {d: x}\n");
        let json = parse(r#"{"a": 1, "b": [true, null], "c": {"d": "x"}}"#);
        assert_eq!(yaml, json);
    }

    #[test]
    fn test_multiline_flow_collections() {
        assert_eq!(
            parse("list: [\n  1,\n  2,\n]\nafter: x\n"),
            map(vec![("list", seq(vec![int(1), int(2)])), ("after", string("x"))])
        );
    }

    #[test]
    fn test_flow_mapping_missing_values() {
        assert_eq!(
            parse("{a: , b}"),
            map(vec![("a", null()), ("b", null())])
        );
    }

    #[test]
    fn test_scalar_resolution() {
        assert!(matches!(resolve_plain("~"), NodeKind::Null));
        assert!(matches!(resolve_plain("True"), NodeKind::Bool(true)));
        assert!(matches!(resolve_plain("-42"), NodeKind::Integer(-42)));
        assert!(matches!(resolve_plain("+7"), NodeKind::Integer(7)));
        assert!(matches!(resolve_plain("0x1F"), NodeKind::Integer(31)));
        assert!(matches!(resolve_plain("0o17"), NodeKind::Integer(15)));
        assert!(matches!(resolve_plain("1.5e3"), NodeKind::Float(f) if f == 1500.0));
        assert!(matches!(resolve_plain(".5"), NodeKind::Float(f) if f == 0.5));
        assert!(matches!(resolve_plain("-.inf"), NodeKind::Float(f) if f == f64::NEG_INFINITY));
        assert!(matches!(resolve_plain(".nan"), NodeKind::Float(f) if f.is_nan()));
        assert!(
            matches!(resolve_plain("99999999999999999999"), NodeKind::Float(f) if f > 9.9e19)
        );
        assert!(matches!(resolve_plain("yes"), NodeKind::String(_)));
        assert!(matches!(resolve_plain("1.2.3"), NodeKind::String(_)));
        assert!(matches!(resolve_plain("inf"), NodeKind::String(_)));
    }

    #[test]
    fn test_quoted_scalars_stay_strings() {
        assert_eq!(
            parse("a: \"1\"\nb: 'null'\n"),
            map(vec![("a", string("1")), ("b", string("null"))])
        );
    }

    #[test]
    fn test_empty_documents() {
        assert_eq!(parse(""), null());
        assert_eq!(parse("# only a comment\n\n"), null());
        assert_eq!(parse("---\n...\n"), null());
    }

    #[test]
    fn test_document_markers() {
        assert_eq!(parse("---\na: 1\n...\n"), map(vec![("a", int(1))]));
        assert_eq!(parse("--- [1]\n"), seq(vec![int(1)]));
    }

    #[test]
    fn test_root_scalar() {
        assert_eq!(parse("hello\n"), string("hello"));
    }

    #[test]
    fn test_spans() {
        let node = parse("a: 1\nbb: xyz\n");
        let mapping = node.as_mapping().unwrap();
        let entry = mapping.entry("bb").unwrap();
        assert_eq!(entry.key.span(), Span::new(5..7));
        assert_eq!(entry.value.span(), Span::new(9..12));
        assert_eq!(node.span(), Span::new(0..12));
    }

    #[test]
    fn test_duplicate_keys() {
        let err = parse_node("a: 1\nb: 2\na: 3\n").unwrap_err();
        assert_eq!(err.diagnostics().len(), 1);
        let diagnostic = &err.diagnostics()[0];
        assert_eq!(diagnostic.code(), Some(ErrorCode::E006));
        assert_eq!(diagnostic.primary_span(), Some(Span::new(10..11)));
        assert_eq!(diagnostic.labels()[1].span(), Span::new(0..1));

        assert_eq!(error_codes("{a: 1, a: 2}"), vec![ErrorCode::E006]);
        assert_eq!(
            error_codes("x:\n  a: 1\n  a: 2\ny:\n  b: 1\n  b: 2\n"),
            vec![ErrorCode::E006, ErrorCode::E006]
        );
    }

    #[test]
    fn test_indentation_errors() {
        assert_eq!(error_codes("a: 1\n  b: 2\n"), vec![ErrorCode::E005]);
        assert_eq!(error_codes("  a: 1\nb: 2\n"), vec![ErrorCode::E005]);
        assert_eq!(error_codes("- 1\n  - 2\n"), vec![ErrorCode::E005]);
    }

    #[test]
    fn test_unterminated_flow() {
        assert_eq!(error_codes("a: [1, 2\n"), vec![ErrorCode::E003]);
        assert_eq!(error_codes("{\"a\": 1,"), vec![ErrorCode::E003]);
        assert_eq!(error_codes("{a:"), vec![ErrorCode::E007]);
    }

    #[test]
    fn test_same_line_nesting_is_rejected() {
        assert_eq!(error_codes("a: b: c\n"), vec![ErrorCode::E002]);
        assert_eq!(error_codes("a: - b\n"), vec![ErrorCode::E002]);
    }

    #[test]
    fn test_trailing_content() {
        assert_eq!(error_codes("[1] 2\n"), vec![ErrorCode::E002]);
        assert_eq!(error_codes("a: 1\n---\nb: 2\n"), vec![ErrorCode::E002]);
        assert_eq!(error_codes("a: 1\n- 2\n"), vec![ErrorCode::E002]);
    }

    #[test]
    fn test_lexer_errors_are_reported() {
        assert_eq!(error_codes("a: \"x\\q\"\n"), vec![ErrorCode::E004]);
    }
}
