//! Lexical analyzer for Blue documents.
//!
//! The lexer converts YAML-subset (and JSON) source text into a stream of
//! [`Token`]s. Block structure is made explicit: every non-blank line outside
//! flow collections starts with an [`Token::Indent`] carrying its indentation,
//! so the parser never has to look at raw whitespace.
//!
//! The public entry point is [`tokenize`], which performs error-recovering
//! lexical analysis and collects all diagnostics in a single pass.

use winnow::{
    Parser as _,
    combinator::{alt, cut_err, opt, preceded, repeat, terminated},
    error::{AddContext, ContextError, ErrMode, ModalResult},
    stream::{LocatingSlice, Location, Stream},
    token::{none_of, one_of, take_till, take_while},
};

use crate::{
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ParseError},
    span::Span,
    tokens::{PositionedToken, ScalarStyle, Token},
};

/// Rich diagnostic information for lexer errors.
///
/// Attached to winnow errors via `.context()` to provide detailed error
/// messages with codes, help text, and precise span information.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LexerDiagnostic {
    code: ErrorCode,
    message: &'static str,
    help: Option<&'static str>,
    /// The error span covers from `start` to the error position.
    start: usize,
}

type Input<'a> = LocatingSlice<&'a str>;
type IResult<O> = ModalResult<O, ContextError<LexerDiagnostic>>;

const VALID_ESCAPES: &str = "valid escapes: `\\0`, `\\a`, `\\b`, `\\t`, `\\n`, `\\v`, `\\f`, \
     `\\r`, `\\e`, `\\ `, `\\\"`, `\\/`, `\\\\`, `\\N`, `\\_`, `\\L`, `\\P`, `\\xXX`, \
     `\\uXXXX`, `\\UXXXXXXXX`";

/// Block scalar chomping indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chomping {
    /// `-`: no trailing line break.
    Strip,
    /// Default: a single trailing line break.
    Clip,
    /// `+`: every trailing line break.
    Keep,
}

fn cut_error(input: &Input<'_>, diagnostic: LexerDiagnostic) -> ErrMode<ContextError<LexerDiagnostic>> {
    ErrMode::Cut(ContextError::new().add_context(input, &input.checkpoint(), diagnostic))
}

fn is_flow_indicator(c: char) -> bool {
    matches!(c, ',' | '[' | ']' | '{' | '}')
}

/// Parse exactly `digits` hex digits after an escape letter.
fn hex_code(input: &mut Input<'_>, digits: usize, escape_start: usize) -> IResult<u32> {
    cut_err(take_while(digits..=digits, |c: char| c.is_ascii_hexdigit()))
        .try_map(|hex: &str| u32::from_str_radix(hex, 16))
        .context(LexerDiagnostic {
            code: ErrorCode::E004,
            message: "invalid escape sequence",
            help: Some("`\\x` takes 2, `\\u` 4, and `\\U` 8 hex digits"),
            start: escape_start,
        })
        .parse_next(input)
}

fn code_point(input: &Input<'_>, code: u32, escape_start: usize) -> IResult<char> {
    char::from_u32(code).ok_or_else(|| {
        cut_error(
            input,
            LexerDiagnostic {
                code: ErrorCode::E004,
                message: "invalid unicode code point",
                help: Some("valid range: `0x0000`-`0xD7FF` or `0xE000`-`0x10FFFF`"),
                start: escape_start,
            },
        )
    })
}

/// Parse the digits of a `\uXXXX` escape, combining UTF-16 surrogate pairs
/// written as two consecutive escapes.
fn unicode_escape(input: &mut Input<'_>, escape_start: usize) -> IResult<char> {
    let unpaired = LexerDiagnostic {
        code: ErrorCode::E004,
        message: "unpaired surrogate in unicode escape",
        help: Some("a high surrogate `\\uD800`-`\\uDBFF` must be followed by a low surrogate escape"),
        start: escape_start,
    };

    let first = hex_code(input, 4, escape_start)?;
    if !(0xD800..0xDC00).contains(&first) {
        return code_point(input, first, escape_start);
    }

    if !input.starts_with("\\u") {
        return Err(cut_error(input, unpaired));
    }
    input.next_slice(2);
    let low = hex_code(input, 4, escape_start)?;
    if !(0xDC00..0xE000).contains(&low) {
        return Err(cut_error(input, unpaired));
    }
    code_point(
        input,
        0x10000 + ((first - 0xD800) << 10) + (low - 0xDC00),
        escape_start,
    )
}

/// Parse an escape sequence in a double-quoted string, starting at `\`.
fn escape(input: &mut Input<'_>) -> IResult<char> {
    let escape_start = input.current_token_start();
    let invalid = LexerDiagnostic {
        code: ErrorCode::E004,
        message: "invalid escape sequence",
        help: Some(VALID_ESCAPES),
        start: escape_start,
    };

    '\\'.parse_next(input)?;
    let Some(letter) = input.next_token() else {
        return Err(cut_error(input, invalid));
    };

    let ch = match letter {
        '0' => '\0',
        'a' => '\u{07}',
        'b' => '\u{08}',
        't' | '\t' => '\t',
        'n' => '\n',
        'v' => '\u{0B}',
        'f' => '\u{0C}',
        'r' => '\r',
        'e' => '\u{1B}',
        ' ' => ' ',
        '"' => '"',
        '/' => '/',
        '\\' => '\\',
        'N' => '\u{85}',
        '_' => '\u{A0}',
        'L' => '\u{2028}',
        'P' => '\u{2029}',
        'x' => {
            let code = hex_code(input, 2, escape_start)?;
            code_point(input, code, escape_start)?
        }
        'u' => unicode_escape(input, escape_start)?,
        'U' => {
            let code = hex_code(input, 8, escape_start)?;
            code_point(input, code, escape_start)?
        }
        _ => return Err(cut_error(input, invalid)),
    };
    Ok(ch)
}

/// Parse a double-quoted string. Strings may not span lines.
fn double_quoted(input: &mut Input<'_>) -> IResult<String> {
    let start = input.current_token_start();
    '"'.parse_next(input)?;

    let content = repeat(0.., alt((escape, none_of(['"', '\\', '\n', '\r'])))).fold(
        String::new,
        |mut acc, ch| {
            acc.push(ch);
            acc
        },
    );

    cut_err(terminated(content, '"'))
        .context(LexerDiagnostic {
            code: ErrorCode::E003,
            message: "unterminated string",
            help: Some("add a closing `\"` on the same line"),
            start,
        })
        .parse_next(input)
}

/// Parse a single-quoted string, where `''` stands for one quote.
fn single_quoted(input: &mut Input<'_>) -> IResult<String> {
    let start = input.current_token_start();
    '\''.parse_next(input)?;

    let content = repeat(
        0..,
        alt(("''".value('\''), none_of(['\'', '\n', '\r']))),
    )
    .fold(String::new, |mut acc, ch| {
        acc.push(ch);
        acc
    });

    cut_err(terminated(content, '\''))
        .context(LexerDiagnostic {
            code: ErrorCode::E003,
            message: "unterminated string",
            help: Some("add a closing `'` on the same line"),
            start,
        })
        .parse_next(input)
}

/// Parse a plain scalar up to the next indicator, comment, or line break.
///
/// Trailing blanks are not part of the scalar. Inside flow collections the
/// flow indicators `,[]{}` also end the scalar.
fn plain_scalar<'a>(input: &mut Input<'a>, flow: bool) -> IResult<&'a str> {
    let rest: &'a str = **input;
    let mut end = 0;
    let mut prev_blank = false;

    for (i, c) in rest.char_indices() {
        let stop = match c {
            '\n' | '\r' => true,
            '#' => prev_blank,
            ':' => rest[i + 1..]
                .chars()
                .next()
                .is_none_or(|next| next.is_whitespace() || (flow && is_flow_indicator(next))),
            ',' | '[' | ']' | '{' | '}' => flow,
            _ => false,
        };
        if stop {
            break;
        }
        prev_blank = c == ' ' || c == '\t';
        if !prev_blank {
            end = i + c.len_utf8();
        }
    }

    if end == 0 {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(input.next_slice(end))
}

/// Parse a `#` comment up to the end of the line.
fn comment(input: &mut Input<'_>) -> IResult<()> {
    preceded('#', take_till(0.., ['\n', '\r']))
        .void()
        .parse_next(input)
}

/// Parse a block scalar header: `|` or `>`, then optional chomping and
/// indentation indicators in either order, then an optional comment.
fn block_scalar_header(input: &mut Input<'_>) -> IResult<(ScalarStyle, Chomping, Option<usize>)> {
    let start = input.current_token_start();
    let style = alt((
        '|'.value(ScalarStyle::Literal),
        '>'.value(ScalarStyle::Folded),
    ))
    .parse_next(input)?;

    let mut chomping = Chomping::Clip;
    let mut indent = None;
    for _ in 0..2 {
        match opt(one_of(|c: char| matches!(c, '-' | '+' | '1'..='9'))).parse_next(input)? {
            Some('-') => chomping = Chomping::Strip,
            Some('+') => chomping = Chomping::Keep,
            Some(digit) => indent = digit.to_digit(10).map(|d| d as usize),
            None => break,
        }
    }

    take_while(0.., [' ', '\t']).void().parse_next(input)?;
    opt(comment).parse_next(input)?;

    if !(input.is_empty() || input.starts_with('\n') || input.starts_with("\r\n")) {
        return Err(cut_error(
            input,
            LexerDiagnostic {
                code: ErrorCode::E002,
                message: "unexpected content after block scalar header",
                help: Some("block scalar content starts on the next line"),
                start,
            },
        ));
    }
    Ok((style, chomping, indent))
}

/// Fold block scalar lines: single line breaks between text lines become
/// spaces, blank lines and more-indented lines keep their breaks.
fn fold_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(line);
            }
            continue;
        }

        let prev = lines[i - 1];
        if line.is_empty() {
            out.push('\n');
        } else if prev.is_empty() {
            out.push_str(line);
        } else if line.starts_with([' ', '\t']) || prev.starts_with([' ', '\t']) {
            out.push('\n');
            out.push_str(line);
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

fn block_scalar_value(style: ScalarStyle, chomping: Chomping, lines: &[&str]) -> String {
    let body_len = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |i| i + 1);
    let (body, trailing) = lines.split_at(body_len);

    let mut text = match style {
        ScalarStyle::Folded => fold_lines(body),
        _ => body.join("\n"),
    };
    match chomping {
        Chomping::Strip => {}
        Chomping::Clip => {
            if !body.is_empty() {
                text.push('\n');
            }
        }
        Chomping::Keep => {
            if !body.is_empty() {
                text.push('\n');
            }
            text.extend(std::iter::repeat_n('\n', trailing.len()));
        }
    }
    text
}

/// Length of the current line, without its line break.
fn line_length(rest: &str) -> usize {
    rest.find('\n').unwrap_or(rest.len())
}

/// Consume the rest of the current line, including its line break.
fn skip_line(input: &mut Input<'_>) {
    let rest: &str = **input;
    let len = line_length(rest);
    input.next_slice((len + 1).min(rest.len()));
}

fn is_document_marker(line: &str, marker: &str) -> bool {
    line.strip_prefix(marker)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '\r']))
}

/// Lexer that accumulates tokens and diagnostics during tokenization.
struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<PositionedToken>,
    diagnostics: DiagnosticCollector,
    flow_depth: usize,
    /// Byte offset of the current line.
    line_start: usize,
    /// Indentation of the current block line.
    line_indent: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            diagnostics: DiagnosticCollector::new(),
            flow_depth: 0,
            line_start: 0,
            line_indent: 0,
            at_line_start: true,
        }
    }

    /// Tokenize the input, collecting tokens and errors.
    fn tokenize(&mut self, mut input: Input<'a>) {
        while !input.is_empty() {
            if self.at_line_start {
                self.at_line_start = false;
                self.line_start = input.current_token_start();
                if self.flow_depth == 0 {
                    self.line_prefix(&mut input);
                    continue;
                }
            }

            match self.positioned_token(&mut input) {
                Ok(Some(token)) => self.tokens.push(token),
                Ok(None) => {}
                Err(e) => {
                    let error_pos = input.current_token_start();
                    let diagnostic = self.convert_err_mode(e, error_pos);
                    self.diagnostics.emit(diagnostic);

                    // Resume on the next line; the rest of this one would
                    // only produce follow-up errors.
                    let rest: &str = *input;
                    input.next_slice(line_length(rest));
                }
            }
        }
    }

    /// Handle the start of a block-context line: measure indentation, skip
    /// blank and comment-only lines, and recognise document markers.
    fn line_prefix(&mut self, input: &mut Input<'a>) {
        let rest: &'a str = **input;
        let line = &rest[..line_length(rest)];
        let content = line.trim_start_matches([' ', '\t']);
        if content.trim_end().is_empty() || content.starts_with('#') {
            skip_line(input);
            self.at_line_start = true;
            return;
        }

        let offset = input.current_token_start();
        let spaces = line.len() - line.trim_start_matches(' ').len();
        input.next_slice(spaces);
        self.line_indent = spaces;

        let after_spaces = &line[spaces..];
        if after_spaces.starts_with('\t') {
            let tabs = after_spaces.len() - after_spaces.trim_start_matches(['\t', ' ']).len();
            let start = offset + spaces;
            self.diagnostics.emit(
                Diagnostic::error("tab character used for indentation")
                    .with_code(ErrorCode::E005)
                    .with_label(Span::new(start..start + tabs), "tab here")
                    .with_help("indent with spaces only"),
            );
            input.next_slice(tabs);
        }

        if spaces == 0 {
            let marker = if is_document_marker(line, "---") {
                Some(Token::DocumentStart)
            } else if is_document_marker(line, "...") {
                Some(Token::DocumentEnd)
            } else {
                None
            };
            if let Some(marker) = marker {
                input.next_slice(3);
                self.tokens
                    .push(PositionedToken::new(marker, Span::new(offset..offset + 3), 0));
                return;
            }
        }

        let start = offset + spaces;
        self.tokens.push(PositionedToken::new(
            Token::Indent(spaces),
            Span::new(start..start),
            spaces,
        ));
    }

    /// Whether the `#` at `offset` starts a comment.
    fn after_blank(&self, offset: usize) -> bool {
        offset == 0
            || self.source[..offset].ends_with([' ', '\t', '\n', '\r'])
    }

    /// Whether a `:` followed by `next` is a mapping value indicator.
    fn is_value_indicator(&self, next: Option<char>) -> bool {
        let flow = self.flow_depth > 0;
        match next {
            None => true,
            Some(c) if c.is_whitespace() => true,
            Some(c) if flow && is_flow_indicator(c) => true,
            _ => self
                .tokens
                .last()
                .is_some_and(|t| t.token.allows_adjacent_colon()),
        }
    }

    /// Parse a single token with position tracking.
    ///
    /// Returns `Ok(None)` for whitespace, line breaks, and comments.
    fn positioned_token(&mut self, input: &mut Input<'a>) -> IResult<Option<PositionedToken>> {
        let start = input.current_token_start();
        let rest: &'a str = **input;
        let Some(c) = rest.chars().next() else {
            return Ok(None);
        };
        let next = rest[c.len_utf8()..].chars().next();
        let flow = self.flow_depth > 0;

        let token = match c {
            ' ' | '\t' | '\r' => {
                take_while(1.., [' ', '\t', '\r']).void().parse_next(input)?;
                return Ok(None);
            }
            '\n' => {
                input.next_token();
                self.line_start = start + 1;
                if !flow {
                    self.at_line_start = true;
                }
                return Ok(None);
            }
            '#' if self.after_blank(start) => {
                comment(input)?;
                return Ok(None);
            }
            '-' if !flow && next.is_none_or(char::is_whitespace) => {
                input.next_token();
                Token::SequenceEntry
            }
            ':' if self.is_value_indicator(next) => {
                input.next_token();
                Token::Colon
            }
            '{' => {
                input.next_token();
                self.flow_depth += 1;
                Token::FlowMappingStart
            }
            '[' => {
                input.next_token();
                self.flow_depth += 1;
                Token::FlowSequenceStart
            }
            '}' if flow => {
                input.next_token();
                self.flow_depth -= 1;
                Token::FlowMappingEnd
            }
            ']' if flow => {
                input.next_token();
                self.flow_depth -= 1;
                Token::FlowSequenceEnd
            }
            ',' if flow => {
                input.next_token();
                Token::Comma
            }
            '"' => Token::Scalar(ScalarStyle::DoubleQuoted, double_quoted(input)?),
            '\'' => Token::Scalar(ScalarStyle::SingleQuoted, single_quoted(input)?),
            '|' | '>' if !flow => return self.block_scalar(input).map(Some),
            '?' | '&' | '*' | '!' | '%' | '@' | '`' => {
                return Err(cut_error(
                    input,
                    LexerDiagnostic {
                        code: ErrorCode::E002,
                        message: "unsupported YAML syntax",
                        help: Some(
                            "anchors, aliases, tags, directives, and complex keys are not supported",
                        ),
                        start,
                    },
                ));
            }
            '}' | ']' | ',' | '|' | '>' => {
                return Err(cut_error(
                    input,
                    LexerDiagnostic {
                        code: ErrorCode::E002,
                        message: "unexpected character",
                        help: None,
                        start,
                    },
                ));
            }
            _ => Token::Scalar(ScalarStyle::Plain, plain_scalar(input, flow)?.to_string()),
        };

        let end = input.current_token_start();
        Ok(Some(PositionedToken::new(
            token,
            Span::new(start..end),
            start - self.line_start,
        )))
    }

    /// Parse a `|` or `>` block scalar with its content lines.
    ///
    /// Content lines must be indented deeper than the line holding the
    /// header. The first content line fixes the content indentation unless
    /// an explicit indentation indicator is given.
    fn block_scalar(&mut self, input: &mut Input<'a>) -> IResult<PositionedToken> {
        let start = input.current_token_start();
        let column = start - self.line_start;
        let (style, chomping, explicit) = block_scalar_header(input)?;
        let mut end = input.current_token_start();

        let parent = self.line_indent;
        let mut content_indent = explicit.map(|d| parent + d);
        let mut lines: Vec<&'a str> = Vec::new();

        if !input.is_empty() {
            skip_line(input);
        }
        loop {
            let rest: &'a str = **input;
            if rest.is_empty() {
                break;
            }
            let raw = &rest[..line_length(rest)];
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let spaces = line.len() - line.trim_start_matches(' ').len();

            if line.trim().is_empty() {
                lines.push("");
            } else {
                let indent = match content_indent {
                    Some(indent) => indent,
                    None if spaces > parent => *content_indent.insert(spaces),
                    None => break,
                };
                if spaces < indent {
                    break;
                }
                lines.push(&line[indent..]);
                end = input.current_token_start() + line.len();
            }
            skip_line(input);
        }
        self.at_line_start = true;

        let value = block_scalar_value(style, chomping, &lines);
        Ok(PositionedToken::new(
            Token::Scalar(style, value),
            Span::new(start..end),
            column,
        ))
    }

    /// Finish lexing and return tokens or collected errors.
    fn finish(self) -> Result<Vec<PositionedToken>, ParseError> {
        self.diagnostics.finish().map(|_| self.tokens)
    }

    /// Convert an ErrMode and error position to a Diagnostic.
    ///
    /// Extracts `LexerDiagnostic` from the error context for rich error info
    /// with code, message, and help. Falls back to E002 (unexpected character)
    /// if no diagnostic context is found.
    fn convert_err_mode(
        &self,
        err: ErrMode<ContextError<LexerDiagnostic>>,
        error_pos: usize,
    ) -> Diagnostic {
        let context_error = match err {
            ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx,
            ErrMode::Incomplete(_) => ContextError::new(),
        };
        let clamp = |end: usize| end.min(self.source.len());

        if let Some(LexerDiagnostic {
            code,
            message,
            help,
            start,
        }) = context_error.context().next()
        {
            let span = Span::new(*start..clamp(error_pos.max(start + 1)));

            let mut diag = Diagnostic::error(*message)
                .with_code(*code)
                .with_label(span, code.description());
            if let Some(h) = help {
                diag = diag.with_help(*h);
            }
            return diag;
        }

        let span = Span::new(error_pos..clamp(error_pos.saturating_add(1)));
        Diagnostic::error("unexpected character")
            .with_code(ErrorCode::E002)
            .with_label(span, ErrorCode::E002.description())
    }
}

/// Tokenize a document, collecting every lexical error.
///
/// # Returns
///
/// - `Ok(tokens)` - All tokens successfully scanned
/// - `Err(ParseError)` - One or more errors occurred; contains all diagnostics
pub fn tokenize(source: &str) -> Result<Vec<PositionedToken>, ParseError> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize(LocatingSlice::new(source));
    lexer.finish()
}


#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    /// Strategy for plain keys that never need quoting.
    fn plain_key_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_-]{0,15}"
    }

    /// Strategy for arbitrary single-line text to put in double quotes.
    fn quoted_text_strategy() -> impl Strategy<Value = String> {
        "[^\"\\\\\n\r]{0,20}"
    }

    // ===================
    // Property Test Functions
    // ===================

    /// A `key: value` line yields exactly indent, key, colon, value.
    fn check_plain_pair_tokenizes(key: &str, value: &str) -> Result<(), TestCaseError> {
        let source = format!("{key}: {value}\n");
        let tokens = tokenize(&source).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let kinds: Vec<Token> = tokens.into_iter().map(|t| t.token).collect();

        prop_assert_eq!(
            kinds,
            vec![
                Token::Indent(0),
                Token::Scalar(ScalarStyle::Plain, key.to_string()),
                Token::Colon,
                Token::Scalar(ScalarStyle::Plain, value.to_string()),
            ]
        );
        Ok(())
    }

    /// Double-quoted text without escapes comes back unchanged.
    fn check_quoted_text_roundtrips(text: &str) -> Result<(), TestCaseError> {
        let source = format!("\"{text}\"");
        let tokens = tokenize(&source).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let scalar = tokens.into_iter().find_map(|t| match t.token {
            Token::Scalar(ScalarStyle::DoubleQuoted, value) => Some(value),
            _ => None,
        });
        prop_assert_eq!(scalar.as_deref(), Some(text));
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn plain_pairs_tokenize(key in plain_key_strategy(), value in plain_key_strategy()) {
            check_plain_pair_tokenizes(&key, &value)?;
        }

        #[test]
        fn quoted_text_roundtrips(text in quoted_text_strategy()) {
            check_quoted_text_roundtrips(&text)?;
        }
    }
}
