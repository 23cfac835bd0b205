//! Recursive descent parser for executable GraphQL documents.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use rxgql_core::{LineIndex, SourceLocation, Span};
use std::sync::Arc;
use thiserror::Error;

/// A parse failure with its source position.
#[derive(Debug, Clone, Error)]
#[error("Syntax error: {message} ({location})")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    pub location: ParseErrorLocation,
}

/// Line/column of a parse error, kept separate so the error formats without
/// a source string in hand.
#[derive(Debug, Clone, Copy)]
pub struct ParseErrorLocation(pub SourceLocation);

impl std::fmt::Display for ParseErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.0.line, self.0.column)
    }
}

/// A parsed document together with its line index, so located errors can
/// render line/column positions during execution.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub document: Document,
    pub line_index: Arc<LineIndex>,
}

/// Parses a source string into an executable document.
pub fn parse(source: &str) -> Result<ParsedDocument, ParseError> {
    let line_index = Arc::new(LineIndex::new(source));
    let mut parser = Parser::new(source);
    match parser.parse_document() {
        Ok(document) => Ok(ParsedDocument {
            document,
            line_index,
        }),
        Err(raw) => Err(ParseError {
            location: ParseErrorLocation(line_index.location(raw.span.start)),
            message: raw.message,
            span: raw.span,
        }),
    }
}

/// Internal error before the line index is applied.
struct RawError {
    message: String,
    span: Span,
}

type ParseResult<T> = Result<T, RawError>;

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self { lexer, current }
    }

    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(RawError {
            message: message.into(),
            span: self.current.span,
        })
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        if self.at_kind(kind) {
            let span = self.current.span;
            self.advance();
            Ok(span)
        } else {
            self.error(format!("expected {}, found {}", kind, self.at()))
        }
    }

    /// Parses a name; keyword tokens are accepted in name position.
    fn parse_name(&mut self) -> ParseResult<Name> {
        if self.at().is_name_like() {
            let name = Name::new(self.current_text(), self.current.span);
            self.advance();
            Ok(name)
        } else {
            self.error(format!("expected a name, found {}", self.at()))
        }
    }

    fn parse_document(&mut self) -> ParseResult<Document> {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        while !self.at_kind(TokenKind::Eof) {
            definitions.push(self.parse_definition()?);
        }

        if definitions.is_empty() {
            return self.error("document must contain at least one definition");
        }

        let end = self.current.span.end;
        Ok(Document {
            definitions,
            span: Span::new(start, end),
        })
    }

    fn parse_definition(&mut self) -> ParseResult<Definition> {
        match self.at() {
            TokenKind::Query | TokenKind::Mutation | TokenKind::LBrace => {
                Ok(Definition::Operation(self.parse_operation()?))
            }
            TokenKind::Subscription => self.error("subscription operations are not supported"),
            TokenKind::Fragment => Ok(Definition::Fragment(self.parse_fragment_definition()?)),
            _ => self.error(format!(
                "expected an operation or fragment definition, found {}",
                self.at()
            )),
        }
    }

    fn parse_operation(&mut self) -> ParseResult<OperationDefinition> {
        let start = self.current.span.start;

        let (kind, name, variables) = if self.at_kind(TokenKind::LBrace) {
            // Shorthand query: `{ ... }`
            (OperationKind::Query, None, Vec::new())
        } else {
            let kind = match self.at() {
                TokenKind::Query => OperationKind::Query,
                TokenKind::Mutation => OperationKind::Mutation,
                _ => unreachable!("checked by parse_definition"),
            };
            self.advance();

            let name = if self.at().is_name_like() {
                Some(self.parse_name()?)
            } else {
                None
            };

            let variables = if self.at_kind(TokenKind::LParen) {
                self.parse_variable_definitions()?
            } else {
                Vec::new()
            };

            (kind, name, variables)
        };

        let selection_set = self.parse_selection_set()?;
        let end = selection_set.span.end;

        Ok(OperationDefinition {
            kind,
            name,
            variables,
            selection_set,
            span: Span::new(start, end),
        })
    }

    fn parse_variable_definitions(&mut self) -> ParseResult<Vec<VariableDefinition>> {
        self.expect(TokenKind::LParen)?;

        let mut variables = Vec::new();
        while !self.at_kind(TokenKind::RParen) {
            if self.at_kind(TokenKind::Eof) {
                return self.error("unterminated variable definitions");
            }
            variables.push(self.parse_variable_definition()?);
        }
        self.expect(TokenKind::RParen)?;

        Ok(variables)
    }

    fn parse_variable_definition(&mut self) -> ParseResult<VariableDefinition> {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar)?;
        let name = self.parse_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true)?)
        } else {
            None
        };

        let end = default_value
            .as_ref()
            .map_or(ty.span().end, |value| value.span().end);

        Ok(VariableDefinition {
            name,
            ty,
            default_value,
            span: Span::new(start, end),
        })
    }

    fn parse_type(&mut self) -> ParseResult<Type> {
        let start = self.current.span.start;

        let inner = if self.at_kind(TokenKind::LBracket) {
            self.advance();
            let item = self.parse_type()?;
            let close = self.expect(TokenKind::RBracket)?;
            Type::List(Box::new(item), Span::new(start, close.end))
        } else {
            Type::Named(self.parse_name()?)
        };

        if self.at_kind(TokenKind::Bang) {
            let bang = self.current.span;
            self.advance();
            Ok(Type::NonNull(Box::new(inner), Span::new(start, bang.end)))
        } else {
            Ok(inner)
        }
    }

    fn parse_selection_set(&mut self) -> ParseResult<SelectionSet> {
        let open = self.expect(TokenKind::LBrace)?;

        let mut selections = Vec::new();
        while !self.at_kind(TokenKind::RBrace) {
            if self.at_kind(TokenKind::Eof) {
                return self.error("unterminated selection set");
            }
            selections.push(self.parse_selection()?);
        }
        let close = self.expect(TokenKind::RBrace)?;

        if selections.is_empty() {
            return Err(RawError {
                message: "selection set must not be empty".to_string(),
                span: Span::new(open.start, close.end),
            });
        }

        Ok(SelectionSet {
            selections,
            span: Span::new(open.start, close.end),
        })
    }

    fn parse_selection(&mut self) -> ParseResult<Selection> {
        if self.at_kind(TokenKind::Spread) {
            let start = self.current.span.start;
            self.advance();

            if self.at_kind(TokenKind::On) || self.at_kind(TokenKind::LBrace) {
                // Inline fragment
                let type_condition = if self.at_kind(TokenKind::On) {
                    self.advance();
                    Some(self.parse_name()?)
                } else {
                    None
                };
                let selection_set = self.parse_selection_set()?;
                let end = selection_set.span.end;
                return Ok(Selection::InlineFragment(InlineFragment {
                    type_condition,
                    selection_set,
                    span: Span::new(start, end),
                }));
            }

            let name = self.parse_name()?;
            let end = name.span.end;
            return Ok(Selection::FragmentSpread(FragmentSpread {
                name,
                span: Span::new(start, end),
            }));
        }

        Ok(Selection::Field(self.parse_field()?))
    }

    fn parse_field(&mut self) -> ParseResult<FieldNode> {
        let start = self.current.span.start;
        let first = self.parse_name()?;

        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first), self.parse_name()?)
        } else {
            (None, first)
        };

        let arguments = if self.at_kind(TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        if self.at_kind(TokenKind::At) {
            return self.error("directives on selections are not supported");
        }

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        let end = selection_set
            .as_ref()
            .map(|set| set.span.end)
            .or_else(|| arguments.last().map(|arg| arg.span.end))
            .unwrap_or(name.span.end);

        Ok(FieldNode {
            alias,
            name,
            arguments,
            selection_set,
            span: Span::new(start, end),
        })
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Argument>> {
        self.expect(TokenKind::LParen)?;

        let mut arguments = Vec::new();
        while !self.at_kind(TokenKind::RParen) {
            if self.at_kind(TokenKind::Eof) {
                return self.error("unterminated argument list");
            }
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value(false)?;
            let span = Span::new(name.span.start, value.span().end);
            arguments.push(Argument { name, value, span });
        }
        self.expect(TokenKind::RParen)?;

        Ok(arguments)
    }

    fn parse_fragment_definition(&mut self) -> ParseResult<FragmentDefinition> {
        let start = self.current.span.start;
        self.advance(); // fragment

        if self.at_kind(TokenKind::On) {
            return self.error("fragment name must not be 'on'");
        }
        let name = self.parse_name()?;
        self.expect(TokenKind::On)?;
        let type_condition = self.parse_name()?;
        let selection_set = self.parse_selection_set()?;
        let end = selection_set.span.end;

        Ok(FragmentDefinition {
            name,
            type_condition,
            selection_set,
            span: Span::new(start, end),
        })
    }

    /// Parses a value literal. Variables are rejected in const position
    /// (variable defaults).
    fn parse_value(&mut self, const_only: bool) -> ParseResult<Value> {
        let span = self.current.span;
        match self.at() {
            TokenKind::Dollar => {
                if const_only {
                    return self.error("variables are not allowed in default values");
                }
                self.advance();
                let name = self.parse_name()?;
                Ok(Value::Variable(name))
            }
            TokenKind::IntLiteral => {
                let text = self.current_text();
                let parsed = text.parse::<i64>().map_err(|_| RawError {
                    message: format!("integer literal '{text}' out of range"),
                    span,
                })?;
                self.advance();
                Ok(Value::Int(parsed, span))
            }
            TokenKind::FloatLiteral => {
                let text = self.current_text();
                let parsed = text.parse::<f64>().map_err(|_| RawError {
                    message: format!("invalid float literal '{text}'"),
                    span,
                })?;
                self.advance();
                Ok(Value::Float(parsed, span))
            }
            TokenKind::StringLiteral => {
                let decoded = decode_string(self.current_text()).map_err(|message| RawError {
                    message,
                    span,
                })?;
                self.advance();
                Ok(Value::String(decoded, span))
            }
            TokenKind::BlockStringLiteral => {
                let decoded = decode_block_string(self.current_text());
                self.advance();
                Ok(Value::String(decoded, span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Value::Boolean(true, span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Value::Boolean(false, span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::Null(span))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.at_kind(TokenKind::RBracket) {
                    if self.at_kind(TokenKind::Eof) {
                        return self.error("unterminated list value");
                    }
                    items.push(self.parse_value(const_only)?);
                }
                let close = self.expect(TokenKind::RBracket)?;
                Ok(Value::List(items, Span::new(span.start, close.end)))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                while !self.at_kind(TokenKind::RBrace) {
                    if self.at_kind(TokenKind::Eof) {
                        return self.error("unterminated object value");
                    }
                    let name = self.parse_name()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_value(const_only)?;
                    fields.push((name, value));
                }
                let close = self.expect(TokenKind::RBrace)?;
                Ok(Value::Object(fields, Span::new(span.start, close.end)))
            }
            kind if kind.is_name_like() => {
                let name = self.parse_name()?;
                Ok(Value::Enum(name))
            }
            _ => self.error(format!("expected a value, found {}", self.at())),
        }
    }
}

/// Decodes a quoted string literal, resolving escape sequences.
fn decode_string(raw: &str) -> Result<String, String> {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let digits: String = chars.by_ref().take(4).collect();
                if digits.len() != 4 {
                    return Err("truncated unicode escape".to_string());
                }
                let code = u32::from_str_radix(&digits, 16)
                    .map_err(|_| format!("invalid unicode escape '\\u{digits}'"))?;
                match char::from_u32(code) {
                    Some(decoded) => out.push(decoded),
                    None => return Err(format!("invalid unicode escape '\\u{digits}'")),
                }
            }
            Some(other) => return Err(format!("invalid escape sequence '\\{other}'")),
            None => return Err("dangling escape at end of string".to_string()),
        }
    }

    Ok(out)
}

/// Decodes a block string literal: strips the triple quotes and common
/// leading indentation.
fn decode_block_string(raw: &str) -> String {
    let inner = &raw[3..raw.len() - 3];
    let lines: Vec<&str> = inner.split('\n').collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out.push((*line).to_string());
        } else {
            out.push(line.get(common_indent..).unwrap_or("").to_string());
        }
    }

    // Trim leading/trailing blank lines.
    while out.first().is_some_and(|line| line.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|line| line.trim().is_empty()) {
        out.pop();
    }

    out.join("\n").replace("\\\"\"\"", "\"\"\"")
}
