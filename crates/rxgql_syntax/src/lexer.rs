//! Lexer for executable GraphQL documents.

use crate::token::{Token, TokenKind};
use rxgql_core::Span;

/// A lexer over a GraphQL source string.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos as usize).copied()
    }

    #[inline]
    fn peek_at(&self, offset: u32) -> Option<u8> {
        self.bytes.get((self.pos + offset) as usize).copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
    }

    #[inline]
    fn advance_by(&mut self, n: u32) {
        self.pos += n;
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.pos;

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, Span::at(start));
        };

        let kind = match c {
            b'{' => {
                self.advance();
                TokenKind::LBrace
            }
            b'}' => {
                self.advance();
                TokenKind::RBrace
            }
            b'(' => {
                self.advance();
                TokenKind::LParen
            }
            b')' => {
                self.advance();
                TokenKind::RParen
            }
            b'[' => {
                self.advance();
                TokenKind::LBracket
            }
            b']' => {
                self.advance();
                TokenKind::RBracket
            }
            b':' => {
                self.advance();
                TokenKind::Colon
            }
            b'.' => {
                if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
                    self.advance_by(3);
                    TokenKind::Spread
                } else {
                    self.advance();
                    TokenKind::Error
                }
            }
            b'=' => {
                self.advance();
                TokenKind::Eq
            }
            b'@' => {
                self.advance();
                TokenKind::At
            }
            b'!' => {
                self.advance();
                TokenKind::Bang
            }
            b'$' => {
                self.advance();
                TokenKind::Dollar
            }
            b'|' => {
                self.advance();
                TokenKind::Pipe
            }
            b'&' => {
                self.advance();
                TokenKind::Amp
            }

            b'"' => self.scan_string(),

            b'-' | b'0'..=b'9' => self.scan_number(),

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_name(),

            _ => {
                self.advance();
                TokenKind::Error
            }
        };

        Token::new(kind, Span::new(start, self.pos))
    }

    /// Skips whitespace, commas, and comments.
    ///
    /// Commas are insignificant in GraphQL and treated as trivia.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n' | b',') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(0xEF) if self.peek_at(1) == Some(0xBB) && self.peek_at(2) == Some(0xBF) => {
                    // UTF-8 BOM
                    self.advance_by(3);
                }
                _ => break,
            }
        }
    }

    /// Scans a name or keyword.
    fn scan_name(&mut self) -> TokenKind {
        let start = self.pos;

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start as usize..self.pos as usize];
        TokenKind::from_keyword(text).unwrap_or(TokenKind::Name)
    }

    /// Scans an int or float literal.
    fn scan_number(&mut self) -> TokenKind {
        let mut is_float = false;

        if self.peek() == Some(b'-') {
            self.advance();
        }

        if self.peek() == Some(b'0') {
            self.advance();
        } else {
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if let Some(b'e' | b'E') = self.peek() {
            is_float = true;
            self.advance();
            if let Some(b'+' | b'-') = self.peek() {
                self.advance();
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        }
    }

    /// Scans a string literal, including block strings.
    fn scan_string(&mut self) -> TokenKind {
        self.advance(); // opening quote

        if self.peek() == Some(b'"') && self.peek_at(1) == Some(b'"') {
            self.advance_by(2);
            return self.scan_block_string();
        }

        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return TokenKind::Error;
                }
                Some(b'"') => {
                    self.advance();
                    return TokenKind::StringLiteral;
                }
                Some(b'\\') => {
                    self.advance();
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn scan_block_string(&mut self) -> TokenKind {
        loop {
            match self.peek() {
                None => {
                    return TokenKind::Error;
                }
                Some(b'"') if self.peek_at(1) == Some(b'"') && self.peek_at(2) == Some(b'"') => {
                    self.advance_by(3);
                    return TokenKind::BlockStringLiteral;
                }
                Some(b'\\')
                    if self.peek_at(1) == Some(b'"')
                        && self.peek_at(2) == Some(b'"')
                        && self.peek_at(3) == Some(b'"') =>
                {
                    self.advance_by(4);
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Returns the source text at the given span.
    pub fn span_text(&self, span: Span) -> &'a str {
        &self.source[span.start as usize..span.end as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let eof = token.is_eof();
            out.push(token.kind);
            if eof {
                break;
            }
        }
        out
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("{ } ( ) [ ] : ... = @ ! $"),
            vec![
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Colon,
                TokenKind::Spread,
                TokenKind::Eq,
                TokenKind::At,
                TokenKind::Bang,
                TokenKind::Dollar,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            kinds("query mutation fragment on launched"),
            vec![
                TokenKind::Query,
                TokenKind::Mutation,
                TokenKind::Fragment,
                TokenKind::On,
                TokenKind::Name,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 -17 3.14 1e10 2.5e-3"),
            vec![
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""hello" """block""""#),
            vec![
                TokenKind::StringLiteral,
                TokenKind::BlockStringLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_commas_and_comments_are_trivia() {
        assert_eq!(
            kinds("{ a, b } # trailing comment"),
            vec![
                TokenKind::LBrace,
                TokenKind::Name,
                TokenKind::Name,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            kinds("\"oops"),
            vec![TokenKind::Error, TokenKind::Eof]
        );
    }

    #[test]
    fn test_lone_dot_is_error() {
        assert_eq!(kinds(".."), vec![TokenKind::Error, TokenKind::Error, TokenKind::Eof]);
    }
}
