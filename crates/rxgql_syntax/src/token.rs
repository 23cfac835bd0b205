//! Token kinds and structures for executable GraphQL documents.

use rxgql_core::Span;

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    // Special tokens
    Eof,
    Error,

    // Literals
    Name,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BlockStringLiteral,

    // Keywords
    Query,
    Mutation,
    Subscription,
    Fragment,
    On,
    True,
    False,
    Null,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Spread,
    Eq,
    At,
    Bang,
    Dollar,
    Pipe,
    Amp,
}

impl TokenKind {
    /// Keyword tokens double as names in name position (`query { on }` is
    /// legal GraphQL).
    #[must_use]
    pub const fn is_name_like(self) -> bool {
        matches!(
            self,
            Self::Name
                | Self::Query
                | Self::Mutation
                | Self::Subscription
                | Self::Fragment
                | Self::On
                | Self::True
                | Self::False
                | Self::Null
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eof => "<eof>",
            Self::Error => "<error>",
            Self::Name => "<name>",
            Self::IntLiteral => "<int>",
            Self::FloatLiteral => "<float>",
            Self::StringLiteral => "<string>",
            Self::BlockStringLiteral => "<block-string>",
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
            Self::Fragment => "fragment",
            Self::On => "on",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Colon => ":",
            Self::Spread => "...",
            Self::Eq => "=",
            Self::At => "@",
            Self::Bang => "!",
            Self::Dollar => "$",
            Self::Pipe => "|",
            Self::Amp => "&",
        }
    }

    #[must_use]
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            "fragment" => Some(Self::Fragment),
            "on" => Some(Self::On),
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            "null" => Some(Self::Null),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A token with its kind and source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    #[must_use]
    #[inline]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    #[must_use]
    #[inline]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
