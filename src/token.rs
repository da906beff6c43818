//! The token definition for the backend query-string language.

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords (upper case only, like the backend)
    And, // "AND"
    Or,  // "OR"
    Not, // "NOT"
    To,  // "TO", only meaningful inside a range

    // Literals
    Word(&'a str),   // Anything unquoted: terms, field names, wildcards, escapes
    String(&'a str), // The content of a quoted phrase, without the quotes

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }
    Colon,    // :

    // Special
    Illegal, // An unterminated phrase
}

impl TokenKind<'_> {
    pub fn is_union(&self) -> bool {
        matches!(self, TokenKind::And | TokenKind::Or | TokenKind::Not)
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
