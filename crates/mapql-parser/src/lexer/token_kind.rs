use std::fmt;

/// The kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A bare word: keywords, set names, unquoted keys and values.
    Ident,
    /// An unsigned integer literal.
    Int,
    /// An unsigned decimal literal with a fractional part.
    Decimal,
    /// A single- or double-quoted string literal.
    Str,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LCurly,
    RCurly,
    Semicolon,
    Comma,
    Dot,
    Colon,
    ColonColon,
    Eq,
    NotEq,
    Tilde,
    NotTilde,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    LtLt,
    Gt,
    GtGt,
    Bang,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Decimal => "decimal",
            TokenKind::Str => "string",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LCurly => "{",
            TokenKind::RCurly => "}",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "!=",
            TokenKind::Tilde => "~",
            TokenKind::NotTilde => "!~",
            TokenKind::Arrow => "->",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Lt => "<",
            TokenKind::LtLt => "<<",
            TokenKind::Gt => ">",
            TokenKind::GtGt => ">>",
            TokenKind::Bang => "!",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}
