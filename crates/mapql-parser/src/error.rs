use std::fmt;

/// The processing stage that rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input byte sequence itself was invalid.
    Encoding,
    /// The token stream did not match the grammar.
    Parse,
    /// The tree was built but a node is ill-formed: unknown kind or
    /// attribute, bad attribute value, impossible recursion.
    Static,
}

impl ErrorKind {
    fn word(self) -> &'static str {
        match self {
            ErrorKind::Encoding => "encoding",
            ErrorKind::Parse => "parse",
            ErrorKind::Static => "static",
        }
    }
}

/// An error produced while lexing, parsing, or constructing statements.
///
/// Errors are accumulated rather than returned eagerly: the parser keeps
/// building as much of the tree as it can, and callers decide afterwards
/// whether the recorded errors forbid evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub(crate) kind: ErrorKind,
    pub(crate) message: String,
    pub(crate) data: String,
    pub(crate) line: u32,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: String, data: String, line: u32) -> Self {
        Self {
            kind,
            message,
            data,
            line,
        }
    }

    pub(crate) fn parse(message: String, data: String, line: u32) -> Self {
        Self::new(ErrorKind::Parse, message, data, line)
    }

    pub(crate) fn invalid(message: String, line: u32) -> Self {
        Self::new(ErrorKind::Static, message, String::new(), line)
    }

    pub(crate) fn encoding(message: String) -> Self {
        Self::new(ErrorKind::Encoding, message, String::new(), 0)
    }

    /// Which stage rejected the input.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending source text, if the lexer or parser saw one.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The 1-based source line, 0 when no line applies.
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ErrorKind::Encoding {
            write!(f, "encoding error: {}", self.message)
        } else {
            write!(
                f,
                "line {}: {} error: {}",
                self.line,
                self.kind.word(),
                self.message
            )
        }
    }
}

impl std::error::Error for Error {}
