pub(crate) mod grammar;

use crate::error::Error;
use crate::lexer::{self, Token, TokenKind};
use crate::limit::LimitTracker;
use crate::stmt::{AttrMap, Factory, Statement};

/// The outcome of parsing one script, from either surface syntax.
///
/// The tree is built best-effort: `root` is present whenever enough of the
/// input survived, while `errors` collects everything that went wrong.
/// Callers must refuse to evaluate a script whose error list is nonempty.
#[derive(Debug)]
pub struct ParsedScript {
    pub root: Option<Statement>,
    pub errors: Vec<Error>,
}

impl ParsedScript {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parses query language source into a statement tree.
pub fn parse_script(input: &str) -> ParsedScript {
    let mut parser = Parser::new(input);
    let root = grammar::script(&mut parser);
    ParsedScript {
        root,
        errors: parser.errors,
    }
}

/// Token cursor shared by all grammar functions.
pub(crate) struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    pub(crate) errors: Vec<Error>,
    pub(crate) factory: Factory,
    pub(crate) depth: LimitTracker,
    /// True once a `[bbox:…]` header was seen; permits empty queries.
    pub(crate) global_bbox: bool,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        let (tokens, errors) = lexer::tokenize(input);
        Self {
            tokens,
            pos: 0,
            errors,
            factory: Factory::new(),
            depth: LimitTracker::default(),
            global_bbox: false,
        }
    }

    /// True while the cursor has not reached the end of input.
    pub(crate) fn good(&self) -> bool {
        self.peek() != TokenKind::Eof
    }

    pub(crate) fn current(&self) -> &Token<'a> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek(&self) -> TokenKind {
        self.current().kind()
    }

    pub(crate) fn data(&self) -> &'a str {
        self.current().data()
    }

    pub(crate) fn line(&self) -> u32 {
        self.current().line()
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    /// The kind of the token after the current one.
    pub(crate) fn next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind())
            .unwrap_or(TokenKind::Eof)
    }

    /// True when the current token is the bare word `word`.
    pub(crate) fn at_word(&self, word: &str) -> bool {
        self.peek() == TokenKind::Ident && self.data() == word
    }

    pub(crate) fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Records a parse error at the current token.
    pub(crate) fn err(&mut self, message: impl Into<String>) {
        let data = if self.good() { self.data() } else { "" };
        let err = Error::parse(message.into(), data.to_string(), self.line());
        self.errors.push(err);
    }

    /// Records a factory error (usually static) without aborting the parse.
    pub(crate) fn record(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Runs the factory and converts a failure into a recorded error.
    pub(crate) fn create(&mut self, name: &str, line: u32, attrs: AttrMap) -> Option<Statement> {
        match self.factory.create(name, line, &attrs) {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.record(err);
                None
            }
        }
    }

    /// Steps over tokens until one of `sentinels` is found, reporting the
    /// first stepped-over token as a parse error. With `consume_last` the
    /// sentinel itself is consumed as well.
    pub(crate) fn clear_until_after(&mut self, sentinels: &[TokenKind], consume_last: bool) {
        let mut reported = false;
        while self.good() {
            if sentinels.contains(&self.peek()) {
                if consume_last {
                    self.advance();
                }
                return;
            }
            if !reported {
                self.err(format!("Unexpected token \"{}\"", self.data()));
                reported = true;
            }
            self.advance();
        }
    }

    /// Reads an identifier, or reports what was expected instead.
    pub(crate) fn get_identifier_token(&mut self, expectation: &str) -> String {
        if self.at(TokenKind::Ident) {
            let text = self.data().to_string();
            self.advance();
            text
        } else {
            self.err(format!(
                "{expectation} expected - \"{}\" found",
                self.data()
            ));
            String::new()
        }
    }

    /// Reads any word-like token: identifier, number, or quoted string.
    pub(crate) fn get_text_token(&mut self, expectation: &str) -> String {
        match self.peek() {
            TokenKind::Ident | TokenKind::Int | TokenKind::Decimal => {
                let text = self.data().to_string();
                self.advance();
                text
            }
            TokenKind::Str => {
                let text = lexer::unquote(self.data());
                self.advance();
                text
            }
            _ => {
                self.err(format!(
                    "{expectation} expected - \"{}\" found",
                    self.data()
                ));
                String::new()
            }
        }
    }

    /// Reads a possibly negative numeric literal.
    pub(crate) fn get_number_token(&mut self, expectation: &str) -> String {
        let negative = self.at(TokenKind::Minus);
        if negative {
            self.advance();
        }
        match self.peek() {
            TokenKind::Int | TokenKind::Decimal => {
                let mut text = String::new();
                if negative {
                    text.push('-');
                }
                text.push_str(self.data());
                self.advance();
                text
            }
            _ => {
                self.err(format!(
                    "{expectation} expected - \"{}\" found",
                    self.data()
                ));
                String::new()
            }
        }
    }

    /// `-> .name` redirect; defaults to the implicit set.
    pub(crate) fn probe_into(&mut self) -> String {
        if self.good() && self.at(TokenKind::Arrow) {
            self.advance();
            self.clear_until_after(&[TokenKind::Dot], true);
            if self.good() {
                return self.get_identifier_token("Variable");
            }
        }
        "_".to_string()
    }

    /// `.name` input set; defaults to the implicit set.
    pub(crate) fn probe_from(&mut self) -> String {
        if self.good() && self.at(TokenKind::Dot) {
            self.advance();
            if self.good() {
                return self.get_identifier_token("Variable");
            }
        }
        "_".to_string()
    }
}
