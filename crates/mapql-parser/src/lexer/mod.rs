mod cursor;
mod token;
mod token_kind;

use crate::Error;
use cursor::Cursor;

pub use token::Token;
pub use token_kind::TokenKind;

/// Turns query source text into a token vector.
///
/// Lexing never stops early: malformed input produces an error and the
/// lexer resynchronizes on the next character, so the parser always sees
/// a terminated token stream.
pub(crate) fn tokenize(input: &str) -> (Vec<Token<'_>>, Vec<Error>) {
    let mut cursor = Cursor::new(input);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    loop {
        skip_trivia(&mut cursor, &mut errors);
        let index = cursor.offset();
        let line = cursor.line();
        let column = cursor.column();
        let first = match cursor.bump() {
            Some(c) => c,
            None => {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    data: "",
                    index,
                    line,
                    column,
                });
                break;
            }
        };

        let kind = match first {
            c if is_ident_start(c) => {
                cursor.eat_while(is_ident_char);
                TokenKind::Ident
            }
            c if c.is_ascii_digit() => number(&mut cursor),
            '"' | '\'' => {
                string_literal(&mut cursor, first, line, &mut errors);
                TokenKind::Str
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LCurly,
            '}' => TokenKind::RCurly,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => {
                if cursor.eatc(':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            '=' => TokenKind::Eq,
            '~' => TokenKind::Tilde,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '-' => {
                if cursor.eatc('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '!' => {
                if cursor.eatc('=') {
                    TokenKind::NotEq
                } else if cursor.eatc('~') {
                    TokenKind::NotTilde
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if cursor.eatc('<') {
                    TokenKind::LtLt
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if cursor.eatc('>') {
                    TokenKind::GtGt
                } else {
                    TokenKind::Gt
                }
            }
            c => {
                errors.push(Error::parse(
                    format!("Unexpected character '{c}'"),
                    c.to_string(),
                    line,
                ));
                continue;
            }
        };

        tokens.push(Token {
            kind,
            data: cursor.slice(index),
            index,
            line,
            column,
        });
    }

    (tokens, errors)
}

fn skip_trivia(cursor: &mut Cursor<'_>, errors: &mut Vec<Error>) {
    loop {
        match cursor.first() {
            Some(c) if c.is_whitespace() => {
                cursor.bump();
            }
            Some('/') if cursor.second() == Some('/') => {
                cursor.eat_while(|c| c != '\n');
            }
            Some('/') if cursor.second() == Some('*') => {
                let line = cursor.line();
                cursor.bump();
                cursor.bump();
                let mut closed = false;
                while let Some(c) = cursor.bump() {
                    if c == '*' && cursor.eatc('/') {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    errors.push(Error::parse(
                        "Unterminated block comment".to_string(),
                        String::new(),
                        line,
                    ));
                }
            }
            _ => break,
        }
    }
}

fn number(cursor: &mut Cursor<'_>) -> TokenKind {
    cursor.eat_while(|c| c.is_ascii_digit());
    // A dot only belongs to the number when a digit follows; `12.foo`
    // keeps the dot as punctuation for set access.
    if cursor.first() == Some('.') && cursor.second().is_some_and(|c| c.is_ascii_digit()) {
        cursor.bump();
        cursor.eat_while(|c| c.is_ascii_digit());
        TokenKind::Decimal
    } else {
        TokenKind::Int
    }
}

fn string_literal(cursor: &mut Cursor<'_>, quote: char, line: u32, errors: &mut Vec<Error>) {
    loop {
        match cursor.bump() {
            Some(c) if c == quote => return,
            Some('\\') => {
                match cursor.bump() {
                    Some('\\') | Some('"') | Some('\'') | Some('n') | Some('t') => {}
                    Some(c) => errors.push(Error::parse(
                        format!("Unknown escape sequence '\\{c}' in string literal"),
                        c.to_string(),
                        line,
                    )),
                    None => break,
                };
            }
            Some(_) => {}
            None => break,
        }
    }
    errors.push(Error::parse(
        "Unterminated string literal".to_string(),
        String::new(),
        line,
    ));
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Resolves the escape sequences of a quoted string literal.
pub(crate) fn unquote(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut chars = data.chars();
    let quote = match chars.next() {
        Some(c @ ('"' | '\'')) => c,
        Some(c) => {
            out.push(c);
            out.extend(chars);
            return out;
        }
        None => return out,
    };
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(c) => out.push(c),
                None => break,
            },
            c if c == quote => break,
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.iter().map(|t| t.kind()).collect()
    }

    #[test]
    fn it_lexes_punctuation_and_words() {
        use TokenKind::*;
        assert_eq!(
            kinds("node[amenity=pub](50.7,7.1,50.8,7.2);out;"),
            vec![
                Ident, LBracket, Ident, Eq, Ident, RBracket, LParen, Decimal, Comma, Decimal,
                Comma, Decimal, Comma, Decimal, RParen, Semicolon, Ident, Semicolon, Eof
            ]
        );
    }

    #[test]
    fn it_lexes_multichar_punctuation() {
        use TokenKind::*;
        assert_eq!(
            kinds("-> :: != !~ << >> < > ! - ="),
            vec![Arrow, ColonColon, NotEq, NotTilde, LtLt, GtGt, Lt, Gt, Bang, Minus, Eq, Eof]
        );
    }

    #[test]
    fn it_skips_comments() {
        use TokenKind::*;
        assert_eq!(
            kinds("out; // trailing\n/* block\ncomment */ out;"),
            vec![Ident, Semicolon, Ident, Semicolon, Eof]
        );
    }

    #[test]
    fn it_tracks_lines() {
        let (tokens, _) = tokenize("out;\nout;");
        assert_eq!(tokens[0].line(), 1);
        assert_eq!(tokens[2].line(), 2);
    }

    #[test]
    fn it_unquotes_escapes() {
        assert_eq!(unquote(r#""a\"b\n""#), "a\"b\n");
        assert_eq!(unquote("'x'"), "x");
    }

    #[test]
    fn it_reports_unterminated_strings() {
        let (_, errors) = tokenize("way[\"name=broken];");
        assert_eq!(errors.len(), 1);
    }
}
