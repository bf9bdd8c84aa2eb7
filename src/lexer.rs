//! Character-level lexer.
//!
//! Produces the token stream consumed by the parser: identifiers, integer
//! and decimal literals, quoted character and string literals, and one- or
//! two-character operator symbols. Escape sequences are validated here but
//! expanded by the parser, so token literals always cover the raw source
//! text (quotes included).

use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at index {index}")]
    UnexpectedCharacter { character: char, index: usize },
    #[error("Unterminated character literal at index {index}")]
    UnterminatedCharacter { index: usize },
    #[error("Empty character literal at index {index}")]
    EmptyCharacter { index: usize },
    #[error("Unterminated string literal at index {index}")]
    UnterminatedString { index: usize },
    #[error("Invalid escape '\\{escape}' at index {index}")]
    InvalidEscape { escape: char, index: usize },
}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> LexResult<Option<Token<'a>>> {
        self.skip_whitespace();
        let start = self.pos;
        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(None),
        };

        let token = match ch {
            '\'' => self.read_character(start)?,
            '"' => self.read_string(start)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_ascii_punctuation() => self.read_operator(c, start),
            c => {
                return Err(LexError::UnexpectedCharacter {
                    character: c,
                    index: start,
                });
            }
        };
        Ok(Some(token))
    }

    fn skip_whitespace(&mut self) {
        self.consume_while(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n');
    }

    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        self.token_from(TokenKind::Identifier, start)
    }

    fn read_number(&mut self, start: usize) -> Token<'a> {
        self.consume_while(|c| c.is_ascii_digit());
        // A dot only continues the literal when a digit follows; otherwise
        // "1." is an integer and an operator.
        if self.peek_char() == Some('.')
            && self
                .char_at(self.pos + 1)
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            return self.token_from(TokenKind::Decimal, start);
        }
        self.token_from(TokenKind::Integer, start)
    }

    fn read_character(&mut self, start: usize) -> LexResult<Token<'a>> {
        self.consume_char(); // opening quote
        match self.peek_char() {
            Some('\'') => return Err(LexError::EmptyCharacter { index: start }),
            Some('\\') => self.consume_escape()?,
            Some('\n') | None => return Err(LexError::UnterminatedCharacter { index: start }),
            Some(_) => {
                self.consume_char();
            }
        }
        if self.peek_char() != Some('\'') {
            return Err(LexError::UnterminatedCharacter { index: start });
        }
        self.consume_char(); // closing quote
        Ok(self.token_from(TokenKind::Character, start))
    }

    fn read_string(&mut self, start: usize) -> LexResult<Token<'a>> {
        self.consume_char(); // opening quote
        loop {
            match self.peek_char() {
                Some('"') => {
                    self.consume_char();
                    return Ok(self.token_from(TokenKind::String, start));
                }
                Some('\\') => self.consume_escape()?,
                Some('\n') | None => return Err(LexError::UnterminatedString { index: start }),
                Some(_) => {
                    self.consume_char();
                }
            }
        }
    }

    fn consume_escape(&mut self) -> LexResult<()> {
        let backslash_index = self.pos;
        self.consume_char(); // backslash
        match self.peek_char() {
            Some(c) if matches!(c, 'b' | 'n' | 'r' | 't' | '\'' | '"' | '\\') => {
                self.consume_char();
                Ok(())
            }
            Some(c) => Err(LexError::InvalidEscape {
                escape: c,
                index: backslash_index,
            }),
            None => Err(LexError::InvalidEscape {
                escape: ' ',
                index: backslash_index,
            }),
        }
    }

    fn read_operator(&mut self, ch: char, start: usize) -> Token<'a> {
        self.consume_char();
        let two = matches!(
            (ch, self.peek_char()),
            ('&', Some('&')) | ('|', Some('|')) | ('=', Some('=')) | ('!', Some('='))
        );
        if two {
            self.consume_char();
        }
        self.token_from(TokenKind::Operator, start)
    }

    fn token_from(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.pos], start)
    }

    fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.input.len() {
            None
        } else {
            self.input[index..].chars().next()
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }
}

/// Lexes the entire input into a token vector.
pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        tokenize(input)
            .expect("tokenize failed")
            .into_iter()
            .map(|token| (token.kind, token.literal))
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("VAL answer: Integer = 42;"),
            vec![
                (TokenKind::Identifier, "VAL"),
                (TokenKind::Identifier, "answer"),
                (TokenKind::Operator, ":"),
                (TokenKind::Identifier, "Integer"),
                (TokenKind::Operator, "="),
                (TokenKind::Integer, "42"),
                (TokenKind::Operator, ";"),
            ]
        );
    }

    #[test]
    fn lexes_two_character_operators() {
        assert_eq!(
            kinds("a && b || c == d != e"),
            vec![
                (TokenKind::Identifier, "a"),
                (TokenKind::Operator, "&&"),
                (TokenKind::Identifier, "b"),
                (TokenKind::Operator, "||"),
                (TokenKind::Identifier, "c"),
                (TokenKind::Operator, "=="),
                (TokenKind::Identifier, "d"),
                (TokenKind::Operator, "!="),
                (TokenKind::Identifier, "e"),
            ]
        );
    }

    #[test]
    fn splits_adjacent_equals_from_assignment() {
        // "x == y" is one operator; "x = =" would be two.
        assert_eq!(
            kinds("x = y == z"),
            vec![
                (TokenKind::Identifier, "x"),
                (TokenKind::Operator, "="),
                (TokenKind::Identifier, "y"),
                (TokenKind::Operator, "=="),
                (TokenKind::Identifier, "z"),
            ]
        );
    }

    #[test]
    fn lexes_decimal_only_with_trailing_digit() {
        assert_eq!(
            kinds("1.5 2. 3"),
            vec![
                (TokenKind::Decimal, "1.5"),
                (TokenKind::Integer, "2"),
                (TokenKind::Operator, "."),
                (TokenKind::Integer, "3"),
            ]
        );
    }

    #[test]
    fn keeps_quotes_on_character_and_string_literals() {
        assert_eq!(
            kinds(r#"'c' '\n' "hello\tworld""#),
            vec![
                (TokenKind::Character, "'c'"),
                (TokenKind::Character, r"'\n'"),
                (TokenKind::String, "\"hello\\tworld\""),
            ]
        );
    }

    #[test]
    fn records_byte_offsets() {
        let tokens = tokenize("IF x DO").expect("tokenize failed");
        let offsets: Vec<usize> = tokens.iter().map(|token| token.index).collect();
        assert_eq!(offsets, vec![0, 3, 5]);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert_eq!(
            tokenize("\"abc"),
            Err(LexError::UnterminatedString { index: 0 })
        );
    }

    #[test]
    fn rejects_string_with_raw_newline() {
        assert_eq!(
            tokenize("\"ab\ncd\""),
            Err(LexError::UnterminatedString { index: 0 })
        );
    }

    #[test]
    fn rejects_unknown_escape() {
        assert_eq!(
            tokenize(r#""bad\q""#),
            Err(LexError::InvalidEscape {
                escape: 'q',
                index: 4,
            })
        );
    }

    #[test]
    fn rejects_empty_character() {
        assert_eq!(tokenize("''"), Err(LexError::EmptyCharacter { index: 0 }));
    }

    #[test]
    fn rejects_multi_character_literal() {
        assert_eq!(
            tokenize("'ab'"),
            Err(LexError::UnterminatedCharacter { index: 0 })
        );
    }
}
