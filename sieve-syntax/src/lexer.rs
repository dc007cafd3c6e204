//! Tokenizer for Sieve source text.

use std::sync::Arc;

use sieve_core::Location;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier(String),
    Tag(String),
    Number(u64),
    QuotedString(String),
    MultiLineString(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("{location}: unterminated quoted string")]
    UnterminatedString { location: Location },
    #[error("{location}: unterminated multi-line string")]
    UnterminatedMultiLine { location: Location },
    #[error("{location}: unexpected character '{ch}'")]
    UnexpectedChar { location: Location, ch: char },
    #[error("{location}: number literal overflows u64")]
    NumberOverflow { location: Location },
}

pub struct Lexer<'src> {
    script_name: Arc<str>,
    input: &'src [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(script_name: impl Into<Arc<str>>, input: &'src str) -> Self {
        Self { script_name: script_name.into(), input: input.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    fn loc(&self) -> Location {
        Location::new(self.script_name.clone(), self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
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
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.loc();
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(LexError::UnterminatedString { location: start });
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let location = self.loc();
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, location });
        };
        match c {
            b'{' => {
                self.advance();
                Ok(Token { kind: TokenKind::LBrace, location })
            }
            b'}' => {
                self.advance();
                Ok(Token { kind: TokenKind::RBrace, location })
            }
            b'(' => {
                self.advance();
                Ok(Token { kind: TokenKind::LParen, location })
            }
            b')' => {
                self.advance();
                Ok(Token { kind: TokenKind::RParen, location })
            }
            b'[' => {
                self.advance();
                Ok(Token { kind: TokenKind::LBracket, location })
            }
            b']' => {
                self.advance();
                Ok(Token { kind: TokenKind::RBracket, location })
            }
            b',' => {
                self.advance();
                Ok(Token { kind: TokenKind::Comma, location })
            }
            b';' => {
                self.advance();
                Ok(Token { kind: TokenKind::Semicolon, location })
            }
            b':' => {
                self.advance();
                let ident = self.scan_identifier_body();
                Ok(Token { kind: TokenKind::Tag(ident), location })
            }
            b'"' => self.scan_quoted_string(location),
            b'0'..=b'9' => self.scan_number(location),
            c if is_ident_start(c) => {
                let ident = self.scan_identifier_body();
                if ident == "text" && self.peek() == Some(b':') {
                    self.advance();
                    self.scan_multiline_string(location)
                } else {
                    Ok(Token { kind: TokenKind::Identifier(ident), location })
                }
            }
            _ => Err(LexError::UnexpectedChar { location, ch: c as char }),
        }
    }

    fn scan_identifier_body(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                s.push(c as char);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn scan_number(&mut self, location: Location) -> Result<Token, LexError> {
        let mut value: u64 = 0;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((c - b'0') as u64))
                .ok_or(LexError::NumberOverflow { location: location.clone() })?;
            self.advance();
        }
        let scale: u64 = match self.peek() {
            Some(b'K') | Some(b'k') => {
                self.advance();
                1024
            }
            Some(b'M') | Some(b'm') => {
                self.advance();
                1024 * 1024
            }
            Some(b'G') | Some(b'g') => {
                self.advance();
                1024 * 1024 * 1024
            }
            _ => 1,
        };
        let value = value
            .checked_mul(scale)
            .ok_or(LexError::NumberOverflow { location: location.clone() })?;
        Ok(Token { kind: TokenKind::Number(value), location })
    }

    fn scan_quoted_string(&mut self, location: Location) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                None | Some(b'\n') => {
                    return Err(LexError::UnterminatedString { location });
                }
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c) => s.push(c as char),
                    None => return Err(LexError::UnterminatedString { location }),
                },
                Some(c) => s.push(c as char),
            }
        }
        Ok(Token { kind: TokenKind::QuotedString(s), location })
    }

    /// Scans a dot-stuffed multi-line string body following `text:`, up to
    /// and including its own `.` terminator line.
    fn scan_multiline_string(&mut self, location: Location) -> Result<Token, LexError> {
        // Skip to end of the `text:` line (optional trailing comment/whitespace).
        while let Some(c) = self.peek() {
            self.advance();
            if c == b'\n' {
                break;
            }
        }
        let mut out = String::new();
        loop {
            if self.peek().is_none() {
                return Err(LexError::UnterminatedMultiLine { location });
            }
            let line_start = self.pos;
            let mut line = String::new();
            loop {
                match self.peek() {
                    None | Some(b'\n') => break,
                    Some(c) => {
                        line.push(c as char);
                        self.advance();
                    }
                }
            }
            if self.peek() == Some(b'\n') {
                self.advance();
            }
            if line == "." {
                break;
            }
            // Dot-stuffing: a line that begins with '.' followed by more
            // content has the leading '.' stripped.
            let _ = line_start;
            if let Some(rest) = line.strip_prefix('.') {
                out.push_str(rest);
            } else {
                out.push_str(&line);
            }
            out.push('\n');
        }
        Ok(Token { kind: TokenKind::MultiLineString(out), location })
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}
