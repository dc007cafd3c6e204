//! Recursive-descent parser with one-token lookahead. On a
//! syntax error the parser reports it through the shared [`ErrorHandler`],
//! resynchronizes to the next `;` or matching `}`, and keeps parsing so
//! later constructs are still emitted.

use sieve_core::ErrorHandler;

use crate::ast::{Argument, ArgumentValue, Command, Script, Test};
use crate::lexer::{LexError, Lexer, Token, TokenKind};

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    lookahead: Token,
}

/// `require` top-level commands must precede any non-`require` top-level
/// command; checked while building the script.
const REQUIRE_LIKE: &[&str] = &["require"];

impl<'src> Parser<'src> {
    pub fn parse(
        script_name: impl Into<std::sync::Arc<str>>,
        source: &'src str,
        errors: &mut ErrorHandler,
    ) -> Script {
        let script_name = script_name.into();
        let mut lexer = Lexer::new(script_name, source);
        let lookahead = match lexer.next_token() {
            Ok(t) => t,
            Err(e) => {
                errors.error(Some(e_location(&e)), e.to_string());
                return Script { commands: Vec::new() };
            }
        };
        let mut parser = Parser { lexer, lookahead };
        parser.parse_script(errors)
    }

    fn advance(&mut self, errors: &mut ErrorHandler) -> Token {
        let next = self.lexer.next_token().unwrap_or_else(|e| {
            let loc = e_location(&e);
            errors.error(Some(loc.clone()), e.to_string());
            Token { kind: TokenKind::Eof, location: loc }
        });
        std::mem::replace(&mut self.lookahead, next)
    }

    fn at_eof(&self) -> bool {
        self.lookahead.kind == TokenKind::Eof
    }

    fn parse_script(&mut self, errors: &mut ErrorHandler) -> Script {
        let mut commands = Vec::new();
        let mut seen_non_require = false;
        while !self.at_eof() {
            match self.parse_command(errors) {
                Some(cmd) => {
                    if REQUIRE_LIKE.contains(&cmd.name.as_str()) {
                        if seen_non_require {
                            errors.error(
                                Some(cmd.location.clone()),
                                "'require' must appear before any other top-level command",
                            );
                        }
                    } else {
                        seen_non_require = true;
                    }
                    commands.push(cmd);
                }
                None => {
                    self.resync(errors);
                }
            }
        }
        Script { commands }
    }

    /// Skips tokens until the next `;` (consumed) or a balanced `}`
    /// (consumed), so parsing can resume after a broken construct.
    fn resync(&mut self, errors: &mut ErrorHandler) {
        let mut depth = 0i32;
        loop {
            match &self.lookahead.kind {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => {
                    self.advance(errors);
                    return;
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance(errors);
                }
                TokenKind::RBrace => {
                    if depth == 0 {
                        self.advance(errors);
                        return;
                    }
                    depth -= 1;
                    self.advance(errors);
                }
                _ => {
                    self.advance(errors);
                }
            }
        }
    }

    fn parse_command(&mut self, errors: &mut ErrorHandler) -> Option<Command> {
        let location = self.lookahead.location.clone();
        let name = match &self.lookahead.kind {
            TokenKind::Identifier(name) => name.clone(),
            other => {
                errors.error(Some(location), format!("expected a command, found {other:?}"));
                return None;
            }
        };
        self.advance(errors);

        let mut arguments = Vec::new();
        if name == "if" || name == "elsif" {
            let test = self.parse_test(errors)?;
            arguments.push(Argument::new(
                ArgumentValue::Test(Box::new(test)),
                self.lookahead.location.clone(),
            ));
        } else {
            arguments.extend(self.parse_arguments(errors, Stop::CommandEnd));
        }

        let block = match &self.lookahead.kind {
            TokenKind::Semicolon => {
                self.advance(errors);
                Vec::new()
            }
            TokenKind::LBrace => self.parse_block(errors),
            other => {
                errors.error(
                    Some(self.lookahead.location.clone()),
                    format!("expected ';' or '{{', found {other:?}"),
                );
                return None;
            }
        };

        Some(Command::new(name, arguments, block, location))
    }

    fn parse_block(&mut self, errors: &mut ErrorHandler) -> Vec<Command> {
        self.advance(errors); // '{'
        let mut commands = Vec::new();
        loop {
            match &self.lookahead.kind {
                TokenKind::RBrace => {
                    self.advance(errors);
                    break;
                }
                TokenKind::Eof => {
                    errors.error(Some(self.lookahead.location.clone()), "unterminated block");
                    break;
                }
                _ => match self.parse_command(errors) {
                    Some(cmd) => commands.push(cmd),
                    None => self.resync(errors),
                },
            }
        }
        commands
    }

    fn parse_test(&mut self, errors: &mut ErrorHandler) -> Option<Test> {
        let location = self.lookahead.location.clone();
        let name = match &self.lookahead.kind {
            TokenKind::Identifier(name) => name.clone(),
            other => {
                errors.error(Some(location), format!("expected a test, found {other:?}"));
                return None;
            }
        };
        self.advance(errors);

        let arguments = match name.as_str() {
            "not" => {
                let inner = self.parse_test(errors)?;
                vec![Argument::new(
                    ArgumentValue::Test(Box::new(inner)),
                    self.lookahead.location.clone(),
                )]
            }
            "anyof" | "allof" => {
                let tests = self.parse_test_list(errors)?;
                vec![Argument::new(ArgumentValue::TestList(tests), self.lookahead.location.clone())]
            }
            _ => self.parse_arguments(errors, Stop::TestEnd),
        };
        Some(Test::new(name, arguments, location))
    }

    fn parse_test_list(&mut self, errors: &mut ErrorHandler) -> Option<Vec<Test>> {
        self.expect(TokenKind::LParen, errors)?;
        let mut tests = Vec::new();
        if self.lookahead.kind != TokenKind::RParen {
            loop {
                let t = self.parse_test(errors)?;
                tests.push(t);
                if self.lookahead.kind == TokenKind::Comma {
                    self.advance(errors);
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, errors)?;
        Some(tests)
    }

    fn parse_arguments(&mut self, errors: &mut ErrorHandler, stop: Stop) -> Vec<Argument> {
        let mut args = Vec::new();
        while !self.at_stop(stop) {
            match self.parse_argument(errors) {
                Some(a) => args.push(a),
                None => break,
            }
        }
        args
    }

    fn at_stop(&self, stop: Stop) -> bool {
        match stop {
            Stop::CommandEnd => {
                matches!(self.lookahead.kind, TokenKind::Semicolon | TokenKind::LBrace | TokenKind::Eof)
            }
            Stop::TestEnd => matches!(
                self.lookahead.kind,
                TokenKind::LBrace | TokenKind::RParen | TokenKind::Comma | TokenKind::Eof
            ),
            Stop::TestListEnd => {
                matches!(self.lookahead.kind, TokenKind::RParen | TokenKind::Comma | TokenKind::Eof)
            }
        }
    }

    fn parse_argument(&mut self, errors: &mut ErrorHandler) -> Option<Argument> {
        let location = self.lookahead.location.clone();
        let value = match self.lookahead.kind.clone() {
            TokenKind::Number(n) => {
                self.advance(errors);
                ArgumentValue::Number(n)
            }
            TokenKind::QuotedString(s) | TokenKind::MultiLineString(s) => {
                self.advance(errors);
                ArgumentValue::String(s)
            }
            TokenKind::Tag(name) => {
                self.advance(errors);
                ArgumentValue::Tag(name)
            }
            TokenKind::LBracket => {
                self.advance(errors);
                let mut items = Vec::new();
                if self.lookahead.kind != TokenKind::RBracket {
                    loop {
                        match &self.lookahead.kind {
                            TokenKind::QuotedString(s) | TokenKind::MultiLineString(s) => {
                                items.push(s.clone());
                                self.advance(errors);
                            }
                            other => {
                                errors.error(
                                    Some(self.lookahead.location.clone()),
                                    format!("expected a string in string-list, found {other:?}"),
                                );
                                return None;
                            }
                        }
                        if self.lookahead.kind == TokenKind::Comma {
                            self.advance(errors);
                            continue;
                        }
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, errors)?;
                ArgumentValue::StringList(items)
            }
            TokenKind::Identifier(name) => {
                self.advance(errors);
                ArgumentValue::Identifier(name)
            }
            ref other => {
                errors.error(Some(location), format!("unexpected token {other:?} in argument list"));
                return None;
            }
        };
        Some(Argument::new(value, location))
    }

    fn expect(&mut self, expected: TokenKind, errors: &mut ErrorHandler) -> Option<()> {
        if self.lookahead.kind == expected {
            self.advance(errors);
            Some(())
        } else {
            errors.error(
                Some(self.lookahead.location.clone()),
                format!("expected {expected:?}, found {:?}", self.lookahead.kind),
            );
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    CommandEnd,
    TestEnd,
    TestListEnd,
}

fn e_location(e: &LexError) -> sieve_core::Location {
    match e {
        LexError::UnterminatedString { location }
        | LexError::UnterminatedMultiLine { location }
        | LexError::UnexpectedChar { location, .. }
        | LexError::NumberOverflow { location } => location.clone(),
    }
}
