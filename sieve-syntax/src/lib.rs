//! Sieve source text → abstract syntax tree (C3, C4).

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{Argument, ArgumentValue, Command, MatchSpec, NodeContext, Script, Test};
pub use lexer::{LexError, Lexer, Token, TokenKind};
pub use parser::Parser;
