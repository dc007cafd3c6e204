//! The Validator (C5) and Code Generator (C6): turns a parsed [`sieve_syntax::Script`]
//! into an executable [`sieve_binary::BinaryContainer`], against a given
//! [`sieve_core::ExtensionRegistry`].

mod common;

pub mod builtins;
pub mod codegen;
pub mod compile;
pub mod validator;

pub use builtins::register_builtins;
pub use codegen::CodeGenerator;
pub use compile::{compile, CompileOutcome};
pub use validator::Validator;
