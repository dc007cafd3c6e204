//! Ties the three frontend stages together: parse (C3), validate (C5),
//! generate (C6). Each stage shares one [`ErrorHandler`]; a stage only runs
//! if the one before it reported no errors, since neither the validator nor
//! the generator can do anything useful with a malformed tree.

use sieve_binary::BinaryContainer;
use sieve_core::{ErrorHandler, ExtensionRegistry};
use sieve_syntax::Parser;

use crate::codegen::CodeGenerator;
use crate::validator::Validator;

pub struct CompileOutcome {
    pub errors: ErrorHandler,
    pub binary: Option<BinaryContainer>,
}

impl CompileOutcome {
    pub fn ok(&self) -> bool {
        self.errors.ok() && self.binary.is_some()
    }
}

pub fn compile(
    script_name: impl Into<std::sync::Arc<str>>,
    source: &str,
    registry: &mut ExtensionRegistry,
    max_errors: usize,
    compiler_version: u16,
) -> CompileOutcome {
    let mut errors = ErrorHandler::new(max_errors);
    let mut script = Parser::parse(script_name, source, &mut errors);
    if !errors.ok() {
        return CompileOutcome { errors, binary: None };
    }

    Validator::new(registry, &mut errors).validate(&mut script);
    if !errors.ok() {
        return CompileOutcome { errors, binary: None };
    }

    let binary = CodeGenerator::new(registry, compiler_version).generate(&script);
    CompileOutcome { errors, binary: Some(binary) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;

    #[test]
    fn end_to_end_compile_of_a_clean_script() {
        let mut registry = ExtensionRegistry::new();
        register_builtins(&mut registry);
        let outcome = compile("t", "if size :over 1M { discard; } else { keep; }", &mut registry, 100, 1);
        assert!(outcome.ok());
        assert!(!outcome.binary.unwrap().code.is_empty());
    }

    #[test]
    fn compile_stops_before_generation_on_validation_errors() {
        let mut registry = ExtensionRegistry::new();
        register_builtins(&mut registry);
        let outcome = compile("t", "vacation \"oops\";", &mut registry, 100, 1);
        assert!(!outcome.ok());
        assert!(outcome.binary.is_none());
    }
}
