//! The Validator (C5): walks a parsed [`Script`] against the extension
//! registry, resolving names to [`sieve_core::ExtensionId`]s, checking
//! positional-argument arity, and attaching semantic context (resolved
//! comparator/match-type/address-part, extension-private data) to each node.
//!
//! `if`/`elsif`/`else` and `not`/`anyof`/`allof` are control-flow shapes the
//! grammar gives no extension a say over, so they are handled directly here
//! rather than through the registry; everything else — including the core
//! RFC 5228 leaf commands and tests — is looked up, arity-checked, and
//! dispatched through [`sieve_core::CommandHooks`] uniformly, whether it
//! came from a built-in or a `require`d extension.

use std::any::Any;
use std::sync::Arc;

use sieve_core::{ErrorHandler, ExtensionId, ExtensionRegistry, Location, ValidationContext};

use sieve_syntax::{Argument, ArgumentValue, Command, MatchSpec, Script, Test};

use crate::common::{effective_positionals, flatten_strings, resolve_match_spec};

pub struct Validator<'a> {
    registry: &'a mut ExtensionRegistry,
    errors: &'a mut ErrorHandler,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a mut ExtensionRegistry, errors: &'a mut ErrorHandler) -> Self {
        Self { registry, errors }
    }

    /// Runs the full validation pass: `require` first, in source order, then
    /// a recursive walk of the remaining top-level commands.
    pub fn validate(&mut self, script: &mut Script) {
        self.process_requires(&script.commands);
        self.validate_block(&mut script.commands);
    }

    fn process_requires(&mut self, commands: &[Command]) {
        for cmd in commands {
            if cmd.name != "require" {
                continue;
            }
            for (name, location) in flatten_strings(&cmd.arguments) {
                if self.registry.is_required(&name) {
                    self.errors.warning(
                        Some(location.clone()),
                        format!("'{name}' is already required"),
                    );
                }
                if let Err(e) = self.registry.require(&name) {
                    self.errors.error(Some(location), e.to_string());
                }
            }
        }
    }

    fn validate_block(&mut self, commands: &mut [Command]) {
        for cmd in commands.iter_mut() {
            if cmd.name == "require" {
                continue;
            }
            self.validate_command(cmd);
        }
    }

    fn validate_command(&mut self, cmd: &mut Command) {
        match cmd.name.as_str() {
            "if" | "elsif" => {
                let location = cmd.location.clone();
                match test_argument_mut(&mut cmd.arguments) {
                    Some(test) => self.validate_test(test),
                    None => self.errors.error(Some(location), format!("'{}' requires a test", cmd.name)),
                }
                self.validate_block(&mut cmd.block);
            }
            "else" => {
                if !cmd.arguments.is_empty() {
                    self.errors.error(Some(cmd.location.clone()), "'else' takes no test");
                }
                self.validate_block(&mut cmd.block);
            }
            _ => self.validate_generic_command(cmd),
        }
    }

    fn validate_generic_command(&mut self, cmd: &mut Command) {
        let Some((def, hooks, owner)) = self
            .registry
            .find_command(&cmd.name)
            .map(|r| (r.def, Arc::clone(&r.hooks), r.owner))
        else {
            self.errors.error(
                Some(cmd.location.clone()),
                format!("unknown command '{}' (did you forget to require it?)", cmd.name),
            );
            return;
        };

        let positional = effective_positionals(&cmd.arguments);
        self.check_arity(&cmd.location, &cmd.name, positional.len(), def.min_positional, def.max_positional);
        if !def.allow_block && !cmd.block.is_empty() {
            self.errors.error(Some(cmd.location.clone()), format!("'{}' does not take a block", cmd.name));
        }

        let tag_names: Vec<String> =
            cmd.tags().filter_map(|a| a.tag_name().map(str::to_string)).collect();
        let mut vctx =
            ValidatorCtx::new(&cmd.name, cmd.location.clone(), positional.len(), &tag_names, self.errors);
        check_tags(self.registry, &cmd.name, cmd.arguments.iter(), &mut vctx);
        hooks.pre_validate(&mut vctx);
        hooks.validate(&mut vctx);
        for (owner_id, value) in vctx.take_pending() {
            cmd.context.set_any(owner_id, value);
        }

        if def.allow_block {
            self.validate_block(&mut cmd.block);
        }
        cmd.ext_id = Some(owner);
    }

    fn validate_test(&mut self, test: &mut Test) {
        match test.name.as_str() {
            "not" => match test_argument_mut(&mut test.arguments) {
                Some(inner) => self.validate_test(inner),
                None => self.errors.error(Some(test.location.clone()), "'not' requires a test argument"),
            },
            "anyof" | "allof" => match test_list_argument_mut(&mut test.arguments) {
                Some(list) => {
                    if list.is_empty() {
                        self.errors.error(
                            Some(test.location.clone()),
                            format!("'{}' requires at least one test", test.name),
                        );
                    }
                    for t in list.iter_mut() {
                        self.validate_test(t);
                    }
                }
                None => self.errors.error(Some(test.location.clone()), "missing test list"),
            },
            _ => self.validate_generic_test(test),
        }
    }

    fn validate_generic_test(&mut self, test: &mut Test) {
        let Some((def, hooks, owner)) = self
            .registry
            .find_test(&test.name)
            .map(|r| (r.def, Arc::clone(&r.hooks), r.owner))
        else {
            self.errors.error(
                Some(test.location.clone()),
                format!("unknown test '{}' (did you forget to require it?)", test.name),
            );
            return;
        };

        let positional = effective_positionals(&test.arguments);
        self.check_arity(&test.location, &test.name, positional.len(), def.min_positional, def.max_positional);

        let tag_names: Vec<String> =
            test.tags().filter_map(|a| a.tag_name().map(str::to_string)).collect();
        let mut vctx =
            ValidatorCtx::new(&test.name, test.location.clone(), positional.len(), &tag_names, self.errors);
        check_tags(self.registry, &test.name, test.arguments.iter(), &mut vctx);
        hooks.pre_validate(&mut vctx);
        hooks.validate(&mut vctx);
        for (owner_id, value) in vctx.take_pending() {
            test.context.set_any(owner_id, value);
        }

        if matches!(test.name.as_str(), "header" | "address" | "envelope") {
            let spec = resolve_match_spec(&test.arguments);
            test.context.set(ExtensionId::CORE, spec);
        }
        test.ext_id = Some(owner);
    }

    fn check_arity(&mut self, location: &Location, name: &str, count: usize, min: usize, max: Option<usize>) {
        if count < min || max.is_some_and(|m| count > m) {
            let bound = max.map(|m| m.to_string()).unwrap_or_else(|| "unbounded".into());
            self.errors.error(
                Some(location.clone()),
                format!("'{name}' expects {min}..{bound} arguments, found {count}"),
            );
        }
    }
}

/// Resolves each tag argument against the registry and invokes its
/// [`sieve_core::TagHooks::validate`] hook; an unresolvable tag is reported
/// as an error through `ctx` instead.
fn check_tags<'b>(
    registry: &ExtensionRegistry,
    name: &str,
    args: impl Iterator<Item = &'b Argument>,
    ctx: &mut dyn ValidationContext,
) {
    for arg in args {
        if let Some(tag) = arg.tag_name() {
            match registry.find_tag(tag) {
                Some(t) => t.hooks.validate(tag, ctx),
                None => ctx.report_error(format!("unknown tag ':{tag}' for '{name}'")),
            }
        }
    }
}

/// What a [`sieve_core::CommandHooks`]/[`sieve_core::TagHooks`] impl sees
/// while its node is being validated. Built fresh per node; its only
/// lasting effect is the `pending` context entries the [`Validator`] applies
/// back onto the node after the hook call returns.
struct ValidatorCtx<'a> {
    name: &'a str,
    location: Location,
    positional_count: usize,
    tags: &'a [String],
    errors: &'a mut ErrorHandler,
    pending: Vec<(ExtensionId, Box<dyn Any + Send + Sync>)>,
}

impl<'a> ValidatorCtx<'a> {
    fn new(
        name: &'a str,
        location: Location,
        positional_count: usize,
        tags: &'a [String],
        errors: &'a mut ErrorHandler,
    ) -> Self {
        Self { name, location, positional_count, tags, errors, pending: Vec::new() }
    }

    fn take_pending(self) -> Vec<(ExtensionId, Box<dyn Any + Send + Sync>)> {
        self.pending
    }
}

impl<'a> ValidationContext for ValidatorCtx<'a> {
    fn command_name(&self) -> &str {
        self.name
    }

    fn location(&self) -> Location {
        self.location.clone()
    }

    fn positional_count(&self) -> usize {
        self.positional_count
    }

    fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }

    fn report_error(&mut self, message: String) {
        self.errors.error(Some(self.location.clone()), message);
    }

    fn report_warning(&mut self, message: String) {
        self.errors.warning(Some(self.location.clone()), message);
    }

    fn set_context(&mut self, owner: ExtensionId, value: Box<dyn Any + Send + Sync>) {
        self.pending.push((owner, value));
    }

    fn consume_following_arguments(&mut self, _count: usize) {
        // None of the built-in commands/tests need this: the one case where
        // a tag is followed by its own value argument (`:comparator
        // "i;octet"`) is handled directly by `effective_positionals`, which
        // every caller here already goes through before counting arity.
    }
}

fn test_argument_mut(args: &mut [Argument]) -> Option<&mut Test> {
    args.iter_mut().find_map(|a| match &mut a.value {
        ArgumentValue::Test(t) => Some(t.as_mut()),
        _ => None,
    })
}

fn test_list_argument_mut(args: &mut [Argument]) -> Option<&mut Vec<Test>> {
    args.iter_mut().find_map(|a| match &mut a.value {
        ArgumentValue::TestList(list) => Some(list),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use sieve_syntax::Parser;

    fn validate(src: &str) -> (Script, ErrorHandler, ExtensionRegistry) {
        let mut errors = ErrorHandler::default();
        let mut script = Parser::parse("t", src, &mut errors);
        let mut registry = ExtensionRegistry::new();
        register_builtins(&mut registry);
        Validator::new(&mut registry, &mut errors).validate(&mut script);
        (script, errors, registry)
    }

    #[test]
    fn keep_validates_clean() {
        let (_script, errors, _reg) = validate("keep;");
        assert!(errors.ok());
    }

    #[test]
    fn fileinto_without_require_is_unknown() {
        let (_script, errors, _reg) = validate(r#"fileinto "INBOX.spam";"#);
        assert!(!errors.ok());
    }

    #[test]
    fn fileinto_with_require_validates() {
        let (_script, errors, _reg) =
            validate(r#"require "fileinto"; fileinto "INBOX.spam";"#);
        assert!(errors.ok());
    }

    #[test]
    fn size_requires_exactly_one_of_over_or_under() {
        let (_script, errors, _reg) = validate("if size 1K { discard; }");
        assert!(!errors.ok());
    }

    #[test]
    fn size_with_over_validates() {
        let (_script, errors, _reg) = validate("if size :over 1K { discard; }");
        assert!(errors.ok());
    }

    #[test]
    fn header_resolves_default_match_spec() {
        let (script, errors, _reg) =
            validate(r#"if header "subject" "spam" { discard; }"#);
        assert!(errors.ok());
        let test = script.commands[0].test().unwrap();
        let spec = test.context.get::<MatchSpec>(ExtensionId::CORE).unwrap();
        assert_eq!(spec.match_type, "is");
        assert_eq!(spec.comparator, "i;ascii-casemap");
    }

    #[test]
    fn header_with_explicit_comparator_and_match_type() {
        let (script, errors, _reg) = validate(
            r#"if header :comparator "i;octet" :contains "subject" "spam" { discard; }"#,
        );
        assert!(errors.ok());
        let test = script.commands[0].test().unwrap();
        let spec = test.context.get::<MatchSpec>(ExtensionId::CORE).unwrap();
        assert_eq!(spec.match_type, "contains");
        assert_eq!(spec.comparator, "i;octet");
    }

    #[test]
    fn empty_anyof_is_an_error() {
        let (_script, errors, _reg) = validate("if anyof () { discard; }");
        assert!(!errors.ok());
    }

    #[test]
    fn redundant_require_is_a_warning_not_an_error() {
        let (_script, errors, _reg) =
            validate(r#"require ["fileinto", "fileinto"]; fileinto "INBOX.spam";"#);
        assert!(errors.ok());
        assert_eq!(errors.warning_count(), 1);
    }

    #[test]
    fn unknown_command_reports_error() {
        let (_script, errors, _reg) = validate("vacation \"out of office\";");
        assert!(!errors.ok());
    }

    #[test]
    fn unknown_tag_reports_error() {
        let (_script, errors, _reg) = validate(r#"if header :bogus "subject" "x" { discard; }"#);
        assert!(!errors.ok());
    }
}
