//! The Code Generator (C6): a single linear pass over a validated [`Script`]
//! that emits bytecode into a [`BinaryContainer`].
//!
//! `if`/`elsif`/`else` chains and `anyof`/`allof`/`not` are expanded here
//! into plain conditional jumps — there is no runtime and/or opcode, and
//! `not` is just a `TestNotPrefix` inversion of whatever follows it. Every
//! other command/test is dispatched through the registry the same way the
//! validator did, so a `CommandHooks::generate` impl only ever has to emit
//! its own opcode/subcode; the generator emits the operands by reading the
//! node directly, since the hook has no access to it.

use std::sync::Arc;

use sieve_binary::io::ByteWriter;
use sieve_binary::{BinaryContainer, StringTable};
use sieve_core::{CoreOpcode, ExtensionId, ExtensionRegistry, GenerationContext, JumpFixup, OperandClass, TagHooks, OPTIONAL_BLOCK_END, OPTIONAL_BLOCK_PRESENT};

use sieve_syntax::{Argument, ArgumentValue, Command, MatchSpec, Script, Test};

use crate::common::{effective_positionals, single_test_arg, test_list_arg};

pub struct CodeGenerator<'a> {
    registry: &'a ExtensionRegistry,
    container: BinaryContainer,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(registry: &'a ExtensionRegistry, compiler_version: u16) -> Self {
        Self { registry, container: BinaryContainer::new(compiler_version, Vec::new(), StringTable::new()) }
    }

    /// Consumes `self`, returning the finished container. Call only once
    /// the validator has reported zero errors for `script`.
    pub fn generate(mut self, script: &Script) -> BinaryContainer {
        self.generate_block(&script.commands);
        self.emit_opcode(CoreOpcode::Stop as u8);
        self.container
    }

    fn generate_block(&mut self, commands: &[Command]) {
        let mut i = 0;
        while i < commands.len() {
            if commands[i].name == "require" {
                i += 1;
                continue;
            }
            if commands[i].name == "if" {
                i = self.generate_if_chain(commands, i);
            } else {
                self.generate_command(&commands[i]);
                i += 1;
            }
        }
    }

    /// Emits one `if`/`elsif*`/`else?` chain starting at `start`, returning
    /// the index just past it. Each branch's test is followed by a
    /// `JmpIfFalse` to the next branch's test (or past the whole chain, for
    /// the last one); each branch's body ends with a `Jmp` to the chain's
    /// end, except the last, which just falls through.
    fn generate_if_chain(&mut self, commands: &[Command], start: usize) -> usize {
        let mut i = start;
        let mut branches = vec![&commands[i]];
        i += 1;
        while i < commands.len() && commands[i].name == "elsif" {
            branches.push(&commands[i]);
            i += 1;
        }
        let else_block = if i < commands.len() && commands[i].name == "else" {
            let block = &commands[i].block;
            i += 1;
            Some(block)
        } else {
            None
        };

        let mut end_fixups = Vec::new();
        for (idx, branch) in branches.iter().enumerate() {
            let test = branch.test().expect("validated if/elsif always carries a test");
            self.generate_test(test);
            let to_next = self.emit_jump_op(CoreOpcode::JmpIfFalse);
            self.generate_block(&branch.block);
            if idx + 1 < branches.len() || else_block.is_some() {
                end_fixups.push(self.emit_jump_op(CoreOpcode::Jmp));
            }
            self.resolve_jump(to_next);
        }
        if let Some(block) = else_block {
            self.generate_block(block);
        }
        for fixup in end_fixups {
            self.resolve_jump(fixup);
        }
        i
    }

    fn emit_jump_op(&mut self, op: CoreOpcode) -> JumpFixup {
        self.emit_opcode(op as u8);
        self.emit_jump_placeholder()
    }

    fn generate_test(&mut self, test: &Test) {
        match test.name.as_str() {
            "not" => {
                if let Some(inner) = single_test_arg(&test.arguments) {
                    self.generate_test(inner);
                }
                self.emit_opcode(CoreOpcode::TestNotPrefix as u8);
            }
            "anyof" => self.generate_combinator(test, true),
            "allof" => self.generate_combinator(test, false),
            "size" => self.generate_size(test),
            "header" => self.generate_match_test(test, CoreOpcode::TestHeader, false),
            "address" => self.generate_match_test(test, CoreOpcode::TestAddress, true),
            "exists" => self.generate_exists(test),
            "true" => self.emit_opcode(CoreOpcode::TestTrue as u8),
            "false" => self.emit_opcode(CoreOpcode::TestFalse as u8),
            "envelope" => self.generate_envelope(test),
            other => {
                log::error!("no bytecode shape registered for test '{other}'; emitting Nop");
                self.emit_opcode(CoreOpcode::Nop as u8);
            }
        }
    }

    /// `anyof`/`allof` expanded at generation time into short-circuiting
    /// jumps: every test but the last jumps straight to a
    /// shared `TestTrue`/`TestFalse` label on the combinator's short-
    /// circuiting outcome; the last test's own result stands for the whole
    /// expression if none of the earlier ones short-circuited.
    fn generate_combinator(&mut self, test: &Test, is_any: bool) {
        let list = test_list_arg(&test.arguments).unwrap_or(&[]);
        if list.is_empty() {
            self.emit_opcode(if is_any { CoreOpcode::TestFalse } else { CoreOpcode::TestTrue } as u8);
            return;
        }
        let shortcut_op = if is_any { CoreOpcode::JmpIfTrue } else { CoreOpcode::JmpIfFalse };
        let mut shortcuts = Vec::new();
        for t in &list[..list.len() - 1] {
            self.generate_test(t);
            shortcuts.push(self.emit_jump_op(shortcut_op));
        }
        self.generate_test(&list[list.len() - 1]);
        let end = self.emit_jump_op(CoreOpcode::Jmp);
        for fixup in shortcuts {
            self.resolve_jump(fixup);
        }
        self.emit_opcode(if is_any { CoreOpcode::TestTrue } else { CoreOpcode::TestFalse } as u8);
        self.resolve_jump(end);
    }

    fn generate_size(&mut self, test: &Test) {
        self.emit_opcode(CoreOpcode::TestSize as u8);
        self.generate_tags(&test.arguments);
        let over = test.tags().any(|a| a.tag_name() == Some("over"));
        self.emit_u8(u8::from(over));
        let positional = effective_positionals(&test.arguments);
        let n = positional
            .first()
            .and_then(|a| match a.value {
                ArgumentValue::Number(n) => Some(n),
                _ => None,
            })
            .unwrap_or(0);
        self.emit_varint(n);
    }

    fn generate_exists(&mut self, test: &Test) {
        self.emit_opcode(CoreOpcode::TestExists as u8);
        let positional = effective_positionals(&test.arguments);
        self.emit_string_list(positional.first().copied());
    }

    fn generate_match_test(&mut self, test: &Test, opcode: CoreOpcode, has_address_part: bool) {
        self.emit_opcode(opcode as u8);
        self.generate_tags(&test.arguments);
        let positional = effective_positionals(&test.arguments);
        self.emit_string_list(positional.first().copied());
        self.emit_string_list(positional.get(1).copied());
        self.emit_match_spec_block(test, has_address_part);
    }

    fn generate_envelope(&mut self, test: &Test) {
        let (hooks, owner) = {
            let reg = self.registry.find_test("envelope").expect("validated: envelope was required");
            (Arc::clone(&reg.hooks), reg.owner)
        };
        let ext_index = self.ext_index_for(owner);
        hooks.generate(self, ext_index);
        self.generate_tags(&test.arguments);
        let positional = effective_positionals(&test.arguments);
        self.emit_string_list(positional.first().copied());
        self.emit_string_list(positional.get(1).copied());
        self.emit_match_spec_block(test, true);
    }

    /// Resolves each tag argument against the registry and invokes its
    /// [`TagHooks::generate`] hook. A no-op for tags whose hooks don't
    /// override it (all built-in tags), but keeps the hook point live for an
    /// extension tag that needs to emit something of its own.
    fn generate_tags(&mut self, args: &[Argument]) {
        let resolved: Vec<(String, Arc<dyn TagHooks>)> = args
            .iter()
            .filter_map(|a| a.tag_name())
            .filter_map(|tag| self.registry.find_tag(tag).map(|t| (tag.to_string(), Arc::clone(&t.hooks))))
            .collect();
        for (tag, hooks) in resolved {
            hooks.generate(&tag, self);
        }
    }

    fn generate_command(&mut self, cmd: &Command) {
        match cmd.name.as_str() {
            "keep" => self.emit_opcode(CoreOpcode::Keep as u8),
            "discard" => self.emit_opcode(CoreOpcode::Discard as u8),
            "stop" => self.emit_opcode(CoreOpcode::Stop as u8),
            "redirect" => {
                self.emit_opcode(CoreOpcode::Redirect as u8);
                let positional = effective_positionals(&cmd.arguments);
                self.emit_single_string(positional.first().copied());
            }
            "fileinto" => self.generate_extension_command(cmd, "fileinto"),
            "reject" => self.generate_extension_command(cmd, "reject"),
            other => log::error!("no bytecode shape registered for command '{other}'"),
        }
    }

    fn generate_extension_command(&mut self, cmd: &Command, name: &str) {
        let (hooks, owner) = {
            let reg = self.registry.find_command(name).expect("validated: extension was required");
            (Arc::clone(&reg.hooks), reg.owner)
        };
        let ext_index = self.ext_index_for(owner);
        hooks.generate(self, ext_index);
        let positional = effective_positionals(&cmd.arguments);
        self.emit_single_string(positional.first().copied());
    }

    /// Returns this binary's dependency-table index for `owner`, registering
    /// it on first use.
    fn ext_index_for(&mut self, owner: ExtensionId) -> u8 {
        let name = self.registry.get_by_id(owner).map(|info| info.name.to_string()).unwrap_or_default();
        self.container.ext_index_for(&name, 1)
    }

    fn emit_string_list(&mut self, arg: Option<&Argument>) {
        let items: Vec<&str> = match arg.map(|a| &a.value) {
            Some(ArgumentValue::String(s)) => vec![s.as_str()],
            Some(ArgumentValue::StringList(list)) => list.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        self.emit_varint(items.len() as u64);
        for s in items {
            self.emit_string(s);
        }
    }

    fn emit_single_string(&mut self, arg: Option<&Argument>) {
        self.emit_string(arg.and_then(Argument::as_single_string).unwrap_or(""));
    }

    /// The optional-operand block trailing `header`/`address`/`envelope`:
    /// `OPTIONAL_BLOCK_PRESENT` followed by `(tag, payload)` pairs terminated
    /// by `OPTIONAL_BLOCK_END`. Address-part is present only for tests that
    /// have one.
    fn emit_match_spec_block(&mut self, test: &Test, has_address_part: bool) {
        let spec = test.context.get::<MatchSpec>(ExtensionId::CORE).cloned().unwrap_or_default();
        self.emit_u8(OPTIONAL_BLOCK_PRESENT);
        if has_address_part {
            self.emit_u8(OperandClass::AddressPart.tag_byte());
            self.emit_string(&spec.address_part);
        }
        self.emit_u8(OperandClass::MatchType.tag_byte());
        self.emit_string(&spec.match_type);
        self.emit_u8(OperandClass::Comparator.tag_byte());
        self.emit_string(&spec.comparator);
        self.emit_u8(OPTIONAL_BLOCK_END);
    }
}

impl<'a> GenerationContext for CodeGenerator<'a> {
    fn emit_opcode(&mut self, code: u8) {
        self.container.code.push(code);
    }

    fn emit_u8(&mut self, value: u8) {
        self.container.code.push(value);
    }

    fn emit_varint(&mut self, value: u64) {
        self.container.code.write_varint(value);
    }

    fn emit_string(&mut self, s: &str) {
        let offset = self.container.strings.intern(s);
        self.container.code.write_varint(offset as u64);
    }

    fn emit_jump_placeholder(&mut self) -> JumpFixup {
        let fixup = JumpFixup(self.container.code.len());
        self.container.code.extend_from_slice(&[0u8; 4]);
        fixup
    }

    fn resolve_jump(&mut self, fixup: JumpFixup) {
        let target = (self.container.code.len() as u32).to_le_bytes();
        self.container.code[fixup.0..fixup.0 + 4].copy_from_slice(&target);
    }

    fn current_offset(&self) -> usize {
        self.container.code.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use crate::validator::Validator;
    use sieve_core::ErrorHandler;
    use sieve_syntax::Parser;

    fn compile(src: &str) -> BinaryContainer {
        let mut errors = ErrorHandler::default();
        let mut script = Parser::parse("t", src, &mut errors);
        let mut registry = ExtensionRegistry::new();
        register_builtins(&mut registry);
        Validator::new(&mut registry, &mut errors).validate(&mut script);
        assert!(errors.ok(), "{:?}", errors.diagnostics());
        CodeGenerator::new(&registry, 1).generate(&script)
    }

    #[test]
    fn keep_emits_keep_then_stop() {
        let bin = compile("keep;");
        assert_eq!(bin.code, vec![CoreOpcode::Keep as u8, CoreOpcode::Stop as u8]);
    }

    #[test]
    fn if_else_emits_a_jmp_if_false_and_a_trailing_jmp() {
        let bin = compile("if true { discard; } else { keep; }");
        assert_eq!(bin.code[0], CoreOpcode::TestTrue as u8);
        assert_eq!(bin.code[1], CoreOpcode::JmpIfFalse as u8);
        // [true][JmpIfFalse+4][Discard][Jmp+4][Keep][Stop]
        assert_eq!(bin.code[6], CoreOpcode::Discard as u8);
        assert_eq!(bin.code[7], CoreOpcode::Jmp as u8);
    }

    #[test]
    fn fileinto_uses_a_two_level_extension_opcode() {
        let bin = compile(r#"require "fileinto"; fileinto "INBOX.spam";"#);
        assert_eq!(bin.code[0], sieve_core::CUSTOM_START);
        assert_eq!(bin.code[1], 0x01); // FILEINTO_SUBCODE
        assert_eq!(bin.ext_deps.len(), 1);
        assert_eq!(bin.ext_deps[0].name, "fileinto");
    }

    #[test]
    fn anyof_short_circuits_via_jmp_if_true() {
        let bin = compile(r#"if anyof (true, false) { discard; }"#);
        assert!(bin.code.contains(&(CoreOpcode::JmpIfTrue as u8)));
    }

    #[test]
    fn header_emits_resolved_match_spec_operands() {
        let bin = compile(r#"if header :contains "subject" "spam" { discard; }"#);
        assert_eq!(bin.code[0], CoreOpcode::TestHeader as u8);
        assert!(bin.strings.get(0).is_some());
    }

    #[test]
    fn match_spec_block_opens_with_the_optional_block_present_marker() {
        let bin = compile(r#"if header "subject" "spam" { discard; }"#);
        // [TestHeader][names: count, ref][keys: count, ref][PRESENT]...
        let present_offset = 1 + 2 + 2;
        assert_eq!(bin.code[present_offset], OPTIONAL_BLOCK_PRESENT);
    }
}
