//! The Interpreter (C8): executes one binary's bytecode against a message,
//! accumulating pending actions into a [`ResultSet`] rather than committing
//! them immediately.
//!
//! `anyof`/`allof`/`not` leave no trace here — the generator already
//! expanded them into plain jumps and a single `TestNotPrefix` inversion
//! opcode, so this loop only ever sees a flat instruction stream.

use std::time::{Duration, Instant};

use sieve_binary::{BinaryContainer, StringTable};
use sieve_core::{CoreOpcode, OperandClass, CUSTOM_START, OPTIONAL_BLOCK_END, OPTIONAL_BLOCK_PRESENT};

use crate::actions::{Action, ResultSet};
use crate::env::MessageData;
use crate::error::{ExitStatus, RuntimeError};
use crate::eval::{self, ResolvedMatchSpec};

/// The extension subcodes `sieve-compiler`'s `builtins.rs` assigns; kept in
/// sync by hand since the two crates don't share a constants module for
/// them — a two-level opcode is resolved by name, not a shared enum, the
/// same way a third-party extension's runtime side would.
const FILEINTO_SUBCODE: u8 = 0x01;
const REJECT_SUBCODE: u8 = 0x01;
const ENVELOPE_SUBCODE: u8 = 0x01;

/// One `run()` call's outcome: the exit status and whatever actions were
/// accumulated before that status was reached.
pub struct Execution {
    pub status: ExitStatus,
    pub results: ResultSet,
}

pub struct Interpreter<'a> {
    binary: &'a BinaryContainer,
}

impl<'a> Interpreter<'a> {
    pub fn new(binary: &'a BinaryContainer) -> Self {
        Self { binary }
    }

    /// Runs to completion (or `STOP`, or falling off the end of the code
    /// block), sampling the CPU-time budget at least once per opcode
    /// dispatch. An overrun discards whatever
    /// actions were pending and reports `TempFailure`.
    pub fn run(&self, message: &dyn MessageData, max_cpu_time: Duration) -> Execution {
        let mut results = ResultSet::new();
        match self.run_inner(message, max_cpu_time, &mut results) {
            Ok(()) => Execution { status: ExitStatus::Ok, results },
            Err(RuntimeError::BudgetExceeded(ms)) => {
                log::warn!("execution aborted: CPU budget of {ms}ms exceeded");
                Execution { status: ExitStatus::TempFailure, results: ResultSet::new() }
            }
            Err(e) if e.is_corrupt() => {
                log::error!("bytecode error: {e}");
                Execution { status: ExitStatus::BinCorrupt, results: ResultSet::new() }
            }
            Err(e) => {
                log::warn!("runtime error: {e}; falling back to implicit keep");
                Execution { status: ExitStatus::Failure, results }
            }
        }
    }

    fn run_inner(
        &self,
        message: &dyn MessageData,
        max_cpu_time: Duration,
        results: &mut ResultSet,
    ) -> Result<(), RuntimeError> {
        let code = &self.binary.code;
        let strings = &self.binary.strings;
        let mut cur = Cursor::new(code);
        let mut test_result = false;
        let start = Instant::now();

        loop {
            if start.elapsed() > max_cpu_time {
                return Err(RuntimeError::BudgetExceeded(max_cpu_time.as_millis() as u64));
            }
            if cur.pos >= code.len() {
                return Ok(()); // fell off the end without an explicit `stop`.
            }

            let op_byte = cur.read_u8()?;
            if op_byte >= CUSTOM_START {
                self.dispatch_extension(op_byte, &mut cur, strings, &mut test_result, results, message)?;
                continue;
            }

            let op = CoreOpcode::from_u8(op_byte).ok_or(RuntimeError::UnknownOpcode(op_byte, cur.pos - 1))?;
            match op {
                CoreOpcode::Stop => return Ok(()),
                CoreOpcode::Nop | CoreOpcode::Require => {}
                CoreOpcode::Jmp => cur.pos = cur.read_jump_target()?,
                CoreOpcode::JmpIfTrue => {
                    let target = cur.read_jump_target()?;
                    if test_result {
                        cur.pos = target;
                    }
                }
                CoreOpcode::JmpIfFalse => {
                    let target = cur.read_jump_target()?;
                    if !test_result {
                        cur.pos = target;
                    }
                }
                CoreOpcode::TestSize => {
                    let over = cur.read_u8()? != 0;
                    let limit = cur.read_varint()?;
                    let size = message.get_physical_size();
                    test_result = if over { size > limit } else { size < limit };
                }
                CoreOpcode::TestHeader => {
                    let names = cur.read_string_list(strings)?;
                    let keys = cur.read_string_list(strings)?;
                    let spec = cur.read_match_spec(strings, false)?;
                    test_result = eval::evaluate_header(message, &names, &keys, &spec);
                }
                CoreOpcode::TestAddress => {
                    let names = cur.read_string_list(strings)?;
                    let keys = cur.read_string_list(strings)?;
                    let spec = cur.read_match_spec(strings, true)?;
                    test_result = eval::evaluate_address(message, &names, &keys, &spec);
                }
                CoreOpcode::TestExists => {
                    let names = cur.read_string_list(strings)?;
                    test_result = names.iter().all(|name| !message.get_header(name, false).is_empty());
                }
                CoreOpcode::TestTrue => test_result = true,
                CoreOpcode::TestFalse => test_result = false,
                CoreOpcode::TestNotPrefix => test_result = !test_result,
                CoreOpcode::Keep => results.push(Action::Keep),
                CoreOpcode::Discard => results.push(Action::Discard),
                CoreOpcode::Redirect => {
                    let addr = cur.read_string_ref(strings)?.to_string();
                    results.push(Action::Redirect(addr));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_extension(
        &self,
        op_byte: u8,
        cur: &mut Cursor<'_>,
        strings: &StringTable,
        test_result: &mut bool,
        results: &mut ResultSet,
        message: &dyn MessageData,
    ) -> Result<(), RuntimeError> {
        let ext_index = (op_byte - CUSTOM_START) as usize;
        let dep = self.binary.ext_deps.get(ext_index).ok_or(RuntimeError::UnknownExtension(op_byte))?;
        let subcode = cur.read_u8()?;
        match (dep.name.as_str(), subcode) {
            ("fileinto", FILEINTO_SUBCODE) => {
                let mailbox = cur.read_string_ref(strings)?.to_string();
                results.push(Action::FileInto(mailbox));
            }
            ("reject", REJECT_SUBCODE) => {
                let reason = cur.read_string_ref(strings)?.to_string();
                results.push(Action::Reject(reason));
            }
            ("envelope", ENVELOPE_SUBCODE) => {
                let names = cur.read_string_list(strings)?;
                let keys = cur.read_string_list(strings)?;
                let spec = cur.read_match_spec(strings, true)?;
                *test_result = eval::evaluate_envelope(message, &names, &keys, &spec);
            }
            _ => return Err(RuntimeError::UnknownExtension(op_byte)),
        }
        Ok(())
    }
}

/// A bytecode read cursor mirroring the write side in `sieve-compiler`'s
/// `CodeGenerator`: `read_u8`/`read_varint` pair with `emit_u8`/
/// `emit_varint`; jump targets are plain 4-byte little-endian absolute
/// offsets, not varints, matching `emit_jump_placeholder`/`resolve_jump`.
struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(code: &'a [u8]) -> Self {
        Self { code, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = *self.code.get(self.pos).ok_or(RuntimeError::TruncatedOperand(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_jump_target(&mut self) -> Result<usize, RuntimeError> {
        let bytes = self.code.get(self.pos..self.pos + 4).ok_or(RuntimeError::TruncatedOperand(self.pos))?;
        self.pos += 4;
        let target = u32::from_le_bytes(bytes.try_into().unwrap()) as usize;
        if target > self.code.len() {
            return Err(RuntimeError::BadJumpTarget(target));
        }
        Ok(target)
    }

    fn read_varint(&mut self) -> Result<u64, RuntimeError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            if shift >= 64 {
                return Err(RuntimeError::TruncatedOperand(self.pos));
            }
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }

    fn read_string_ref<'s>(&mut self, strings: &'s StringTable) -> Result<&'s str, RuntimeError> {
        let offset = self.read_varint()? as u32;
        strings.get(offset).ok_or(RuntimeError::BadStringRef(offset))
    }

    fn read_string_list(&mut self, strings: &StringTable) -> Result<Vec<String>, RuntimeError> {
        let count = self.read_varint()?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.read_string_ref(strings)?.to_string());
        }
        Ok(out)
    }

    /// Reads the optional-operand block trailing `header`/`address`/
    /// `envelope`: `OPTIONAL_BLOCK_PRESENT` followed by `(tag, payload)*`
    /// terminated by `OPTIONAL_BLOCK_END`, mirroring `emit_match_spec_block`.
    fn read_match_spec(&mut self, strings: &StringTable, has_address_part: bool) -> Result<ResolvedMatchSpec, RuntimeError> {
        let _ = has_address_part; // tag bytes are self-describing; kept for call-site symmetry with the generator.
        let present = self.read_u8()?;
        if present != OPTIONAL_BLOCK_PRESENT {
            return Err(RuntimeError::UnknownOperandTag(present));
        }
        let mut spec = ResolvedMatchSpec::default();
        loop {
            let tag = self.read_u8()?;
            if tag == OPTIONAL_BLOCK_END {
                break;
            }
            if tag == OperandClass::AddressPart.tag_byte() {
                spec.address_part = self.read_string_ref(strings)?.to_string();
            } else if tag == OperandClass::MatchType.tag_byte() {
                spec.match_type = self.read_string_ref(strings)?.to_string();
            } else if tag == OperandClass::Comparator.tag_byte() {
                spec.comparator = self.read_string_ref(strings)?.to_string();
            } else {
                return Err(RuntimeError::UnknownOperandTag(tag));
            }
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_compiler::{compile, register_builtins};
    use sieve_core::ExtensionRegistry;
    use std::time::Duration;

    struct FakeMessage {
        size: u64,
        headers: Vec<(&'static str, &'static str)>,
    }

    impl MessageData for FakeMessage {
        fn get_physical_size(&self) -> u64 {
            self.size
        }
        fn get_header(&self, name: &str, _decoded: bool) -> Vec<String> {
            self.headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.to_string())
                .collect()
        }
        fn get_envelope(&self, _field: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn compiled(src: &str) -> BinaryContainer {
        let mut registry = ExtensionRegistry::new();
        register_builtins(&mut registry);
        let outcome = compile("t", src, &mut registry, 100, 1);
        assert!(outcome.ok(), "{:?}", outcome.errors.diagnostics());
        outcome.binary.unwrap()
    }

    #[test]
    fn keep_produces_a_single_keep_action() {
        let bin = compiled("keep;");
        let msg = FakeMessage { size: 0, headers: Vec::new() };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(1));
        assert_eq!(exec.status, ExitStatus::Ok);
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::Keep]);
    }

    #[test]
    fn size_over_picks_the_discard_branch_on_a_large_message() {
        let bin = compiled("if size :over 1K { discard; } else { keep; }");
        let big = FakeMessage { size: 2000, headers: Vec::new() };
        let exec = Interpreter::new(&bin).run(&big, Duration::from_secs(1));
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::Discard]);

        let small = FakeMessage { size: 600, headers: Vec::new() };
        let exec = Interpreter::new(&bin).run(&small, Duration::from_secs(1));
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::Keep]);
    }

    #[test]
    fn header_contains_with_default_comparator_is_case_insensitive() {
        let bin = compiled(r#"if header :contains "Subject" "sale" { fileinto "Junk"; }"#);
        let msg = FakeMessage { size: 0, headers: vec![("Subject", "Weekend SALE!!!")] };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(1));
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::FileInto("Junk".to_string()), Action::Keep]);
    }

    #[test]
    fn header_contains_with_octet_comparator_does_not_match() {
        let bin = compiled(r#"if header :comparator "i;octet" :contains "Subject" "sale" { fileinto "Junk"; }"#);
        let msg = FakeMessage { size: 0, headers: vec![("Subject", "Weekend SALE!!!")] };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(1));
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::Keep]);
    }

    #[test]
    fn address_domain_default_comparator_is_case_insensitive() {
        let bin = compiled(r#"require "fileinto"; if address :domain :is "From" "example.com" { redirect "a@b"; }"#);
        let msg = FakeMessage { size: 0, headers: vec![("From", "x@EXAMPLE.COM")] };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(1));
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::Redirect("a@b".to_string()), Action::Keep]);
    }

    #[test]
    fn anyof_short_circuits_before_the_second_test() {
        let bin = compiled(
            r#"if anyof (header :contains "X" "a", header :contains "Y" "b") { discard; }"#,
        );
        struct Spying {
            queried_y: std::cell::Cell<bool>,
        }
        impl MessageData for Spying {
            fn get_physical_size(&self) -> u64 {
                0
            }
            fn get_header(&self, name: &str, _decoded: bool) -> Vec<String> {
                if name == "Y" {
                    self.queried_y.set(true);
                }
                if name == "X" {
                    vec!["a".to_string()]
                } else {
                    Vec::new()
                }
            }
            fn get_envelope(&self, _field: &str) -> Vec<String> {
                Vec::new()
            }
        }
        let msg = Spying { queried_y: std::cell::Cell::new(false) };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(1));
        assert_eq!(exec.results.resolve().unwrap(), vec![Action::Discard]);
        assert!(!msg.queried_y.get());
    }

    #[test]
    fn unknown_opcode_is_reported_as_bin_corrupt() {
        let mut bin = compiled("keep;");
        bin.code = vec![0xFF, 0x00];
        let msg = FakeMessage { size: 0, headers: Vec::new() };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(1));
        assert_eq!(exec.status, ExitStatus::BinCorrupt);
        assert!(exec.results.is_empty());
    }

    #[test]
    fn cpu_budget_overrun_discards_pending_actions() {
        // fileinto; loop body never loops in this engine (no runtime
        // looping construct), so emulate an overrun with a zero budget.
        let bin = compiled(r#"require "fileinto"; fileinto "Junk";"#);
        let msg = FakeMessage { size: 0, headers: Vec::new() };
        let exec = Interpreter::new(&bin).run(&msg, Duration::from_secs(0));
        assert_eq!(exec.status, ExitStatus::TempFailure);
        assert!(exec.results.is_empty());
    }
}
