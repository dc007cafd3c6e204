//! Registrations for the RFC 5228 base language (always on, owned by
//! [`ExtensionId::CORE`]) and the three optional extensions this engine
//! ships (`fileinto`, `reject`, `envelope`), gated behind `require` the same
//! way a genuinely third-party extension would be.
//!
//! Base commands/tests get a shared no-op [`CommandHooks`] impl since their
//! bytecode shape is fixed and emitted directly by the generator (they have
//! dedicated [`sieve_core::CoreOpcode`] values, not a two-level extension
//! opcode); `size` is the one exception with validate-time semantics of its
//! own. The three optional extensions use `generate` for real, since their
//! opcode is `CUSTOM_START + ext_index` and only the hook knows which
//! extension it belongs to.

use std::sync::Arc;

use sieve_core::{
    CommandDef, CommandHooks, CommandKind, Extension, ExtensionRegistration, GenerationContext,
    TagHooks, ValidationContext, CUSTOM_START,
};

use sieve_core::ExtensionRegistry;

/// No-op hooks for base constructs whose validation is covered entirely by
/// arity checking and whose bytecode the generator emits directly by name.
struct CoreLeaf;
impl CommandHooks for CoreLeaf {}

struct SizeHooks;
impl CommandHooks for SizeHooks {
    fn validate(&self, ctx: &mut dyn ValidationContext) {
        let over = ctx.has_tag("over");
        let under = ctx.has_tag("under");
        if over == under {
            ctx.report_error("'size' requires exactly one of ':over' or ':under'".to_string());
        }
    }
}

/// Polymorphic-tag-family dispatch: one
/// `instance_of` predicate per family instead of the validator special-
/// casing each tag name.
struct MatchTypeTag;
impl TagHooks for MatchTypeTag {
    fn instance_of(&self, name: &str) -> bool {
        matches!(name, "is" | "contains" | "matches")
    }
}

struct AddressPartTag;
impl TagHooks for AddressPartTag {
    fn instance_of(&self, name: &str) -> bool {
        matches!(name, "localpart" | "domain" | "all")
    }
}

struct ComparatorTag;
impl TagHooks for ComparatorTag {
    fn instance_of(&self, name: &str) -> bool {
        name == "comparator"
    }
}

struct SizeDirectionTag;
impl TagHooks for SizeDirectionTag {
    fn instance_of(&self, name: &str) -> bool {
        matches!(name, "over" | "under")
    }
}

pub const FILEINTO_SUBCODE: u8 = 0x01;
pub const REJECT_SUBCODE: u8 = 0x01;
pub const ENVELOPE_SUBCODE: u8 = 0x01;

struct FileIntoExtension;
impl Extension for FileIntoExtension {
    fn name(&self) -> &'static str {
        "fileinto"
    }
    fn load(&self, reg: &mut ExtensionRegistration<'_>) {
        reg.command(
            CommandDef {
                name: "fileinto",
                kind: CommandKind::Command,
                min_positional: 1,
                max_positional: Some(1),
                allow_block: false,
                is_require_like: false,
            },
            Arc::new(FileIntoHooks),
        );
    }
}

struct FileIntoHooks;
impl CommandHooks for FileIntoHooks {
    fn generate(&self, ctx: &mut dyn GenerationContext, ext_index: u8) {
        ctx.emit_opcode(CUSTOM_START.wrapping_add(ext_index));
        ctx.emit_u8(FILEINTO_SUBCODE);
    }
}

struct RejectExtension;
impl Extension for RejectExtension {
    fn name(&self) -> &'static str {
        "reject"
    }
    fn load(&self, reg: &mut ExtensionRegistration<'_>) {
        reg.command(
            CommandDef {
                name: "reject",
                kind: CommandKind::Command,
                min_positional: 1,
                max_positional: Some(1),
                allow_block: false,
                is_require_like: false,
            },
            Arc::new(RejectHooks),
        );
    }
}

struct RejectHooks;
impl CommandHooks for RejectHooks {
    fn generate(&self, ctx: &mut dyn GenerationContext, ext_index: u8) {
        ctx.emit_opcode(CUSTOM_START.wrapping_add(ext_index));
        ctx.emit_u8(REJECT_SUBCODE);
    }
}

struct EnvelopeExtension;
impl Extension for EnvelopeExtension {
    fn name(&self) -> &'static str {
        "envelope"
    }
    fn load(&self, reg: &mut ExtensionRegistration<'_>) {
        reg.test(
            CommandDef {
                name: "envelope",
                kind: CommandKind::Test,
                min_positional: 2,
                max_positional: Some(2),
                allow_block: false,
                is_require_like: false,
            },
            Arc::new(EnvelopeHooks),
        );
    }
}

struct EnvelopeHooks;
impl CommandHooks for EnvelopeHooks {
    fn generate(&self, ctx: &mut dyn GenerationContext, ext_index: u8) {
        ctx.emit_opcode(CUSTOM_START.wrapping_add(ext_index));
        ctx.emit_u8(ENVELOPE_SUBCODE);
    }
}

/// Registers the RFC 5228 base commands/tests plus `fileinto`/`reject`/
/// `envelope` into `registry`. Called once, by `sieve-engine`'s
/// `engine_init`, before any script is validated.
pub fn register_builtins(registry: &mut ExtensionRegistry) {
    let command = |name, min, max, allow_block| CommandDef {
        name,
        kind: CommandKind::Command,
        min_positional: min,
        max_positional: max,
        allow_block,
        is_require_like: false,
    };
    let test = |name, min, max| CommandDef {
        name,
        kind: CommandKind::Test,
        min_positional: min,
        max_positional: max,
        allow_block: false,
        is_require_like: false,
    };

    registry.register_core_command(command("keep", 0, Some(0), false), Arc::new(CoreLeaf));
    registry.register_core_command(command("discard", 0, Some(0), false), Arc::new(CoreLeaf));
    registry.register_core_command(command("stop", 0, Some(0), false), Arc::new(CoreLeaf));
    registry.register_core_command(command("redirect", 1, Some(1), false), Arc::new(CoreLeaf));

    registry.register_core_test(test("size", 1, Some(1)), Arc::new(SizeHooks));
    registry.register_core_test(test("header", 2, Some(2)), Arc::new(CoreLeaf));
    registry.register_core_test(test("address", 2, Some(2)), Arc::new(CoreLeaf));
    registry.register_core_test(test("exists", 1, Some(1)), Arc::new(CoreLeaf));
    registry.register_core_test(test("true", 0, Some(0)), Arc::new(CoreLeaf));
    registry.register_core_test(test("false", 0, Some(0)), Arc::new(CoreLeaf));

    registry.register_core_tag("is", Arc::new(MatchTypeTag));
    registry.register_core_tag("localpart", Arc::new(AddressPartTag));
    registry.register_core_tag("comparator", Arc::new(ComparatorTag));
    registry.register_core_tag("over", Arc::new(SizeDirectionTag));

    registry.register(Arc::new(FileIntoExtension), false);
    registry.register(Arc::new(RejectExtension), false);
    registry.register(Arc::new(EnvelopeExtension), false);
}
