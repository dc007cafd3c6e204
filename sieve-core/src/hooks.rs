//! Interfaces through which an [`Extension`](crate::registry::Extension)
//! plugs into the validator and generator without either crate depending on
//! the other's concrete node types.
//!
//! Extensions hang private data on an opaque per-node context rather than
//! the validator/generator exposing their AST directly;
//! [`ValidationContext`] and [`GenerationContext`] are the narrow views
//! extensions are given instead.

use std::any::Any;

use crate::location::Location;
use crate::registry::ExtensionId;

/// What a command/tag/test hook sees while the validator (C5) is visiting
/// its node. Implemented by `sieve-compiler`'s `Validator`; never by an
/// extension itself.
pub trait ValidationContext {
    fn command_name(&self) -> &str;
    fn location(&self) -> Location;
    fn positional_count(&self) -> usize;
    fn has_tag(&self, name: &str) -> bool;
    fn report_error(&mut self, message: String);
    fn report_warning(&mut self, message: String);
    /// Attaches extension-private data to the node currently being
    /// validated, keyed by the owning extension's id.
    fn set_context(&mut self, owner: ExtensionId, value: Box<dyn Any + Send + Sync>);
    /// Marks the `count` arguments following the current tag as consumed by
    /// that tag, so the positional-argument walk does not also see them.
    fn consume_following_arguments(&mut self, count: usize);
}

/// Opaque handle to a not-yet-resolved jump target. The generator backpatches
/// it once the jump's destination has been emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpFixup(pub usize);

/// What a command/tag hook sees while the generator (C6) is emitting code
/// for its node. Implemented by `sieve-compiler`'s `CodeGenerator`.
pub trait GenerationContext {
    fn emit_opcode(&mut self, code: u8);
    fn emit_u8(&mut self, value: u8);
    fn emit_varint(&mut self, value: u64);
    /// Interns `s` into the string table (block 1) and emits its offset.
    fn emit_string(&mut self, s: &str);
    fn emit_jump_placeholder(&mut self) -> JumpFixup;
    /// Backpatches a placeholder emitted by [`Self::emit_jump_placeholder`]
    /// with the current position as the jump target.
    fn resolve_jump(&mut self, fixup: JumpFixup);
    fn current_offset(&self) -> usize;
}

/// Per-command hooks an extension registers alongside its
/// [`CommandDef`](crate::registry::CommandDef).
pub trait CommandHooks: Send + Sync {
    fn pre_validate(&self, _ctx: &mut dyn ValidationContext) {}
    fn validate(&self, _ctx: &mut dyn ValidationContext) {}
    /// `ext_index` is this extension's index in the binary's dependency
    /// table (block 2); the hook uses it to emit the two-level extension
    /// opcode `CUSTOM_START | ext_index, subcode`.
    fn generate(&self, _ctx: &mut dyn GenerationContext, _ext_index: u8) {}
}

/// Per-tag hooks. `instance_of` implements polymorphic tag-family
/// dispatch as a membership predicate rather than string pattern
/// matching — a tag family like address-part modifiers answers
/// `instance_of("localpart")`,
/// `instance_of("domain")`, `instance_of("all")` rather than the validator
/// special-casing those names.
pub trait TagHooks: Send + Sync {
    fn instance_of(&self, name: &str) -> bool;
    fn validate(&self, _name: &str, _ctx: &mut dyn ValidationContext) {}
    fn generate(&self, _name: &str, _ctx: &mut dyn GenerationContext) {}
}
