//! Foundation crate for the Sieve filter engine: the pipeline-wide error
//! handler (C1), the extension registry (C2), and the static opcode/operand
//! descriptors shared by every later stage.
//!
//! This crate defines the *framework* extensions plug into — command/tag
//! descriptors, hook traits, opcode numbering — not any extension's
//! behavior. Individual extensions' semantics are left to `sieve-compiler`
//! and `sieve-runtime`, which provide the built-in ones (`fileinto`,
//! `reject`, `envelope`, the comparator / match-type / address-part
//! meta-extensions).

pub mod error;
pub mod hooks;
pub mod location;
pub mod opcode;
pub mod registry;

pub use error::{CriticalError, Diagnostic, ErrorHandler, ErrorKind, Severity};
pub use hooks::{CommandHooks, GenerationContext, JumpFixup, TagHooks, ValidationContext};
pub use location::Location;
pub use opcode::{
    CoreOpcode, Operand, OperandClass, CUSTOM_START, EXT_OPCODE_MAX, OPTIONAL_BLOCK_END,
    OPTIONAL_BLOCK_PRESENT,
};
pub use registry::{
    CommandDef, CommandKind, Extension, ExtensionId, ExtensionInfo, ExtensionRegistration,
    ExtensionRegistry, RegisteredCommand, RegisteredTag, RegistryError,
};
