//! The script-environment interface: the host-provided
//! collaborators the interpreter reads message data from and reports
//! actions through. This crate defines only
//! the trait boundary, never a concrete mailbox/network backend.

use crate::error::RuntimeError;

/// Read-only access to the message under evaluation.
pub trait MessageData {
    fn get_physical_size(&self) -> u64;

    /// Every value of the header named `name`, in message order. `decoded`
    /// requests RFC 2047 MIME-word decoding; a host that never decodes may
    /// ignore the flag and always return raw values.
    fn get_header(&self, name: &str, decoded: bool) -> Vec<String>;

    /// `field` is one of `from`, `to`, `orig_to`, `auth`;
    /// unknown fields return an empty list rather than erroring.
    fn get_envelope(&self, field: &str) -> Vec<String>;
}

/// Parameters for a `vacation` action. The `vacation` extension's own
/// semantics are not implemented here; this shape exists only because
/// `action_vacation(params)` is part of the interface contract, and no
/// compiled opcode currently emits it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VacationParams {
    pub reason: String,
    pub subject: Option<String>,
    pub days: Option<u32>,
}

/// The action sink and ancillary accessors a [`crate::actions::ResultSet`]
/// commits through.
pub trait ScriptEnv {
    fn user(&self) -> &str;
    fn postmaster_address(&self) -> &str;

    fn action_keep(&mut self, mailbox: Option<&str>) -> Result<(), RuntimeError>;
    fn action_fileinto(&mut self, mailbox: &str) -> Result<(), RuntimeError>;
    fn action_redirect(&mut self, address: &str) -> Result<(), RuntimeError>;
    fn action_reject(&mut self, reason: &str) -> Result<(), RuntimeError>;
    fn action_discard(&mut self) -> Result<(), RuntimeError>;
    fn action_vacation(&mut self, params: &VacationParams) -> Result<(), RuntimeError>;

    /// Used by extensions with duplicate-suppression semantics (e.g.
    /// `redirect :list`, `vacation`); not consulted by the core opcodes.
    fn duplicate_check(&mut self, id: &str) -> bool;
}
