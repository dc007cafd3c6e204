//! Runtime error taxonomy and the exit-status mapping
//! `execute()` returns.

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("truncated operand at code offset {0}")]
    TruncatedOperand(usize),
    #[error("unknown opcode {0:#04x} at code offset {1}")]
    UnknownOpcode(u8, usize),
    #[error("extension opcode {0:#04x} has no corresponding dependency-table entry")]
    UnknownExtension(u8),
    #[error("unknown optional-operand tag byte {0:#04x}")]
    UnknownOperandTag(u8),
    #[error("string table reference {0} is out of range")]
    BadStringRef(u32),
    #[error("jump target {0} is outside the code block")]
    BadJumpTarget(usize),
    #[error("CPU time budget of {0}ms exceeded")]
    BudgetExceeded(u64),
    #[error("'reject' and 'keep' in the same result is a conflict")]
    RejectKeepConflict,
    #[error("script-environment callback failed: {0}")]
    Environment(String),
}

impl RuntimeError {
    /// True for errors that map to `BIN_CORRUPT` — malformed
    /// bytecode, as opposed to a message- or resource-dependent failure.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            RuntimeError::TruncatedOperand(_)
                | RuntimeError::UnknownOpcode(..)
                | RuntimeError::UnknownExtension(_)
                | RuntimeError::UnknownOperandTag(_)
                | RuntimeError::BadStringRef(_)
                | RuntimeError::BadJumpTarget(_)
        )
    }
}

/// Exit-status taxonomy, as a sum type rather than plain signed integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    Failure,
    TempFailure,
    BinCorrupt,
    KeepFailed,
}
