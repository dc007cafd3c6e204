//! Pipeline-wide error handling (C1).
//!
//! Parser, validator, and generator stages all report through one
//! [`ErrorHandler`] rather than unwinding: a stage keeps going after an
//! `error()` call so later constructs are still checked, and only fails
//! once it has finished walking the input.

use std::fmt;

use crate::location::Location;

/// The error-kind taxonomy a host-facing diagnostic carries. Only [`ErrorKind::Internal`]
/// denotes an implementation bug; every other variant is an expected,
/// recoverable outcome a host is expected to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    None,
    TempFailure,
    NoQuota,
    NotFound,
    NoPermission,
    NotPossible,
    NotValid,
    BadResource,
    Exists,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        match &self.location {
            Some(loc) => write!(f, "{level}: {loc}: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

/// Raised by [`ErrorHandler::critical`]. A critical error is the one case
/// that *does* abort the current stage immediately instead of accumulating.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CriticalError(pub String);

/// Collects diagnostics for one compile (or one pipeline-level operation)
/// and enforces a `max_errors` cap: errors past
/// the cap are still counted but dropped from the log, so the user sees
/// "N errors" even though only the first `max_errors` were printed.
pub struct ErrorHandler {
    max_errors: usize,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl ErrorHandler {
    pub fn new(max_errors: usize) -> Self {
        Self { max_errors, diagnostics: Vec::new(), error_count: 0, warning_count: 0 }
    }

    pub fn error(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.error_count += 1;
        self.push(Severity::Error, location, message.into());
        log::error!("{}", self.diagnostics.last().unwrap());
    }

    pub fn warning(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.warning_count += 1;
        self.push(Severity::Warning, location, message.into());
        log::warn!("{}", self.diagnostics.last().unwrap());
    }

    /// Records a critical diagnostic and returns an error the caller must
    /// propagate to abort the current stage immediately.
    pub fn critical(
        &mut self,
        location: Option<Location>,
        message: impl Into<String>,
    ) -> CriticalError {
        let message = message.into();
        self.error_count += 1;
        self.push(Severity::Critical, location, message.clone());
        log::error!("critical: {message}");
        CriticalError(message)
    }

    fn push(&mut self, severity: Severity, location: Option<Location>, message: String) {
        if self.diagnostics.len() < self.max_errors {
            self.diagnostics.push(Diagnostic { severity, location, message });
        }
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// A stage that reported no errors (warnings are fine) may proceed.
    pub fn ok(&self) -> bool {
        self.error_count == 0
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_recorded_diagnostics_but_keeps_counting() {
        let mut eh = ErrorHandler::new(2);
        for i in 0..5 {
            eh.error(None, format!("err {i}"));
        }
        assert_eq!(eh.error_count(), 5);
        assert_eq!(eh.diagnostics().len(), 2);
        assert!(!eh.ok());
    }

    #[test]
    fn warnings_do_not_fail_the_stage() {
        let mut eh = ErrorHandler::default();
        eh.warning(None, "deprecated construct");
        assert_eq!(eh.warning_count(), 1);
        assert!(eh.ok());
    }
}
