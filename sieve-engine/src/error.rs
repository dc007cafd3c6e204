//! The engine-level error taxonomy: what `compile`/`open`
//! can fail with. `execute`/`test` report through
//! [`sieve_runtime::ExitStatus`] instead, since a runtime failure is a
//! per-message outcome, not a pipeline error.

use sieve_binary::BinaryError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("script not found: {0}")]
    NotFound(String),
    #[error("script is not valid: {0}")]
    NotValid(String),
    #[error("no permission: {0}")]
    NoPermission(String),
    #[error("resource error: {0}")]
    BadResource(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BinaryError> for EngineError {
    fn from(e: BinaryError) -> Self {
        match e {
            BinaryError::NotFound(_) => EngineError::NotFound(e.to_string()),
            BinaryError::NoPermission(_) => EngineError::NoPermission(e.to_string()),
            BinaryError::NotValid(msg) => EngineError::NotValid(msg),
            BinaryError::BadMagic | BinaryError::Corrupt(_) => EngineError::BadResource(e.to_string()),
            BinaryError::Io(_) => EngineError::BadResource(e.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        BinaryError::from(e).into()
    }
}
