//! The Interpreter (C8) and Result Set (C9): executes a compiled binary
//! against a message, accumulating pending actions, and commits them
//! through a host-provided script-environment.

mod address;
mod comparator;
mod match_type;

pub mod actions;
pub mod env;
pub mod error;
pub mod eval;
pub mod interp;

pub use actions::{Action, MultiScript, ResultSet};
pub use env::{MessageData, ScriptEnv, VacationParams};
pub use error::{ExitStatus, RuntimeError};
pub use interp::{Execution, Interpreter};
