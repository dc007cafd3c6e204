use std::fmt;
use std::sync::Arc;

/// A position in a script's source text, or the pipeline-wide `None` used for
/// messages that are not tied to a single construct.
///
/// Every diagnostic and every AST node carries one of these as a
/// `(script_name, line, column)` triple, and `None` is a legitimate value
/// for pipeline-level messages (e.g. "no such extension").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub script_name: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(script_name: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self { script_name: script_name.into(), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.script_name, self.line, self.column)
    }
}
