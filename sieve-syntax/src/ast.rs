//! The abstract syntax tree (C4): commands, tests, and arguments, each
//! carrying a source [`Location`] and two opaque attachment slots
//! (`context`, `ext_id`) every node gets.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use sieve_core::{ExtensionId, Location};

/// An extension-keyed heterogeneous map in place of a single `void*`: each
/// extension hangs its own typed data off a node without colliding with
/// another extension's.
#[derive(Default)]
pub struct NodeContext(HashMap<ExtensionId, Box<dyn Any + Send + Sync>>);

impl NodeContext {
    pub fn set<T: Send + Sync + 'static>(&mut self, owner: ExtensionId, value: T) {
        self.0.insert(owner, Box::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self, owner: ExtensionId) -> Option<&T> {
        self.0.get(&owner).and_then(|b| b.downcast_ref())
    }

    /// Inserts an already-boxed value, for callers (the validator) relaying
    /// a [`sieve_core::ValidationContext::set_context`] call whose value
    /// arrived pre-erased.
    pub fn set_any(&mut self, owner: ExtensionId, value: Box<dyn Any + Send + Sync>) {
        self.0.insert(owner, value);
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeContext({} entries)", self.0.len())
    }
}

/// A resolved (address-part, match-type, comparator) triple, attached to a
/// test's context by the validator; defaults are `(all, is,
/// i;ascii-casemap)` when the script specifies none of the three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    pub address_part: String,
    pub match_type: String,
    pub comparator: String,
}

impl Default for MatchSpec {
    fn default() -> Self {
        Self {
            address_part: "all".into(),
            match_type: "is".into(),
            comparator: "i;ascii-casemap".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    Number(u64),
    String(String),
    StringList(Vec<String>),
    Tag(String),
    Identifier(String),
    Test(Box<Test>),
    TestList(Vec<Test>),
}

#[derive(Debug)]
pub struct Argument {
    pub value: ArgumentValue,
    pub location: Location,
    pub context: NodeContext,
    pub ext_id: Option<ExtensionId>,
}

impl Argument {
    pub fn new(value: ArgumentValue, location: Location) -> Self {
        Self { value, location, context: NodeContext::default(), ext_id: None }
    }

    /// True for a bare `Tag` argument (`:over`, `:contains`, …).
    pub fn is_tag(&self) -> bool {
        matches!(self.value, ArgumentValue::Tag(_))
    }

    pub fn tag_name(&self) -> Option<&str> {
        match &self.value {
            ArgumentValue::Tag(name) => Some(name),
            _ => None,
        }
    }

    /// A `StringList` of length 1 is interchangeable with a `String` at the
    /// type-check layer.
    pub fn as_string_list(&self) -> Option<&[String]> {
        match &self.value {
            ArgumentValue::StringList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_single_string(&self) -> Option<&str> {
        match &self.value {
            ArgumentValue::String(s) => Some(s),
            ArgumentValue::StringList(list) if list.len() == 1 => Some(&list[0]),
            _ => None,
        }
    }
}

/// A test node. Logical structure (`anyof`/`allof`/`not`) is ordinary
/// command-shaped data here — `anyof`/`allof` are tests named "anyof"/
/// "allof" whose sole argument is a `TestList`, and `not` is a test named
/// "not" whose sole argument is a nested `Test`. The validator and
/// generator are what give these names special (short-circuiting) meaning.
#[derive(Debug)]
pub struct Test {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub location: Location,
    pub context: NodeContext,
    pub ext_id: Option<ExtensionId>,
}

impl Test {
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>, location: Location) -> Self {
        Self {
            name: name.into(),
            arguments,
            location,
            context: NodeContext::default(),
            ext_id: None,
        }
    }

    pub fn positional(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| !a.is_tag())
    }

    pub fn tags(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.is_tag())
    }
}

#[derive(Debug)]
pub struct Command {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub block: Vec<Command>,
    pub location: Location,
    pub context: NodeContext,
    pub ext_id: Option<ExtensionId>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        arguments: Vec<Argument>,
        block: Vec<Command>,
        location: Location,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            block,
            location,
            context: NodeContext::default(),
            ext_id: None,
        }
    }

    pub fn positional(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| !a.is_tag())
    }

    pub fn tags(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.is_tag())
    }

    /// The single test argument of an `if`/`elsif` command, if present.
    pub fn test(&self) -> Option<&Test> {
        self.arguments.iter().find_map(|a| match &a.value {
            ArgumentValue::Test(t) => Some(t.as_ref()),
            _ => None,
        })
    }
}

/// The root of one compiled script: its top-level commands, in source
/// order. `require` commands are guaranteed (by the parser) to precede any
/// non-`require` top-level command, or the parser reports an error.
#[derive(Debug)]
pub struct Script {
    pub commands: Vec<Command>,
}
