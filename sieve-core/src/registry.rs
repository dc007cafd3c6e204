//! Extension Registry (C2): assigns stable integer ids, tracks loaded /
//! required / enabled state, and is the single place commands, tests, tags,
//! opcodes, and capability strings are looked up from during validation and
//! generation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::hooks::{CommandHooks, TagHooks};

/// A dense, monotone, process-stable extension id. Never reassigned once
/// handed out; disabling an extension does not free its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionId(pub u32);

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ext#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Command,
    Test,
}

/// The static shape of a command or test. Hooks live alongside it in
/// [`RegisteredCommand`], not here,
/// since `CommandDef` must stay plain data for tests to construct easily.
#[derive(Debug, Clone, Copy)]
pub struct CommandDef {
    pub name: &'static str,
    pub kind: CommandKind,
    pub min_positional: usize,
    pub max_positional: Option<usize>,
    pub allow_block: bool,
    pub is_require_like: bool,
}

pub struct RegisteredCommand {
    pub def: CommandDef,
    pub hooks: Arc<dyn CommandHooks>,
    pub owner: ExtensionId,
}

/// A tag descriptor. `identifier` is the exact-name fast path;
/// `hooks.instance_of` is consulted, in registration order, for the
/// polymorphic-family fallback.
pub struct RegisteredTag {
    pub identifier: &'static str,
    pub hooks: Arc<dyn TagHooks>,
    pub owner: ExtensionId,
}

pub struct CapabilityDef {
    pub get_string: fn() -> String,
    pub owner: ExtensionId,
}

/// An extension's static contribution to the engine: a name, and a `load`
/// hook that registers its commands/tags/capabilities into the sink it is
/// handed. Implementations live outside this crate (core built-ins live in
/// `sieve-compiler`/`sieve-runtime`; third-party extensions are not
/// implemented here).
pub trait Extension: Send + Sync {
    fn name(&self) -> &'static str;
    fn load(&self, reg: &mut ExtensionRegistration<'_>);
    fn unload(&self) {}
}

/// The sink an [`Extension::load`] implementation registers into.
pub struct ExtensionRegistration<'a> {
    owner: ExtensionId,
    commands: &'a mut HashMap<String, RegisteredCommand>,
    tests: &'a mut HashMap<String, RegisteredCommand>,
    tags: &'a mut Vec<RegisteredTag>,
    capabilities: &'a mut HashMap<String, CapabilityDef>,
}

impl<'a> ExtensionRegistration<'a> {
    pub fn command(&mut self, def: CommandDef, hooks: Arc<dyn CommandHooks>) {
        self.commands
            .insert(def.name.to_string(), RegisteredCommand { def, hooks, owner: self.owner });
    }

    /// Registers a test construct (as opposed to an action command) —
    /// used by extensions that add tests, e.g. `envelope`.
    pub fn test(&mut self, def: CommandDef, hooks: Arc<dyn CommandHooks>) {
        self.tests
            .insert(def.name.to_string(), RegisteredCommand { def, hooks, owner: self.owner });
    }

    pub fn tag(&mut self, identifier: &'static str, hooks: Arc<dyn TagHooks>) {
        self.tags.push(RegisteredTag { identifier, hooks, owner: self.owner });
    }

    pub fn capability(&mut self, name: &'static str, get_string: fn() -> String) {
        self.capabilities.insert(name.to_string(), CapabilityDef { get_string, owner: self.owner });
    }
}

struct ExtensionRecord {
    id: ExtensionId,
    name: String,
    required: bool,
    loaded: bool,
    enabled: bool,
    ext: Arc<dyn Extension>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown extension '{0}'")]
    UnknownExtension(String),
    #[error("extension '{0}' is required and cannot be disabled")]
    CannotDisableRequired(String),
}

/// See module docs. One registry per engine instance; frozen (read-only
/// outside `set_string`) once `engine_init()` has run.
#[derive(Default)]
pub struct ExtensionRegistry {
    records: Vec<ExtensionRecord>,
    commands: HashMap<String, RegisteredCommand>,
    tests: HashMap<String, RegisteredCommand>,
    tags: Vec<RegisteredTag>,
    capabilities: HashMap<String, CapabilityDef>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ext`, assigning it the next dense id. If `load` is true
    /// (or the extension was already registered, idempotently reusing its
    /// id) its `load` hook runs immediately.
    pub fn register(&mut self, ext: Arc<dyn Extension>, load: bool) -> ExtensionId {
        let name = ext.name().to_string();
        if let Some(existing) = self.records.iter().find(|r| r.name == name) {
            return existing.id;
        }
        let id = ExtensionId(self.records.len() as u32);
        self.records.push(ExtensionRecord {
            id,
            name,
            required: false,
            loaded: false,
            enabled: true,
            ext,
        });
        if load {
            self.load_by_id(id);
        }
        log::debug!("registered extension {} as {id}", self.records[id.0 as usize].name);
        id
    }

    fn load_by_id(&mut self, id: ExtensionId) {
        let idx = id.0 as usize;
        if self.records[idx].loaded {
            return;
        }
        let ext = self.records[idx].ext.clone();
        let mut sink = ExtensionRegistration {
            owner: id,
            commands: &mut self.commands,
            tests: &mut self.tests,
            tags: &mut self.tags,
            capabilities: &mut self.capabilities,
        };
        ext.load(&mut sink);
        self.records[idx].loaded = true;
        log::debug!("loaded extension {id}");
    }

    /// Whether `name` has already been `require`d, for callers that want to
    /// flag a redundant `require` as a warning rather than silently
    /// re-processing it.
    pub fn is_required(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name && r.required)
    }

    /// `require()`: loads `name` immediately and marks it `required`
    /// (required extensions cannot later be disabled by `set_string`).
    pub fn require(&mut self, name: &str) -> Result<ExtensionId, RegistryError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RegistryError::UnknownExtension(name.to_string()))?;
        let id = self.records[idx].id;
        self.records[idx].required = true;
        self.records[idx].enabled = true;
        self.load_by_id(id);
        Ok(id)
    }

    pub fn get_by_id(&self, id: ExtensionId) -> Option<ExtensionInfo<'_>> {
        self.records.get(id.0 as usize).filter(|r| r.enabled).map(ExtensionInfo::from)
    }

    pub fn get_by_name(&self, name: &str) -> Option<ExtensionInfo<'_>> {
        self.records.iter().find(|r| r.name == name && r.enabled).map(ExtensionInfo::from)
    }

    /// Space-separated names of enabled extensions, excluding internal
    /// pseudo-extensions whose name begins with `'@'`.
    pub fn list_string(&self) -> String {
        self.records
            .iter()
            .filter(|r| r.enabled && !r.name.starts_with('@'))
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Keeps only the named extensions enabled, plus all `required` ones.
    /// `None` re-enables everything.
    pub fn set_string(&mut self, list: Option<&str>) {
        match list {
            None => {
                for r in &mut self.records {
                    r.enabled = true;
                }
            }
            Some(list) => {
                let wanted: Vec<&str> = list.split_whitespace().collect();
                for r in &mut self.records {
                    r.enabled = r.required || wanted.contains(&r.name.as_str());
                }
            }
        }
    }

    pub fn register_capability(
        &mut self,
        name: &'static str,
        owner: ExtensionId,
        get_string: fn() -> String,
    ) {
        self.capabilities.insert(name.to_string(), CapabilityDef { get_string, owner });
    }

    pub fn capability(&self, name: &str) -> Option<String> {
        let def = self.capabilities.get(name)?;
        self.is_owner_enabled(def.owner).then(|| (def.get_string)())
    }

    /// Looks up a command by name, visible only if its owning extension is
    /// currently enabled.
    pub fn find_command(&self, name: &str) -> Option<&RegisteredCommand> {
        self.commands.get(name).filter(|c| self.is_owner_enabled(c.owner))
    }

    pub fn find_test(&self, name: &str) -> Option<&RegisteredCommand> {
        self.tests.get(name).filter(|c| self.is_owner_enabled(c.owner))
    }

    /// Resolves a tag argument by exact name first, then by each registered
    /// tag's `instance_of` predicate in registration order.
    pub fn find_tag(&self, name: &str) -> Option<&RegisteredTag> {
        if let Some(exact) = self
            .tags
            .iter()
            .find(|t| t.identifier == name && self.is_owner_enabled(t.owner))
        {
            return Some(exact);
        }
        self.tags
            .iter()
            .find(|t| self.is_owner_enabled(t.owner) && t.hooks.instance_of(name))
    }

    fn is_owner_enabled(&self, owner: ExtensionId) -> bool {
        owner == ExtensionId::CORE || self.records.get(owner.0 as usize).is_some_and(|r| r.enabled)
    }

    /// Direct access for built-ins (`sieve-compiler`, `sieve-runtime`) that
    /// need to insert into the `tests` map without going through an
    /// `Extension` object — used for the always-on core tests (`size`,
    /// `header`, `address`, `exists`) which have no owning extension to
    /// disable.
    pub fn register_core_test(&mut self, def: CommandDef, hooks: Arc<dyn CommandHooks>) {
        self.tests.insert(def.name.to_string(), RegisteredCommand {
            def,
            hooks,
            owner: ExtensionId(u32::MAX),
        });
    }

    pub fn register_core_command(&mut self, def: CommandDef, hooks: Arc<dyn CommandHooks>) {
        self.commands.insert(def.name.to_string(), RegisteredCommand {
            def,
            hooks,
            owner: ExtensionId(u32::MAX),
        });
    }

    pub fn register_core_tag(&mut self, identifier: &'static str, hooks: Arc<dyn TagHooks>) {
        self.tags.push(RegisteredTag { identifier, hooks, owner: ExtensionId(u32::MAX) });
    }
}

/// A read-only snapshot of one extension's registry state.
pub struct ExtensionInfo<'a> {
    pub id: ExtensionId,
    pub name: &'a str,
    pub required: bool,
    pub loaded: bool,
}

impl<'a> From<&'a ExtensionRecord> for ExtensionInfo<'a> {
    fn from(r: &'a ExtensionRecord) -> Self {
        Self { id: r.id, name: &r.name, required: r.required, loaded: r.loaded }
    }
}

impl ExtensionId {
    /// The sentinel owner id used for always-on core commands/tests/tags
    /// that have no extension to disable.
    pub const CORE: ExtensionId = ExtensionId(u32::MAX);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopExt(&'static str);
    impl Extension for NoopExt {
        fn name(&self) -> &'static str {
            self.0
        }
        fn load(&self, _reg: &mut ExtensionRegistration<'_>) {}
    }

    #[test]
    fn register_is_idempotent_on_name() {
        let mut reg = ExtensionRegistry::new();
        let a = reg.register(Arc::new(NoopExt("fileinto")), true);
        let b = reg.register(Arc::new(NoopExt("fileinto")), true);
        assert_eq!(a, b);
    }

    #[test]
    fn set_string_keeps_required_enabled() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Arc::new(NoopExt("fileinto")), true);
        reg.require("fileinto").unwrap();
        reg.register(Arc::new(NoopExt("reject")), true);
        reg.set_string(Some("reject"));
        assert!(reg.get_by_name("fileinto").is_some());
        assert!(reg.get_by_name("reject").is_some());
    }

    #[test]
    fn disabling_hides_name_lookup() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Arc::new(NoopExt("fileinto")), true);
        reg.set_string(Some(""));
        assert!(reg.get_by_name("fileinto").is_none());
    }

    #[test]
    fn list_string_excludes_pseudo_extensions() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Arc::new(NoopExt("@address-parts")), true);
        reg.register(Arc::new(NoopExt("fileinto")), true);
        assert_eq!(reg.list_string(), "fileinto");
    }

    #[test]
    fn require_unknown_extension_fails() {
        let mut reg = ExtensionRegistry::new();
        assert!(matches!(reg.require("no-such-ext"), Err(RegistryError::UnknownExtension(_))));
    }

    struct NoopHooks;
    impl CommandHooks for NoopHooks {}

    struct NoopTag;
    impl TagHooks for NoopTag {
        fn instance_of(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn core_owned_command_test_and_tag_resolve_without_a_require() {
        let mut reg = ExtensionRegistry::new();
        reg.register_core_command(
            CommandDef {
                name: "keep",
                kind: CommandKind::Command,
                min_positional: 0,
                max_positional: Some(0),
                allow_block: false,
                is_require_like: false,
            },
            Arc::new(NoopHooks),
        );
        reg.register_core_test(
            CommandDef {
                name: "true",
                kind: CommandKind::Test,
                min_positional: 0,
                max_positional: Some(0),
                allow_block: false,
                is_require_like: false,
            },
            Arc::new(NoopHooks),
        );
        reg.register_core_tag("is", Arc::new(NoopTag));

        assert!(reg.find_command("keep").is_some());
        assert!(reg.find_test("true").is_some());
        assert!(reg.find_tag("is").is_some());
    }

    #[test]
    fn core_owned_capability_is_emitted() {
        let mut reg = ExtensionRegistry::new();
        reg.register_capability("fileinto", ExtensionId::CORE, || "fileinto".to_string());
        assert_eq!(reg.capability("fileinto"), Some("fileinto".to_string()));
    }
}
