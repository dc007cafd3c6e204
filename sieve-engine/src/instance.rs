//! `Engine`/`Instance`: the public entry point wiring the
//! frontend (`sieve-syntax`, `sieve-compiler`), the container
//! (`sieve-binary`), and the backend (`sieve-runtime`) together behind one
//! API.
//!
//! One `Instance` owns one [`ExtensionRegistry`]: the registry
//! is process/instance-wide state, read-only outside `set_extensions` once
//! `init` has registered the built-ins.

use std::fs;
use std::io::Write;
use std::path::Path;

use sieve_binary::BinaryContainer;
use sieve_core::{ErrorHandler, ExtensionRegistry};
use sieve_runtime::{ExitStatus, Interpreter, MessageData, ScriptEnv};

use crate::config::{CompileFlags, EngineConfig, ExecuteFlags};
use crate::error::EngineError;

/// The on-disk/bytecode format version this build of the engine emits and
/// requires; bumped only alongside a `sieve-binary` format change.
pub const COMPILER_VERSION: u16 = 1;

/// Process-wide host hooks a raw-mail host wires up before any script runs
/// are not implemented here, so `init` takes only the ambient
/// [`EngineConfig`].
pub struct Instance {
    registry: ExtensionRegistry,
    config: EngineConfig,
}

impl Instance {
    pub fn init(config: EngineConfig) -> Self {
        let mut registry = ExtensionRegistry::new();
        sieve_compiler::register_builtins(&mut registry);
        Self { registry, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Keeps only the named extensions enabled (plus any `required` ones);
    /// `None` re-enables everything.
    pub fn set_extensions(&mut self, list: Option<&str>) {
        self.registry.set_string(list);
    }

    /// Parse → validate → generate.
    /// Returns `NotValid` with the collected diagnostics if any stage
    /// reported an error — a missing `require` fails here, with no
    /// binary produced.
    pub fn compile(
        &mut self,
        script_name: &str,
        source: &str,
        flags: CompileFlags,
    ) -> Result<BinaryContainer, EngineError> {
        let outcome = sieve_compiler::compile(
            script_name.to_string(),
            source,
            &mut self.registry,
            self.config.max_errors_per_compile,
            COMPILER_VERSION,
        );
        if !outcome.ok() {
            return Err(EngineError::NotValid(diagnostics_summary(&outcome.errors)));
        }
        let mut binary = outcome.binary.expect("ok() implies a binary was generated");
        if flags.contains(CompileFlags::DEBUG) {
            binary.flags = binary.flags | sieve_binary::HeaderFlags::DEBUG_INFO;
        }
        Ok(binary)
    }

    /// Load a cached binary next to `source_path` if
    /// it exists, is not stale, and is executable against
    /// the current registry; otherwise recompile and save it there.
    ///
    /// Script storage backends other than the filesystem (LDAP, database,
    /// …) are not implemented here.
    pub fn open(
        &mut self,
        source_path: &Path,
        binary_path: &Path,
        script_name: &str,
        flags: CompileFlags,
    ) -> Result<BinaryContainer, EngineError> {
        let source = fs::read_to_string(source_path)?;
        let metadata = fs::metadata(source_path)?;
        let source_mtime = metadata.modified()?;
        let source_size = metadata.len();

        if let Ok(cached) = BinaryContainer::load(binary_path) {
            let stale = cached.is_stale(source_mtime, source_size, COMPILER_VERSION);
            if !stale && cached.check_executable(&self.registry).is_ok() {
                return Ok(cached);
            }
            log::debug!("cached binary at {} is stale or not executable; recompiling", binary_path.display());
        }

        let mut binary = self.compile(script_name, &source, flags)?;
        binary.source_info = Some(sieve_binary::SourceInfo {
            source_path: source_path.to_path_buf(),
            source_mtime,
            source_size,
        });
        binary.save(binary_path)?;
        Ok(binary)
    }

    /// Runs the interpreter and, unless `flags` says otherwise, commits
    /// the resolved actions through `env`. Both the interpretation stage
    /// and the commit stage route their diagnostics through `log` rather
    /// than separate error-handler callbacks, and only the resulting
    /// [`ExitStatus`] is returned.
    pub fn execute(
        &self,
        binary: &BinaryContainer,
        message: &dyn MessageData,
        env: &mut dyn ScriptEnv,
        flags: ExecuteFlags,
    ) -> ExitStatus {
        if let Err(e) = binary.check_executable(&self.registry) {
            log::error!("binary rejected: {e}");
            return ExitStatus::BinCorrupt;
        }
        let exec = Interpreter::new(binary).run(message, self.config.max_cpu_time);
        if flags.contains(ExecuteFlags::LOG_RESULT) {
            log::info!("execution finished with status {:?}", exec.status);
        }
        match exec.status {
            ExitStatus::Ok | ExitStatus::Failure => {
                if flags.contains(ExecuteFlags::NO_DELIVERY) {
                    exec.status
                } else {
                    exec.results.commit(env)
                }
            }
            other => other,
        }
    }

    /// A dry run — runs the same interpretation and conflict resolution as
    /// `execute`, but prints the resolved action list instead of
    /// committing it. Uses the same conflict rules as `execute`, not a
    /// simplified preview.
    pub fn test(
        &self,
        binary: &BinaryContainer,
        message: &dyn MessageData,
        out: &mut dyn Write,
    ) -> std::io::Result<ExitStatus> {
        if let Err(e) = binary.check_executable(&self.registry) {
            writeln!(out, "binary rejected: {e}")?;
            return Ok(ExitStatus::BinCorrupt);
        }
        let exec = Interpreter::new(binary).run(message, self.config.max_cpu_time);
        match exec.results.resolve() {
            Ok(actions) => {
                for action in &actions {
                    writeln!(out, "{action:?}")?;
                }
            }
            Err(e) => writeln!(out, "conflict: {e}")?,
        }
        Ok(exec.status)
    }
}

fn diagnostics_summary(errors: &ErrorHandler) -> String {
    let joined = errors
        .diagnostics()
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} error(s): {joined}", errors.error_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_runtime::RuntimeError;

    struct FakeMessage {
        size: u64,
        headers: Vec<(&'static str, &'static str)>,
    }

    impl MessageData for FakeMessage {
        fn get_physical_size(&self) -> u64 {
            self.size
        }
        fn get_header(&self, name: &str, _decoded: bool) -> Vec<String> {
            self.headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.to_string())
                .collect()
        }
        fn get_envelope(&self, _field: &str) -> Vec<String> {
            Vec::new()
        }
    }

    struct RecordingEnv {
        committed: Vec<String>,
    }

    impl ScriptEnv for RecordingEnv {
        fn user(&self) -> &str {
            "user"
        }
        fn postmaster_address(&self) -> &str {
            "postmaster@example.com"
        }
        fn action_keep(&mut self, _mailbox: Option<&str>) -> Result<(), RuntimeError> {
            self.committed.push("keep".to_string());
            Ok(())
        }
        fn action_fileinto(&mut self, mailbox: &str) -> Result<(), RuntimeError> {
            self.committed.push(format!("fileinto:{mailbox}"));
            Ok(())
        }
        fn action_redirect(&mut self, address: &str) -> Result<(), RuntimeError> {
            self.committed.push(format!("redirect:{address}"));
            Ok(())
        }
        fn action_reject(&mut self, reason: &str) -> Result<(), RuntimeError> {
            self.committed.push(format!("reject:{reason}"));
            Ok(())
        }
        fn action_discard(&mut self) -> Result<(), RuntimeError> {
            self.committed.push("discard".to_string());
            Ok(())
        }
        fn action_vacation(&mut self, _params: &sieve_runtime::VacationParams) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn duplicate_check(&mut self, _id: &str) -> bool {
            false
        }
    }

    #[test]
    fn compile_missing_require_fails_with_not_valid() {
        let mut instance = Instance::init(EngineConfig::default());
        let err = instance
            .compile("t", "require [\"no-such-ext\"];\nkeep;", CompileFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotValid(_)));
    }

    #[test]
    fn execute_commits_keep_end_to_end() {
        let mut instance = Instance::init(EngineConfig::default());
        let binary = instance.compile("t", "keep;", CompileFlags::NONE).unwrap();
        let msg = FakeMessage { size: 0, headers: Vec::new() };
        let mut env = RecordingEnv { committed: Vec::new() };
        let status = instance.execute(&binary, &msg, &mut env, ExecuteFlags::NONE);
        assert_eq!(status, ExitStatus::Ok);
        assert_eq!(env.committed, vec!["keep".to_string()]);
    }

    #[test]
    fn no_delivery_flag_skips_commit() {
        let mut instance = Instance::init(EngineConfig::default());
        let binary = instance.compile("t", "keep;", CompileFlags::NONE).unwrap();
        let msg = FakeMessage { size: 0, headers: Vec::new() };
        let mut env = RecordingEnv { committed: Vec::new() };
        let status = instance.execute(&binary, &msg, &mut env, ExecuteFlags::NO_DELIVERY);
        assert_eq!(status, ExitStatus::Ok);
        assert!(env.committed.is_empty());
    }

    #[test]
    fn open_recompiles_when_no_cached_binary_exists() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("script.sieve");
        let binary_path = dir.path().join("script.svbin");
        fs::write(&source_path, "keep;").unwrap();

        let mut instance = Instance::init(EngineConfig::default());
        let binary = instance.open(&source_path, &binary_path, "t", CompileFlags::NONE).unwrap();
        assert!(!binary.code.is_empty());
        assert!(binary_path.exists());
    }

    #[test]
    fn open_reuses_a_fresh_cached_binary() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("script.sieve");
        let binary_path = dir.path().join("script.svbin");
        fs::write(&source_path, "keep;").unwrap();

        let mut instance = Instance::init(EngineConfig::default());
        instance.open(&source_path, &binary_path, "t", CompileFlags::NONE).unwrap();
        let second = instance.open(&source_path, &binary_path, "t", CompileFlags::NONE).unwrap();
        assert!(second.source_info.is_some());
    }

    #[test]
    fn test_dry_run_prints_the_resolved_action_list_without_committing() {
        let mut instance = Instance::init(EngineConfig::default());
        let binary = instance.compile("t", "discard;", CompileFlags::NONE).unwrap();
        let msg = FakeMessage { size: 0, headers: Vec::new() };
        let mut out = Vec::new();
        let status = instance.test(&binary, &msg, &mut out).unwrap();
        assert_eq!(status, ExitStatus::Ok);
        assert!(String::from_utf8(out).unwrap().contains("Discard"));
    }
}
