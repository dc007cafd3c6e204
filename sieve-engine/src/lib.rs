//! Public API facade: wires the parser (`sieve-syntax`), the
//! validator/generator (`sieve-compiler`), the binary container
//! (`sieve-binary`), and the interpreter/result-set (`sieve-runtime`) into
//! the `Instance` surface a host embeds against.
//!
//! `multiscript` re-exports `sieve_runtime::MultiScript`
//! (`multiscript.{start_execute, start_test, run,
//! will_discard, run_discard, tempfail, finish}`); the type itself lives in
//! `sieve-runtime` since it operates purely on [`sieve_runtime::ResultSet`]s
//! with no dependency on the compiler/container stages this crate adds.

pub mod config;
pub mod dump;
pub mod error;
pub mod instance;

pub use config::{CompileFlags, EngineConfig, ExecuteFlags};
pub use dump::{dump, hexdump};
pub use error::EngineError;
pub use instance::{Instance, COMPILER_VERSION};

/// Re-exported under the name the chained-script API uses.
pub mod multiscript {
    pub use sieve_runtime::MultiScript;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_runtime::{ExitStatus, MessageData, RuntimeError, ScriptEnv};

    struct FakeMessage;
    impl MessageData for FakeMessage {
        fn get_physical_size(&self) -> u64 {
            0
        }
        fn get_header(&self, _name: &str, _decoded: bool) -> Vec<String> {
            Vec::new()
        }
        fn get_envelope(&self, _field: &str) -> Vec<String> {
            Vec::new()
        }
    }

    struct RecordingEnv(Vec<String>);
    impl ScriptEnv for RecordingEnv {
        fn user(&self) -> &str {
            "user"
        }
        fn postmaster_address(&self) -> &str {
            "postmaster@example.com"
        }
        fn action_keep(&mut self, _mailbox: Option<&str>) -> Result<(), RuntimeError> {
            self.0.push("keep".to_string());
            Ok(())
        }
        fn action_fileinto(&mut self, mailbox: &str) -> Result<(), RuntimeError> {
            self.0.push(format!("fileinto:{mailbox}"));
            Ok(())
        }
        fn action_redirect(&mut self, address: &str) -> Result<(), RuntimeError> {
            self.0.push(format!("redirect:{address}"));
            Ok(())
        }
        fn action_reject(&mut self, reason: &str) -> Result<(), RuntimeError> {
            self.0.push(format!("reject:{reason}"));
            Ok(())
        }
        fn action_discard(&mut self) -> Result<(), RuntimeError> {
            self.0.push("discard".to_string());
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
    fn multiscript_chain_commits_once_through_the_engine_s_reexport() {
        let mut instance = Instance::init(EngineConfig::default());
        let first = instance.compile("a", r#"require "fileinto"; fileinto "Junk";"#, CompileFlags::NONE).unwrap();
        let second = instance.compile("b", "discard;", CompileFlags::NONE).unwrap();

        let msg = FakeMessage;
        let exec1 = sieve_runtime::Interpreter::new(&first).run(&msg, instance.config().max_cpu_time);
        let exec2 = sieve_runtime::Interpreter::new(&second).run(&msg, instance.config().max_cpu_time);

        let mut chain = multiscript::MultiScript::start_execute();
        chain.run(exec1.results);
        chain.run(exec2.results);

        let mut env = RecordingEnv(Vec::new());
        let status = chain.finish(&mut env);
        assert_eq!(status, ExitStatus::Ok);
        assert!(env.0.iter().any(|a| a == "fileinto:Junk"));
    }
}
