//! In-memory collaborators for workflow tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use super::{Prompter, ReleaseError, ReleaseResult};
use crate::git::{GitError, GitResult, Vcs};
use crate::test_command::{TestCommandResult, TestRunner, TestStatus};

/// Records every call and tracks the checked-out branch.
pub struct FakeVcs {
    calls: RefCell<Vec<String>>,
    branch: RefCell<Option<String>>,
    clean: bool,
    fail_on: Option<&'static str>,
}

impl FakeVcs {
    pub fn on_branch(branch: &str) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            branch: RefCell::new(Some(branch.to_string())),
            clean: true,
            fail_on: None,
        }
    }

    pub fn detached() -> Self {
        let vcs = Self::on_branch("unused");
        *vcs.branch.borrow_mut() = None;
        vcs
    }

    pub fn dirty(mut self) -> Self {
        self.clean = false;
        self
    }

    /// Make the subcommand named `command` fail.
    pub fn failing(mut self, command: &'static str) -> Self {
        self.fail_on = Some(command);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn branch(&self) -> Option<String> {
        self.branch.borrow().clone()
    }

    fn record(&self, command: &'static str, call: String) -> GitResult<()> {
        self.calls.borrow_mut().push(call);
        if self.fail_on == Some(command) {
            return Err(GitError::Command {
                command: command.to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn names(paths: &[&Utf8Path]) -> String {
    paths
        .iter()
        .map(|p| p.file_name().unwrap_or(p.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

impl Vcs for FakeVcs {
    fn current_branch(&self) -> GitResult<Option<String>> {
        self.record("rev-parse", "current_branch".into())?;
        Ok(self.branch())
    }

    fn checkout(&self, branch: &str) -> GitResult<()> {
        self.record("checkout", format!("checkout {branch}"))?;
        *self.branch.borrow_mut() = Some(branch.to_string());
        Ok(())
    }

    fn merge_no_ff(&self, branch: &str, message: &str) -> GitResult<()> {
        self.record("merge", format!("merge {branch}: {message}"))
    }

    fn create_tag(&self, name: &str, message: &str) -> GitResult<()> {
        self.record("tag", format!("tag {name}: {message}"))
    }

    fn commit(&self, paths: &[&Utf8Path], message: &str) -> GitResult<()> {
        self.record("commit", format!("commit {}: {message}", names(paths)))
    }

    fn diff(&self, paths: &[&Utf8Path]) -> GitResult<String> {
        self.record("diff", format!("diff {}", names(paths)))?;
        Ok("+changed".to_string())
    }

    fn log_range(&self, from: &str, to: &str) -> GitResult<String> {
        self.record("log", format!("log {from}..{to}"))?;
        Ok("abc123 Add feature\n".to_string())
    }

    fn last_commit(&self) -> GitResult<String> {
        self.record("log", "last_commit".into())?;
        Ok("def456 Merge branch 'dev'".to_string())
    }

    fn latest_tag(&self) -> GitResult<Option<String>> {
        self.record("describe", "latest_tag".into())?;
        Ok(None)
    }

    fn is_clean(&self) -> GitResult<bool> {
        self.record("status", "is_clean".into())?;
        Ok(self.clean)
    }
}

/// Returns a fixed exit code and remembers what it ran.
pub struct FakeTests {
    code: Option<i32>,
    pub ran: RefCell<Vec<String>>,
}

impl FakeTests {
    pub fn passing() -> Self {
        Self::exiting(Some(0))
    }

    pub fn exiting(code: Option<i32>) -> Self {
        Self {
            code,
            ran: RefCell::new(Vec::new()),
        }
    }
}

impl TestRunner for FakeTests {
    fn run(&self, command: &str) -> TestCommandResult<TestStatus> {
        self.ran.borrow_mut().push(command.to_string());
        Ok(TestStatus { code: self.code })
    }
}

/// Answers confirmations from a script (yes once the script runs out).
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<bool>>,
    pub questions: RefCell<Vec<String>>,
    pub message_prompts: Cell<usize>,
    cancel_messages: bool,
}

impl ScriptedPrompter {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Cancel every commit-message prompt.
    pub fn cancelling_messages(mut self) -> Self {
        self.cancel_messages = true;
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str) -> ReleaseResult<bool> {
        self.questions.borrow_mut().push(message.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(true))
    }

    fn commit_message(&self, default: &str) -> ReleaseResult<String> {
        self.message_prompts.set(self.message_prompts.get() + 1);
        if self.cancel_messages {
            return Err(ReleaseError::Declined { step: None });
        }
        Ok(default.to_string())
    }
}

pub const PYPROJECT: &str = "[project]\nname = \"demo\"\nversion = \"1.0.dev0\"\n";
pub const INIT: &str = "__version__ = '1.0.dev0'\n";
pub const CHANGELOG: &str = "# Changes\n\n## 1.0 - unreleased\n\n- Add feature\n\n## 0.9 - 2024-01-01\n\n- First\n";

/// A project named `demo` with a manifest, a version file, and a changelog.
pub fn project() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(tmp.path().join("demo")).unwrap();
    fs::create_dir_all(root.join("demo")).unwrap();
    fs::write(root.join("pyproject.toml"), PYPROJECT).unwrap();
    fs::write(root.join("demo/__init__.py"), INIT).unwrap();
    fs::write(root.join("CHANGELOG.md"), CHANGELOG).unwrap();
    (tmp, root)
}

pub fn read(root: &Utf8Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}
