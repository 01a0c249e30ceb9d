//! Running the project's test suite before a release.
//!
//! The test command is an arbitrary shell string. When none is configured
//! it is inferred from the project layout: Python's `unittest` discovery,
//! pointed at `tests/` when that directory exists.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

/// Test command used when a `tests/` directory exists.
pub const DEFAULT_TESTS_DIR_COMMAND: &str = "python -m unittest discover tests";

/// Test command used otherwise.
pub const DEFAULT_COMMAND: &str = "python -m unittest discover .";

/// Errors from running the test command.
#[derive(Error, Debug)]
pub enum TestCommandError {
    /// The shell could not be started.
    #[error("failed to execute test command `{command}`: {source}")]
    Exec {
        /// The command line.
        command: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },
}

/// Result alias for test-command operations.
pub type TestCommandResult<T> = Result<T, TestCommandError>;

/// How a test run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestStatus {
    /// Exit code, or `None` when killed by a signal.
    pub code: Option<i32>,
}

impl TestStatus {
    /// Whether the tests passed.
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Runs a test command for the release workflow.
pub trait TestRunner {
    /// Run `command` and report how it exited.
    fn run(&self, command: &str) -> TestCommandResult<TestStatus>;
}

/// [`TestRunner`] that runs commands with `sh -c` in the project root.
///
/// Output goes straight to the terminal so the operator can follow along.
/// The command's stdout is redirected to stderr, keeping stdout free for the
/// caller's own output.
#[derive(Debug, Clone)]
pub struct ShellTestRunner {
    root: Utf8PathBuf,
}

impl ShellTestRunner {
    /// Run commands in `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TestRunner for ShellTestRunner {
    #[instrument(skip(self), fields(root = %self.root))]
    fn run(&self, command: &str) -> TestCommandResult<TestStatus> {
        debug!(%command, "running tests");
        let status = Command::new("sh")
            .args(["-c", command])
            .current_dir(self.root.as_std_path())
            .stdout(std::io::stderr())
            .status()
            .map_err(|source| TestCommandError::Exec {
                command: command.to_string(),
                source,
            })?;

        let status = TestStatus {
            code: status.code(),
        };
        debug!(code = ?status.code, "tests finished");
        Ok(status)
    }
}

/// Pick a test command for the project in `root`.
pub fn infer_test_command(root: &Utf8Path) -> &'static str {
    if root.join("tests").is_dir() {
        DEFAULT_TESTS_DIR_COMMAND
    } else {
        DEFAULT_COMMAND
    }
}
