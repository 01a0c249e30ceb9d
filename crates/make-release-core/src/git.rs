//! Git operations for release workflows.
//!
//! The release workflow talks to version control through the [`Vcs`] trait
//! so it can run against a fake in tests. [`SystemGit`] is the real
//! implementation: it shells out to `git` in the project root, which means
//! the user's SSH keys, GPG signing, hooks, and other configuration apply.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "merge").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Version-control operations needed by the release workflow.
///
/// Paths are passed as given; implementations resolve them relative to the
/// repository they operate on.
pub trait Vcs {
    /// Current branch name, or `None` on a detached HEAD.
    fn current_branch(&self) -> GitResult<Option<String>>;

    /// Check out an existing branch.
    fn checkout(&self, branch: &str) -> GitResult<()>;

    /// Merge `branch` into the current branch, always creating a merge commit.
    fn merge_no_ff(&self, branch: &str, message: &str) -> GitResult<()>;

    /// Create an annotated tag at `HEAD`.
    fn create_tag(&self, name: &str, message: &str) -> GitResult<()>;

    /// Commit the given paths (and only those) with `message`.
    fn commit(&self, paths: &[&Utf8Path], message: &str) -> GitResult<()>;

    /// Unstaged diff of the given paths.
    fn diff(&self, paths: &[&Utf8Path]) -> GitResult<String>;

    /// One-line log of commits reachable from `to` but not from `from`,
    /// oldest first.
    fn log_range(&self, from: &str, to: &str) -> GitResult<String>;

    /// One-line summary of the commit at `HEAD`.
    fn last_commit(&self) -> GitResult<String>;

    /// Most recently created tag, if any.
    fn latest_tag(&self) -> GitResult<Option<String>>;

    /// Whether tracked files have no uncommitted changes. Untracked files
    /// are ignored.
    fn is_clean(&self) -> GitResult<bool>;
}

/// [`Vcs`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    root: Utf8PathBuf,
}

impl SystemGit {
    /// Operate on the repository containing `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory `git` runs in.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Check if `root` is inside a git repository.
    #[instrument(skip(self), fields(root = %self.root))]
    pub fn is_inside_repo(&self) -> GitResult<bool> {
        match self.git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(output) => Ok(output.trim() == "true"),
            Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run a git command and return its stdout.
    fn git(&self, args: &[&str]) -> GitResult<String> {
        debug!(?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root.as_std_path())
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            // Detect "not a git repo" specifically
            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo);
            }

            // Name the subcommand, not a leading global flag like `--no-pager`.
            let command = args.iter().find(|arg| !arg.starts_with('-'));
            Err(GitError::Command {
                command: command.unwrap_or(&"").to_string(),
                stderr,
            })
        }
    }

    fn with_paths<'a>(head: &[&'a str], paths: &'a [&'a Utf8Path]) -> Vec<&'a str> {
        let mut args = head.to_vec();
        args.push("--");
        args.extend(paths.iter().map(|p| p.as_str()));
        args
    }
}

impl Vcs for SystemGit {
    #[instrument(skip(self))]
    fn current_branch(&self) -> GitResult<Option<String>> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        if branch == "HEAD" {
            debug!("detached HEAD");
            Ok(None)
        } else {
            debug!(%branch, "current branch");
            Ok(Some(branch))
        }
    }

    #[instrument(skip(self))]
    fn checkout(&self, branch: &str) -> GitResult<()> {
        self.git(&["checkout", branch]).map(drop)
    }

    #[instrument(skip(self, message))]
    fn merge_no_ff(&self, branch: &str, message: &str) -> GitResult<()> {
        self.git(&["merge", "--no-ff", branch, "-m", message])
            .map(drop)
    }

    #[instrument(skip(self, message))]
    fn create_tag(&self, name: &str, message: &str) -> GitResult<()> {
        self.git(&["tag", "-a", "-m", message, name]).map(drop)
    }

    #[instrument(skip(self, message), fields(count = paths.len()))]
    fn commit(&self, paths: &[&Utf8Path], message: &str) -> GitResult<()> {
        let args = Self::with_paths(&["commit", "-m", message], paths);
        self.git(&args).map(drop)
    }

    #[instrument(skip(self), fields(count = paths.len()))]
    fn diff(&self, paths: &[&Utf8Path]) -> GitResult<String> {
        let args = Self::with_paths(&["--no-pager", "diff"], paths);
        self.git(&args)
    }

    #[instrument(skip(self))]
    fn log_range(&self, from: &str, to: &str) -> GitResult<String> {
        let range = format!("{from}..{to}");
        self.git(&["log", "--oneline", "--reverse", &range])
    }

    #[instrument(skip(self))]
    fn last_commit(&self) -> GitResult<String> {
        self.git(&["log", "-1", "--oneline"])
            .map(|out| out.trim().to_string())
    }

    #[instrument(skip(self))]
    fn latest_tag(&self) -> GitResult<Option<String>> {
        let Ok(revision) = self.git(&["rev-list", "--tags", "--max-count=1"]) else {
            return Ok(None);
        };
        let revision = revision.trim();
        if revision.is_empty() {
            debug!("no tags");
            return Ok(None);
        }
        let tag = self.git(&["describe", "--tags", revision])?.trim().to_string();
        debug!(%tag, "latest tag");
        Ok(Some(tag))
    }

    #[instrument(skip(self))]
    fn is_clean(&self) -> GitResult<bool> {
        let output = self.git(&["status", "--porcelain", "--untracked-files=no"])?;
        let clean = output.trim().is_empty();
        debug!(clean, "working tree status");
        Ok(clean)
    }
}
