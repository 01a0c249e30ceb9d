//! The release workflow.
//!
//! A release runs up to five steps, always in this order:
//!
//! 1. **test**: run the test command; nothing is touched if it fails.
//! 2. **prepare**: stamp the release version into the manifest and version
//!    file, date the changelog section, commit on the dev branch.
//! 3. **merge**: merge the dev branch into the target branch (`--no-ff`).
//! 4. **tag**: annotate the release commit with the tag name.
//! 5. **resume**: bump to `{next}.dev0`, open a new changelog section,
//!    commit on the dev branch.
//!
//! # Two-phase workflow
//!
//! 1. **Plan** ([`plan_release`]): resolve every input and validate the
//!    preconditions without touching the working tree.
//! 2. **Execute** ([`ReleaseInfo::execute`]): run the enabled steps,
//!    reporting progress through [`ReleaseEvent`] callbacks.
//!
//! Git, the test command, and the operator are reached through the
//! [`Vcs`](crate::git::Vcs), [`TestRunner`](crate::test_command::TestRunner)
//! and [`Prompter`] traits.

mod error;
mod execute;
#[cfg(test)]
mod fakes;
mod plan;
mod prompt;

pub use error::{ErrorKind, ReleaseError, ReleaseResult};
pub use plan::{DEFAULT_TARGET_BRANCH, ReleaseInfo, ReleaseOptions, plan_release};
pub use prompt::Prompter;

use serde::Serialize;

/// Steps of the release workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStep {
    /// Run the test suite.
    Test,
    /// Stamp the release version and commit.
    Prepare,
    /// Merge the dev branch into the target branch.
    Merge,
    /// Create the release tag.
    Tag,
    /// Bump to the next development version and commit.
    Resume,
}

impl ReleaseStep {
    /// Every step, in execution order.
    pub const ALL: [Self; 5] = [
        Self::Test,
        Self::Prepare,
        Self::Merge,
        Self::Tag,
        Self::Resume,
    ];
}

impl std::fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Prepare => write!(f, "prepare"),
            Self::Merge => write!(f, "merge"),
            Self::Tag => write!(f, "tag"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Which steps run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Steps {
    /// Run the test command.
    pub test: bool,
    /// Stamp the release version and commit.
    pub prepare: bool,
    /// Merge into the target branch.
    pub merge: bool,
    /// Create the release tag.
    pub tag: bool,
    /// Bump to the next development version and commit.
    pub resume: bool,
}

impl Default for Steps {
    fn default() -> Self {
        Self {
            test: true,
            prepare: true,
            merge: true,
            tag: true,
            resume: true,
        }
    }
}

impl Steps {
    /// Whether `step` is enabled.
    pub const fn enabled(&self, step: ReleaseStep) -> bool {
        match step {
            ReleaseStep::Test => self.test,
            ReleaseStep::Prepare => self.prepare,
            ReleaseStep::Merge => self.merge,
            ReleaseStep::Tag => self.tag,
            ReleaseStep::Resume => self.resume,
        }
    }

    /// Whether any enabled step edits files.
    pub const fn edits_files(&self) -> bool {
        self.prepare || self.resume
    }
}

/// How far a release got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseState {
    /// Nothing has happened yet.
    Idle,
    /// Inputs resolved; no step has completed.
    Resolving,
    /// The prepare commit exists.
    Prepared,
    /// The dev branch was merged into the target branch.
    Merged,
    /// The release tag exists.
    Tagged,
    /// The resume commit exists.
    ResumedDevelopment,
    /// Every enabled step completed.
    Done,
    /// A step failed or was declined.
    Aborted,
}

impl ReleaseState {
    /// State after `step` completes, starting from `self`.
    pub(crate) const fn after(self, step: ReleaseStep) -> Self {
        match step {
            ReleaseStep::Test => self,
            ReleaseStep::Prepare => Self::Prepared,
            ReleaseStep::Merge => Self::Merged,
            ReleaseStep::Tag => Self::Tagged,
            ReleaseStep::Resume => Self::ResumedDevelopment,
        }
    }
}

/// Events emitted while a release runs.
#[derive(Debug, Clone)]
pub enum ReleaseEvent {
    /// A step has started.
    StepStarted(ReleaseStep),
    /// A step has completed (or was skipped).
    StepCompleted(ReleaseStep, StepOutcome),
    /// Something the operator should look at before a gate, such as a diff
    /// or a commit log.
    Output {
        /// The step producing the output.
        step: ReleaseStep,
        /// What the text is (e.g., "diff").
        label: String,
        /// The text itself.
        text: String,
    },
    /// A gate was passed without asking.
    Notice(String),
    /// The release stopped early.
    Aborted {
        /// The step that failed, if the failure happened inside one.
        step: Option<ReleaseStep>,
        /// The last state reached before the failure.
        reached: ReleaseState,
    },
}

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    /// Step completed successfully.
    Completed {
        /// Description of what happened.
        message: String,
    },
    /// Step was skipped.
    Skipped {
        /// Why the step was skipped.
        reason: String,
    },
}

/// Outcome of a full release.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    /// Release name.
    pub name: String,
    /// The released version.
    pub version: String,
    /// The tag name.
    pub tag_name: String,
    /// The next development version.
    pub next_version: String,
    /// Results of each step.
    pub steps: Vec<(ReleaseStep, StepOutcome)>,
    /// Final state.
    pub state: ReleaseState,
}
