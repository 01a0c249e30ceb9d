use std::io::ErrorKind as IoErrorKind;

use camino::Utf8PathBuf;
use serde::Serialize;
use thiserror::Error;

use super::ReleaseStep;
use crate::changelog::ChangelogError;
use crate::declaration::DeclarationError;
use crate::git::GitError;
use crate::lines::LineError;
use crate::test_command::TestCommandError;
use crate::version::VersionError;

/// Errors from the release workflow.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Merging a branch into itself.
    #[error("dev branch and target branch are the same: {branch}")]
    SameBranch {
        /// The branch named on both sides.
        branch: String,
    },

    /// No dev branch given and `HEAD` is detached.
    #[error("not on a branch; pass --dev-branch")]
    DetachedHead,

    /// Uncommitted changes to tracked files.
    #[error(
        "tracked files have uncommitted changes; commit or stash them, or pass --allow-dirty"
    )]
    DirtyWorkingTree,

    /// The manifest and version file declare different versions.
    #[error("version in pyproject.toml ({manifest}) and {path} ({declared}) don't match")]
    VersionMismatch {
        /// Version declared in the manifest.
        manifest: String,
        /// Version file path.
        path: Utf8PathBuf,
        /// Version declared in the version file.
        declared: String,
    },

    /// No version given and none declared.
    #[error(
        "current version not set in version file, so release version needs to be passed explicitly"
    )]
    VersionRequired,

    /// The test command exited unsuccessfully.
    #[error("tests failed: `{command}` exited with {}", describe_exit(.code))]
    TestsFailed {
        /// The command line.
        command: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },

    /// The operator declined a confirmation.
    #[error("release cancelled{}", describe_step(.step))]
    Declined {
        /// Step whose gate was declined; `None` for the initial gate.
        step: Option<ReleaseStep>,
    },

    /// A prompt could not be shown or answered.
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Version computation error.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Version declaration error.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// Changelog error.
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// File editing error.
    #[error(transparent)]
    Lines(#[from] LineError),

    /// Git error.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Test command error.
    #[error(transparent)]
    TestCommand(#[from] TestCommandError),
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

fn describe_step(step: &Option<ReleaseStep>) -> String {
    step.map(|s| format!(" at {s} step")).unwrap_or_default()
}

/// Result alias for release operations.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Broad classification of a [`ReleaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Inputs are missing, ambiguous, or contradictory.
    InputResolution,
    /// A file's contents couldn't be understood.
    FileFormat,
    /// A required file is absent.
    FileNotFound,
    /// Git or the test command failed.
    ExternalCommand,
    /// The operator stopped the release.
    UserAbort,
    /// Reading or writing failed.
    Io,
}

fn line_kind(err: &LineError) -> ErrorKind {
    match err {
        LineError::UnknownLineEnding { .. } | LineError::OutOfRange { .. } => ErrorKind::FileFormat,
        LineError::Io { source, .. } if source.kind() == IoErrorKind::NotFound => {
            ErrorKind::FileNotFound
        }
        LineError::Io { .. } => ErrorKind::Io,
    }
}

fn line_exit_code(err: &LineError) -> i32 {
    match err {
        LineError::UnknownLineEnding { .. } | LineError::OutOfRange { .. } => 12,
        LineError::Io { .. } => 13,
    }
}

impl ReleaseError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SameBranch { .. }
            | Self::DetachedHead
            | Self::DirtyWorkingTree
            | Self::VersionMismatch { .. }
            | Self::VersionRequired => ErrorKind::InputResolution,
            Self::Version(_) => ErrorKind::FileFormat,
            Self::Declaration(DeclarationError::NotFound { .. }) => ErrorKind::FileNotFound,
            Self::Declaration(DeclarationError::Read(e)) => line_kind(e),
            Self::Declaration(_) => ErrorKind::FileFormat,
            Self::Changelog(ChangelogError::NotFound) => ErrorKind::FileNotFound,
            Self::Changelog(ChangelogError::Edit(e)) | Self::Lines(e) => line_kind(e),
            Self::Changelog(_) => ErrorKind::FileFormat,
            Self::Git(_) | Self::TestCommand(_) | Self::TestsFailed { .. } => {
                ErrorKind::ExternalCommand
            }
            Self::Declined { .. } => ErrorKind::UserAbort,
            Self::Prompt(_) => ErrorKind::Io,
        }
    }

    /// Process exit code for this error.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 1    | branch collision / detached HEAD |
    /// | 2    | version mismatch                 |
    /// | 3    | version required                 |
    /// | 4    | declaration not found            |
    /// | 5    | next version unguessable         |
    /// | 6    | changelog missing                |
    /// | 7    | changelog section mismatch       |
    /// | 8    | changelog section missing        |
    /// | 9    | working tree dirty               |
    /// | 10   | git or test command failed       |
    /// | 11   | declined by the operator         |
    /// | 12   | file format error                |
    /// | 13   | I/O error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SameBranch { .. } | Self::DetachedHead => 1,
            Self::VersionMismatch { .. } => 2,
            Self::VersionRequired => 3,
            Self::Declaration(DeclarationError::NotFound { .. }) => 4,
            Self::Declaration(DeclarationError::Read(e)) => line_exit_code(e),
            Self::Declaration(_) => 12,
            Self::Version(_) => 5,
            Self::Changelog(ChangelogError::NotFound) => 6,
            Self::Changelog(ChangelogError::SectionMismatch { .. }) => 7,
            Self::Changelog(ChangelogError::SectionNotFound { .. }) => 8,
            Self::Changelog(ChangelogError::Edit(e)) | Self::Lines(e) => line_exit_code(e),
            Self::DirtyWorkingTree => 9,
            Self::Git(_) | Self::TestCommand(_) | Self::TestsFailed { .. } => 10,
            Self::Declined { .. } => 11,
            Self::Prompt(_) => 13,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(kind: IoErrorKind) -> LineError {
        LineError::Io {
            path: "CHANGELOG".into(),
            source: std::io::Error::from(kind),
        }
    }

    #[test]
    fn precondition_exit_codes_are_distinct() {
        let errors = [
            ReleaseError::SameBranch {
                branch: "prod".into(),
            },
            ReleaseError::VersionMismatch {
                manifest: "1.0".into(),
                path: "pkg/__init__.py".into(),
                declared: "1.1".into(),
            },
            ReleaseError::VersionRequired,
            ReleaseError::Declaration(DeclarationError::NotFound {
                name: "__version__".into(),
                path: "pkg/__init__.py".into(),
            }),
            ReleaseError::Version(VersionError::Unrecognized("x".into())),
            ReleaseError::Changelog(ChangelogError::NotFound),
            ReleaseError::Changelog(ChangelogError::SectionMismatch {
                expected: "1.0".into(),
                line: "## 0.9 - 2020-01-01".into(),
            }),
            ReleaseError::Changelog(ChangelogError::SectionNotFound {
                path: "CHANGELOG".into(),
            }),
            ReleaseError::DirtyWorkingTree,
        ];
        let codes: Vec<i32> = errors.iter().map(ReleaseError::exit_code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn external_failures_share_exit_code() {
        let git = ReleaseError::Git(GitError::Command {
            command: "merge".into(),
            stderr: "conflict".into(),
        });
        let tests = ReleaseError::TestsFailed {
            command: "pytest".into(),
            code: Some(1),
        };
        assert_eq!(git.exit_code(), 10);
        assert_eq!(tests.exit_code(), 10);
        assert_eq!(git.kind(), ErrorKind::ExternalCommand);
        assert_eq!(tests.kind(), ErrorKind::ExternalCommand);
    }

    #[test]
    fn declined_is_user_abort() {
        let err = ReleaseError::Declined {
            step: Some(ReleaseStep::Tag),
        };
        assert_eq!(err.kind(), ErrorKind::UserAbort);
        assert_eq!(err.exit_code(), 11);
        assert_eq!(err.to_string(), "release cancelled at tag step");
        assert_eq!(
            ReleaseError::Declined { step: None }.to_string(),
            "release cancelled"
        );
    }

    #[test]
    fn line_errors_classify_by_cause() {
        let format = ReleaseError::Lines(LineError::UnknownLineEnding {
            path: "x".into(),
            line: 0,
        });
        assert_eq!(format.kind(), ErrorKind::FileFormat);
        assert_eq!(format.exit_code(), 12);

        let missing = ReleaseError::Declaration(DeclarationError::Read(io_error(
            IoErrorKind::NotFound,
        )));
        assert_eq!(missing.kind(), ErrorKind::FileNotFound);
        assert_eq!(missing.exit_code(), 13);

        let denied = ReleaseError::Changelog(ChangelogError::Edit(io_error(
            IoErrorKind::PermissionDenied,
        )));
        assert_eq!(denied.kind(), ErrorKind::Io);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ReleaseError::VersionRequired.kind(), ErrorKind::InputResolution);
        assert_eq!(
            ReleaseError::Version(VersionError::Unrecognized("x".into())).kind(),
            ErrorKind::FileFormat
        );
        assert_eq!(
            ReleaseError::Changelog(ChangelogError::NotFound).kind(),
            ErrorKind::FileNotFound
        );
    }

    #[test]
    fn tests_failed_message_mentions_signal() {
        let err = ReleaseError::TestsFailed {
            command: "pytest".into(),
            code: None,
        };
        assert_eq!(err.to_string(), "tests failed: `pytest` exited with a signal");
    }
}
