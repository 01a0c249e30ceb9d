//! Changelog discovery and section editing.
//!
//! The changelog is Markdown with one second-level header per release:
//!
//! ```text
//! ## 1.1.0 - unreleased
//!
//! In progress...
//!
//! ## 1.0.0 - 2024-03-01
//! ```
//!
//! The first such header is the "current" section. Before a release it must
//! either name the release version or carry the `unreleased` placeholder.

use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::lines::{self, LineEnding, LineError};

/// Changelog file names, in lookup order.
pub const CHANGELOG_CANDIDATES: &[&str] = &["CHANGELOG", "CHANGELOG.md"];

/// Date placeholder for a section that hasn't been released.
pub const UNRELEASED: &str = "unreleased";

/// Body text of a freshly opened section.
pub const IN_PROGRESS: &str = "In progress...";

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## (?P<version>.+) - (?P<date>.+)$").expect("valid changelog header regex")
});

/// Errors from changelog operations.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// Neither `CHANGELOG` nor `CHANGELOG.md` exists.
    #[error("could not find change log; tried {}", CHANGELOG_CANDIDATES.join(", "))]
    NotFound,

    /// The first section is neither the release version nor unreleased.
    #[error("expected version {expected} or release date \"unreleased\"; got:\n\n    {line}")]
    SectionMismatch {
        /// The release version.
        expected: String,
        /// The offending header line.
        line: String,
    },

    /// No `## <version> - <date>` header exists.
    #[error("could not find section in change log {path}")]
    SectionNotFound {
        /// The changelog searched.
        path: Utf8PathBuf,
    },

    /// Reading or writing the changelog failed.
    #[error(transparent)]
    Edit(#[from] LineError),
}

/// Result alias for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// How the current section relates to the release being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// `## <release> - unreleased`: the expected case.
    Unreleased,
    /// `## <release> - <date>`: the version was released before.
    ReRelease,
    /// `## <other> - unreleased`: the placeholder version will be replaced.
    ReplacePlaceholder,
}

/// The current (first) section header of a changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogSection {
    /// Zero-based line index of the header.
    pub line: usize,
    /// Version named in the header.
    pub version: String,
    /// Date named in the header (or `unreleased`).
    pub date: String,
    /// Relationship to the release version.
    pub status: SectionStatus,
}

/// Format a section header.
pub fn header_line(version: &str, date: &str) -> String {
    format!("## {version} - {date}")
}

/// Find the changelog in `root`.
#[instrument(fields(%root))]
pub fn locate_changelog(root: &Utf8Path) -> ChangelogResult<Utf8PathBuf> {
    CHANGELOG_CANDIDATES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
        .inspect(|path| debug!(%path, "found changelog"))
        .ok_or(ChangelogError::NotFound)
}

/// Locate and validate the current section for `release_version`.
///
/// Only the first header is considered. A re-release or a placeholder
/// replacement is allowed but logged as a warning.
#[instrument(fields(%path))]
pub fn locate_section(path: &Utf8Path, release_version: &str) -> ChangelogResult<ChangelogSection> {
    let text = lines::read_text(path)?;

    for (line, raw) in lines::split_lines(&text).into_iter().enumerate() {
        let header = lines::trim_line_ending(raw);
        let Some(caps) = HEADER_RE.captures(header) else {
            continue;
        };
        let version = caps["version"].to_string();
        let date = caps["date"].to_string();

        let status = if version == release_version {
            if date == UNRELEASED {
                SectionStatus::Unreleased
            } else {
                warn!(%version, %date, "re-releasing");
                SectionStatus::ReRelease
            }
        } else if date == UNRELEASED {
            warn!(from = %version, to = %release_version, "replacing version in header");
            SectionStatus::ReplacePlaceholder
        } else {
            return Err(ChangelogError::SectionMismatch {
                expected: release_version.to_string(),
                line: header.to_string(),
            });
        };

        debug!(line, ?status, "found changelog section");
        return Ok(ChangelogSection {
            line,
            version,
            date,
            status,
        });
    }

    Err(ChangelogError::SectionNotFound {
        path: path.to_path_buf(),
    })
}

/// Open a new unreleased section for `next_version` before line `at_line`.
///
/// The new lines use the ending of the line they are inserted before, or
/// `\n` when inserting at the end of the file.
#[instrument(fields(%path))]
pub fn insert_unreleased_section(
    path: &Utf8Path,
    at_line: usize,
    next_version: &str,
) -> ChangelogResult<()> {
    let text = lines::read_text(path)?;
    let existing = lines::split_lines(&text);

    if at_line > existing.len() {
        return Err(LineError::OutOfRange {
            path: path.to_path_buf(),
            line: at_line,
            count: existing.len(),
        }
        .into());
    }

    let nl = existing
        .get(at_line)
        .and_then(|line| LineEnding::detect(line))
        .unwrap_or(LineEnding::Lf)
        .as_str();
    let section = format!(
        "{header}{nl}{nl}{IN_PROGRESS}{nl}{nl}",
        header = header_line(next_version, UNRELEASED)
    );

    let mut updated = String::with_capacity(text.len() + section.len());
    for line in &existing[..at_line] {
        updated.push_str(line);
    }
    updated.push_str(&section);
    for line in &existing[at_line..] {
        updated.push_str(line);
    }

    lines::write_atomic(path, &updated)?;
    debug!(at_line, %next_version, "inserted unreleased section");
    Ok(())
}
