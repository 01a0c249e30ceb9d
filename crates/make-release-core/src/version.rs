//! Version string parsing and next-version computation.
//!
//! Versions are treated as loosely structured text rather than strict semver:
//! a leading `major.minor` pair followed by an optional tail. The tail is
//! classified as a numeric patch component, a prerelease marker (`a`, `b`,
//! `rc`) with a number, or anything else.
//!
//! | Current      | Next     |
//! |--------------|----------|
//! | `1.2`        | `1.3`    |
//! | `1.2.5`      | `1.3.0`  |
//! | `0.0.5`      | `0.0.6`  |
//! | `1.0a1`      | `1.0a2`  |
//! | `1.0.2.post1`| `1.1.0`  |
//! | `1.2.post1`  | `1.3`    |

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

/// Suffix appended to the next version while development resumes.
pub const DEV_MARKER: &str = ".dev0";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)\.([0-9]+)(.*)$").expect("valid version regex"));

static PATCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.([0-9]+)(.*)$").expect("valid patch regex"));

static PRERELEASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(a|b|rc)([0-9]+)(.*)$").expect("valid prerelease regex"));

/// Errors from version operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string does not start with `major.minor`.
    #[error("cannot automatically determine next version from {0:?}")]
    Unrecognized(String),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Prerelease marker preceding a prerelease number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrereleaseMarker {
    /// Alpha (`a`).
    Alpha,
    /// Beta (`b`).
    Beta,
    /// Release candidate (`rc`).
    ReleaseCandidate,
}

impl PrereleaseMarker {
    /// The marker as it appears in a version string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::ReleaseCandidate => "rc",
        }
    }

    fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "a" => Some(Self::Alpha),
            "b" => Some(Self::Beta),
            "rc" => Some(Self::ReleaseCandidate),
            _ => None,
        }
    }
}

/// Everything after `major.minor`.
///
/// Numeric components are kept as the decimal digits they were written with,
/// so a version of any length parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionTail {
    /// `.patch` optionally followed by a suffix such as `.post1`.
    Patch {
        /// Patch component digits.
        patch: String,
        /// Text following the patch component.
        suffix: String,
    },
    /// A prerelease marker and number, optionally followed by a suffix.
    Prerelease {
        /// The marker (`a`, `b`, `rc`).
        marker: PrereleaseMarker,
        /// Prerelease number digits.
        number: String,
        /// Text following the prerelease number.
        suffix: String,
    },
    /// Empty, or a suffix of no recognized shape.
    Other(String),
}

/// A version parsed into `major.minor` plus a classified tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionString {
    /// Major component digits.
    pub major: String,
    /// Minor component digits.
    pub minor: String,
    /// Remaining text, classified.
    pub tail: VersionTail,
}

impl VersionString {
    /// Parse a version string.
    ///
    /// Fails unless the text starts with `major.minor`.
    pub fn parse(text: &str) -> VersionResult<Self> {
        let unrecognized = || VersionError::Unrecognized(text.to_string());

        let caps = VERSION_RE.captures(text).ok_or_else(unrecognized)?;
        let major = caps[1].to_string();
        let minor = caps[2].to_string();
        let rest = &caps[3];

        // Order matters: patch shapes win over prerelease shapes, which win
        // over the catch-all.
        let tail = if let Some(patch) = PATCH_RE.captures(rest) {
            VersionTail::Patch {
                patch: patch[1].to_string(),
                suffix: patch[2].to_string(),
            }
        } else if let Some(pre) = PRERELEASE_RE.captures(rest) {
            VersionTail::Prerelease {
                marker: PrereleaseMarker::from_marker(&pre[1]).ok_or_else(unrecognized)?,
                number: pre[2].to_string(),
                suffix: pre[3].to_string(),
            }
        } else {
            VersionTail::Other(rest.to_string())
        };

        Ok(Self { major, minor, tail })
    }

    /// Compute the anticipated next version.
    ///
    /// Suffixes after a patch or prerelease component are dropped, as is any
    /// unrecognized tail. Never fails for a parsed version.
    pub fn next(&self) -> String {
        let major = canonical(&self.major);
        let minor = canonical(&self.minor);

        match &self.tail {
            VersionTail::Patch { patch, .. } if major == "0" && minor == "0" => {
                format!("0.0.{}", increment(patch))
            }
            VersionTail::Patch { .. } => format!("{major}.{}.0", increment(minor)),
            VersionTail::Prerelease { marker, number, .. } => {
                format!("{major}.{minor}{}{}", marker.as_str(), increment(number))
            }
            VersionTail::Other(_) => format!("{major}.{}", increment(minor)),
        }
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        match &self.tail {
            VersionTail::Patch { patch, suffix } => write!(f, ".{patch}{suffix}"),
            VersionTail::Prerelease {
                marker,
                number,
                suffix,
            } => write!(f, "{}{number}{suffix}", marker.as_str()),
            VersionTail::Other(rest) => f.write_str(rest),
        }
    }
}

/// Decimal digits without leading zeros (`"007"` → `"7"`, `"000"` → `"0"`).
fn canonical(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

/// Add one to a string of decimal digits, carrying as far as needed.
fn increment(digits: &str) -> String {
    let mut out: Vec<char> = canonical(digits).chars().collect();
    for digit in out.iter_mut().rev() {
        if *digit == '9' {
            *digit = '0';
        } else {
            *digit = char::from(*digit as u8 + 1);
            return out.into_iter().collect();
        }
    }
    out.insert(0, '1');
    out.into_iter().collect()
}

/// Guess the next version from the current one.
#[instrument]
pub fn next_version(current: &str) -> VersionResult<String> {
    let next = VersionString::parse(current)?.next();
    debug!(%current, %next, "computed next version");
    Ok(next)
}

/// The in-development version recorded after a release.
pub fn dev_version(next: &str) -> String {
    format!("{next}{DEV_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_major_minor_bumps_minor() {
        assert_eq!(next_version("1.2").unwrap(), "1.3");
        assert_eq!(next_version("0.9").unwrap(), "0.10");
        assert_eq!(next_version("10.0").unwrap(), "10.1");
    }

    #[test]
    fn patch_bumps_minor_and_resets_patch() {
        assert_eq!(next_version("1.2.5").unwrap(), "1.3.0");
        assert_eq!(next_version("0.1.0").unwrap(), "0.2.0");
        assert_eq!(next_version("2.0.17").unwrap(), "2.1.0");
    }

    #[test]
    fn zero_zero_patch_bumps_patch() {
        assert_eq!(next_version("0.0.0").unwrap(), "0.0.1");
        assert_eq!(next_version("0.0.9").unwrap(), "0.0.10");
    }

    #[test]
    fn prerelease_bumps_number() {
        assert_eq!(next_version("1.0a1").unwrap(), "1.0a2");
        assert_eq!(next_version("1.0b9").unwrap(), "1.0b10");
        assert_eq!(next_version("2.3rc1").unwrap(), "2.3rc2");
    }

    #[test]
    fn suffix_after_patch_is_dropped() {
        assert_eq!(next_version("1.0.2.post1").unwrap(), "1.1.0");
        assert_eq!(next_version("0.0.3.post2").unwrap(), "0.0.4");
    }

    #[test]
    fn suffix_after_prerelease_is_dropped() {
        assert_eq!(next_version("1.0rc1.post1").unwrap(), "1.0rc2");
    }

    #[test]
    fn unrecognized_suffix_is_dropped() {
        assert_eq!(next_version("1.2.post1").unwrap(), "1.3");
        assert_eq!(next_version("1.2.dev0").unwrap(), "1.3");
        assert_eq!(next_version("1.2-beta").unwrap(), "1.3");
    }

    #[test]
    fn malformed_versions_fail() {
        for bad in ["", "1", "v1.2", "one.two", ".1.2", "1..2"] {
            assert_eq!(
                next_version(bad),
                Err(VersionError::Unrecognized(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn components_beyond_machine_integers_still_bump() {
        assert_eq!(next_version("1.2.99999999999999999999").unwrap(), "1.3.0");
        assert_eq!(
            next_version("99999999999999999999.0").unwrap(),
            "99999999999999999999.1"
        );
        assert_eq!(
            next_version("1.18446744073709551615").unwrap(),
            "1.18446744073709551616"
        );
        assert_eq!(next_version("0.0.999").unwrap(), "0.0.1000");
        assert_eq!(next_version("2.0rc99").unwrap(), "2.0rc100");
    }

    #[test]
    fn leading_zeros_are_normalized() {
        assert_eq!(next_version("01.02.3").unwrap(), "1.3.0");
        assert_eq!(next_version("00.00.07").unwrap(), "0.0.8");
        assert_eq!(next_version("1.0a007").unwrap(), "1.0a8");
    }

    #[test]
    fn increment_carries() {
        assert_eq!(increment("0"), "1");
        assert_eq!(increment("19"), "20");
        assert_eq!(increment("999"), "1000");
        assert_eq!(increment("0099"), "100");
    }

    #[test]
    fn parse_classifies_tail() {
        let v = VersionString::parse("1.4.2.post3").unwrap();
        assert_eq!((v.major.as_str(), v.minor.as_str()), ("1", "4"));
        assert_eq!(
            v.tail,
            VersionTail::Patch {
                patch: "2".into(),
                suffix: ".post3".into()
            }
        );

        let v = VersionString::parse("3.1rc4").unwrap();
        assert_eq!(
            v.tail,
            VersionTail::Prerelease {
                marker: PrereleaseMarker::ReleaseCandidate,
                number: "4".into(),
                suffix: String::new()
            }
        );

        let v = VersionString::parse("3.1").unwrap();
        assert_eq!(v.tail, VersionTail::Other(String::new()));
    }

    #[test]
    fn display_round_trips_input() {
        for text in ["1.2", "1.2.3", "1.0a1", "1.0.2.post1", "4.5.dev7", "2.0rc3x"] {
            assert_eq!(VersionString::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn dev_version_appends_marker() {
        assert_eq!(dev_version("1.3"), "1.3.dev0");
        assert_eq!(dev_version("0.0.2"), "0.0.2.dev0");
    }
}
