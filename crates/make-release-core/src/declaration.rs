//! Version declarations in source and manifest files.
//!
//! A declaration is a single line of the form `name = "value"` (either quote
//! style, optional spaces around `=`), for example `__version__ = '1.0.dev0'`
//! in a package's `__init__.py` or `version = "1.0"` in `pyproject.toml`.
//! A trailing `.devN` marker is stripped from the reported value.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::lines::{self, LineError};

/// Name of the version declaration in a version file.
pub const VERSION_DECLARATION: &str = "__version__";

/// Name of the version key in the project manifest.
pub const MANIFEST_DECLARATION: &str = "version";

/// Project manifest file name.
pub const MANIFEST_FILE: &str = "pyproject.toml";

/// Glob patterns searched for a version file, in order.
///
/// Covers `package/`, `namespace/package/`, and the same two shapes under
/// `src/`.
pub const VERSION_FILE_PATTERNS: &[&str] = &[
    "*/__init__.py",
    "*/*/__init__.py",
    "src/*/__init__.py",
    "src/*/*/__init__.py",
];

/// Errors from declaration lookups.
#[derive(Error, Debug)]
pub enum DeclarationError {
    /// No line declares `name` in `path`.
    #[error("could not find {name} in {path}")]
    NotFound {
        /// Declaration name searched for.
        name: String,
        /// File searched.
        path: Utf8PathBuf,
    },

    /// The declaration name produced an unusable pattern.
    #[error("invalid declaration pattern for {name}: {source}")]
    Pattern {
        /// Declaration name.
        name: String,
        /// Regex compilation error.
        source: regex::Error,
    },

    /// A version-file search pattern was rejected.
    #[error("invalid search pattern {pattern}: {source}")]
    Glob {
        /// The offending pattern.
        pattern: String,
        /// Glob error.
        source: glob::PatternError,
    },

    /// Reading the file failed.
    #[error(transparent)]
    Read(#[from] LineError),
}

/// Result alias for declaration lookups.
pub type DeclarationResult<T> = Result<T, DeclarationError>;

/// A located `name = "value"` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    /// Zero-based line index.
    pub line: usize,
    /// Quote character used around the value.
    pub quote: char,
    /// Declared value with any `.devN` marker removed. `None` for `""`.
    pub value: Option<String>,
}

impl Declaration {
    /// Render a replacement line in the same quote style.
    pub fn render(&self, name: &str, value: &str) -> String {
        let q = self.quote;
        format!("{name} = {q}{value}{q}")
    }
}

/// A declaration together with the file it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSource {
    /// File containing the declaration.
    pub path: Utf8PathBuf,
    /// Declaration name (`version`, `__version__`).
    pub name: String,
    /// The located declaration.
    pub declaration: Declaration,
}

impl VersionSource {
    /// Current value declared in the file, if any.
    pub fn value(&self) -> Option<&str> {
        self.declaration.value.as_deref()
    }

    /// Rewrite the declaration line to `value`.
    pub fn update(&self, value: &str) -> lines::LineResult<()> {
        let content = self.declaration.render(&self.name, value);
        lines::replace_line(&self.path, self.declaration.line, &content)
    }
}

/// Outcome of searching for a version file.
#[derive(Debug, Clone, Default)]
pub struct VersionFileSearch {
    /// The first file with a `__version__` declaration.
    pub found: Option<VersionSource>,
    /// Every candidate looked at, in search order.
    pub candidates: Vec<Utf8PathBuf>,
}

/// Build the declaration pattern for `name`.
///
/// The `regex` crate has no backreferences, so each quote style gets its own
/// alternative with its own groups.
fn declaration_regex(name: &str) -> DeclarationResult<Regex> {
    let name_re = regex::escape(name);
    let pattern = format!(
        r#"^{name_re} *= *(?:(?P<dquote>")(?:(?P<dq>.+?)(?:\.dev\d+)?)?"|'(?:(?P<sq>.+?)(?:\.dev\d+)?)?') *$"#
    );
    Regex::new(&pattern).map_err(|source| DeclarationError::Pattern {
        name: name.to_string(),
        source,
    })
}

/// Find the first line declaring `name` in `path`.
///
/// Returns `Ok(None)` when there is no such line.
#[instrument(fields(%path))]
pub fn find_declaration(path: &Utf8Path, name: &str) -> DeclarationResult<Option<Declaration>> {
    let re = declaration_regex(name)?;
    let text = lines::read_text(path)?;

    for (line, raw) in lines::split_lines(&text).into_iter().enumerate() {
        let Some(caps) = re.captures(lines::trim_line_ending(raw)) else {
            continue;
        };
        let (quote, value) = if caps.name("dquote").is_some() {
            ('"', caps.name("dq"))
        } else {
            ('\'', caps.name("sq"))
        };
        let declaration = Declaration {
            line,
            quote,
            value: value.map(|m| m.as_str().to_string()),
        };
        debug!(line, value = ?declaration.value, "found declaration");
        return Ok(Some(declaration));
    }

    debug!("no declaration found");
    Ok(None)
}

/// Find the first line declaring `name` in `path`, failing when absent.
pub fn require_declaration(path: &Utf8Path, name: &str) -> DeclarationResult<Declaration> {
    find_declaration(path, name)?.ok_or_else(|| DeclarationError::NotFound {
        name: name.to_string(),
        path: path.to_path_buf(),
    })
}

/// Load a required declaration as a [`VersionSource`].
pub fn version_source(path: &Utf8Path, name: &str) -> DeclarationResult<VersionSource> {
    Ok(VersionSource {
        path: path.to_path_buf(),
        name: name.to_string(),
        declaration: require_declaration(path, name)?,
    })
}

/// Search the conventional locations under `root` for a `__version__` file.
///
/// Not finding one is not an error; the caller decides whether to warn.
#[instrument(fields(%root))]
pub fn locate_version_file(root: &Utf8Path) -> DeclarationResult<VersionFileSearch> {
    let mut search = VersionFileSearch::default();

    for pattern in VERSION_FILE_PATTERNS {
        let full = format!("{}/{pattern}", glob::Pattern::escape(root.as_str()));
        let paths = glob::glob(&full).map_err(|source| DeclarationError::Glob {
            pattern: full.clone(),
            source,
        })?;

        // Unreadable directory entries are skipped rather than fatal.
        for path in paths.flatten() {
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                continue;
            };
            // `*/*/` and `src/*/` overlap
            if !search.candidates.contains(&path) {
                search.candidates.push(path);
            }
        }
    }

    for candidate in &search.candidates {
        if let Some(declaration) = find_declaration(candidate, VERSION_DECLARATION)? {
            debug!(path = %candidate, "found version file");
            search.found = Some(VersionSource {
                path: candidate.clone(),
                name: VERSION_DECLARATION.to_string(),
                declaration,
            });
            break;
        }
    }

    Ok(search)
}
