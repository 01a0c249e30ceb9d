//! Line-oriented file editing that preserves line endings.
//!
//! Files are split into lines with their endings still attached, so a file
//! can be reassembled byte-for-byte after a single line changes. `\r\n`,
//! `\n` and a lone `\r` are all recognized, per line, and never normalized.
//!
//! Writes go through [`write_atomic`]: the new contents land in a sibling
//! temporary file that is renamed over the original, so a failure part-way
//! through never leaves a truncated file behind.

use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors from line editing.
#[derive(Error, Debug)]
pub enum LineError {
    /// The target line has no `\r\n`, `\n`, or `\r` ending.
    #[error("line {line} of {path} doesn't end with a known line ending: \\r\\n, \\n, or \\r")]
    UnknownLineEnding {
        /// File being edited.
        path: Utf8PathBuf,
        /// Zero-based line index.
        line: usize,
    },

    /// The file has fewer lines than the requested index.
    #[error("{path} has {count} lines; cannot update line {line}")]
    OutOfRange {
        /// File being edited.
        path: Utf8PathBuf,
        /// Zero-based line index requested.
        line: usize,
        /// Number of lines in the file.
        count: usize,
    },

    /// Reading or writing a file failed.
    #[error("{path}: {source}")]
    Io {
        /// File being read or written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl LineError {
    pub(crate) fn io(path: &Utf8Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result alias for line editing.
pub type LineResult<T> = Result<T, LineError>;

/// A recognized line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    /// Windows-style `\r\n`.
    CrLf,
    /// Unix-style `\n`.
    Lf,
    /// Classic Mac `\r`.
    Cr,
}

impl LineEnding {
    /// Detect the ending of a line that still carries its terminator.
    ///
    /// `\r\n` is checked before `\n` and `\r`.
    pub fn detect(line: &str) -> Option<Self> {
        if line.ends_with("\r\n") {
            Some(Self::CrLf)
        } else if line.ends_with('\n') {
            Some(Self::Lf)
        } else if line.ends_with('\r') {
            Some(Self::Cr)
        } else {
            None
        }
    }

    /// The terminator bytes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CrLf => "\r\n",
            Self::Lf => "\n",
            Self::Cr => "\r",
        }
    }
}

/// Split text into lines, keeping each line's terminator attached.
///
/// A final line without a terminator is returned as-is; an empty input
/// yields no lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..=i]);
                start = i + 1;
            }
            b'\r' => {
                let end = if bytes.get(i + 1) == Some(&b'\n') {
                    i + 1
                } else {
                    i
                };
                lines.push(&text[start..=end]);
                start = end + 1;
                i = end;
            }
            _ => {}
        }
        i += 1;
    }

    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Strip a line's terminator, if any.
pub fn trim_line_ending(line: &str) -> &str {
    LineEnding::detect(line).map_or(line, |ending| &line[..line.len() - ending.as_str().len()])
}

/// Read a file as UTF-8 text.
pub fn read_text(path: &Utf8Path) -> LineResult<String> {
    fs::read_to_string(path).map_err(|e| LineError::io(path, e))
}

/// Replace line `index` (zero-based) of `path` with `content`.
///
/// `content` must not include a terminator: the original line's ending is
/// reused. Every other line is copied through unchanged.
#[instrument(skip(content), fields(%path))]
pub fn replace_line(path: &Utf8Path, index: usize, content: &str) -> LineResult<()> {
    let text = read_text(path)?;
    let lines = split_lines(&text);

    let Some(target) = lines.get(index) else {
        return Err(LineError::OutOfRange {
            path: path.to_path_buf(),
            line: index,
            count: lines.len(),
        });
    };
    let ending = LineEnding::detect(target).ok_or_else(|| LineError::UnknownLineEnding {
        path: path.to_path_buf(),
        line: index,
    })?;

    let mut updated = String::with_capacity(text.len() + content.len());
    for (i, line) in lines.iter().enumerate() {
        if i == index {
            updated.push_str(content);
            updated.push_str(ending.as_str());
        } else {
            updated.push_str(line);
        }
    }

    write_atomic(path, &updated)?;
    debug!(line = index, ?ending, "replaced line");
    Ok(())
}

/// Write `contents` to `path` via a temporary file in the same directory.
///
/// The temporary file is synced and then renamed over `path`. When `path`
/// already exists its permissions are carried over.
pub fn write_atomic(path: &Utf8Path, contents: &str) -> LineResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LineError::io(path, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| LineError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| LineError::io(path, e))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), metadata.permissions())
            .map_err(|e| LineError::io(path, e))?;
    }

    tmp.persist(path).map_err(|e| LineError::io(path, e.error))?;
    Ok(())
}

/// Original contents of a set of files, for undoing a step's edits.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    files: Vec<(Utf8PathBuf, String)>,
}

impl FileSnapshot {
    /// Record the current contents of each file.
    pub fn capture<'a>(paths: impl IntoIterator<Item = &'a Utf8Path>) -> LineResult<Self> {
        let files = paths
            .into_iter()
            .map(|path| Ok((path.to_path_buf(), read_text(path)?)))
            .collect::<LineResult<Vec<_>>>()?;
        Ok(Self { files })
    }

    /// Paths covered by this snapshot.
    pub fn paths(&self) -> impl Iterator<Item = &Utf8Path> {
        self.files.iter().map(|(path, _)| path.as_path())
    }

    /// Write every recorded file back.
    ///
    /// Keeps going after a failure so as many files as possible are
    /// restored; the first error is returned.
    pub fn restore(&self) -> LineResult<()> {
        let mut first_error = None;
        for (path, contents) in &self.files {
            if let Err(e) = write_atomic(path, contents) {
                warn!(%path, error = %e, "failed to restore file");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
