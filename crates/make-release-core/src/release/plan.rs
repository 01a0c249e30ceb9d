use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{ReleaseError, ReleaseResult, Steps};
use crate::changelog::{self, ChangelogSection};
use crate::declaration::{
    self, MANIFEST_DECLARATION, MANIFEST_FILE, VERSION_DECLARATION, VersionSource,
};
use crate::git::Vcs;
use crate::test_command::infer_test_command;
use crate::version::{dev_version, next_version as guess_next_version};

/// Branch releases are merged into unless told otherwise.
pub const DEFAULT_TARGET_BRANCH: &str = "prod";

/// Inputs to [`plan_release`]. Every `None` is resolved from the project.
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Which steps run.
    pub steps: Steps,
    /// Release name (default: the project directory name).
    pub name: Option<String>,
    /// Version to release (default: the declared version).
    pub version: Option<String>,
    /// File holding `__version__` (default: searched for).
    pub version_file: Option<Utf8PathBuf>,
    /// Release date (default: today).
    pub date: Option<String>,
    /// Branch to release from (default: the current branch).
    pub dev_branch: Option<String>,
    /// Branch to merge into.
    pub target_branch: String,
    /// Tag name template; `{name}` and `{version}` are substituted.
    pub tag_name: Option<String>,
    /// Anticipated next version (default: computed).
    pub next_version: Option<String>,
    /// Test command (default: inferred).
    pub test_command: Option<String>,
    /// Ask before each step.
    pub confirm: bool,
    /// Allow uncommitted changes in the working tree.
    pub allow_dirty: bool,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            steps: Steps::default(),
            name: None,
            version: None,
            version_file: None,
            date: None,
            dev_branch: None,
            target_branch: DEFAULT_TARGET_BRANCH.to_string(),
            tag_name: None,
            next_version: None,
            test_command: None,
            confirm: true,
            allow_dirty: false,
        }
    }
}

/// Everything a release needs, resolved once up front.
///
/// Steps only read it.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseInfo {
    /// Project root.
    pub root: Utf8PathBuf,
    /// Which steps run.
    pub steps: Steps,
    /// Release name.
    pub name: String,
    /// Branch the release is made from.
    pub dev_branch: String,
    /// Branch the release is merged into.
    pub target_branch: String,
    /// `version` in `pyproject.toml`, when the manifest exists.
    pub manifest: Option<VersionSource>,
    /// `__version__` in the version file, when one was found.
    pub version_file: Option<VersionSource>,
    /// Version being released.
    pub version: String,
    /// Tag name.
    pub tag_name: String,
    /// Release date.
    pub date: String,
    /// Anticipated next version.
    pub next_version: String,
    /// Changelog path.
    pub changelog: Utf8PathBuf,
    /// The changelog section being released.
    pub changelog_section: ChangelogSection,
    /// Test command.
    pub test_command: String,
    /// Ask before each step.
    pub confirmation_required: bool,
}

impl ReleaseInfo {
    /// The version recorded once development resumes.
    pub fn dev_version(&self) -> String {
        dev_version(&self.next_version)
    }

    /// Files touched by the prepare and resume steps.
    pub fn release_files(&self) -> Vec<&Utf8Path> {
        self.manifest
            .iter()
            .chain(&self.version_file)
            .map(|source| source.path.as_path())
            .chain(std::iter::once(self.changelog.as_path()))
            .collect()
    }
}

/// Resolve release inputs and check preconditions.
///
/// Nothing in the working tree is modified. Resolution stops at the first
/// failed precondition; when the merge step would merge a branch into
/// itself that is detected before any file is read.
#[instrument(skip(vcs, options), fields(%root))]
pub fn plan_release(
    root: &Utf8Path,
    vcs: &dyn Vcs,
    options: ReleaseOptions,
) -> ReleaseResult<ReleaseInfo> {
    let ReleaseOptions {
        steps,
        name,
        version,
        version_file,
        date,
        dev_branch,
        target_branch,
        tag_name,
        next_version,
        test_command,
        confirm,
        allow_dirty,
    } = options;

    let name = name.unwrap_or_else(|| root.file_name().unwrap_or(root.as_str()).to_string());

    let dev_branch = match dev_branch {
        Some(branch) => branch,
        None => vcs.current_branch()?.ok_or(ReleaseError::DetachedHead)?,
    };
    if steps.merge && dev_branch == target_branch {
        return Err(ReleaseError::SameBranch { branch: dev_branch });
    }

    if !allow_dirty && steps.edits_files() && !vcs.is_clean()? {
        return Err(ReleaseError::DirtyWorkingTree);
    }

    let manifest_path = root.join(MANIFEST_FILE);
    let manifest = if manifest_path.is_file() {
        Some(declaration::version_source(
            &manifest_path,
            MANIFEST_DECLARATION,
        )?)
    } else {
        None
    };

    let version_file = match version_file {
        Some(path) => Some(declaration::version_source(
            &root.join(path),
            VERSION_DECLARATION,
        )?),
        None => {
            let search = declaration::locate_version_file(root)?;
            if search.found.is_none() {
                let tried: Vec<&str> = search.candidates.iter().map(|p| p.as_str()).collect();
                warn!(?tried, "no version file found");
            }
            search.found
        }
    };

    let manifest_version = manifest.as_ref().and_then(VersionSource::value);
    let declared_version = version_file.as_ref().and_then(VersionSource::value);
    if let (Some(manifest_version), Some(declared), Some(source)) =
        (manifest_version, declared_version, version_file.as_ref())
        && manifest_version != declared
    {
        return Err(ReleaseError::VersionMismatch {
            manifest: manifest_version.to_string(),
            path: source
                .path
                .strip_prefix(root)
                .unwrap_or(&source.path)
                .to_path_buf(),
            declared: declared.to_string(),
        });
    }

    let version = version
        .or_else(|| declared_version.or(manifest_version).map(str::to_string))
        .ok_or(ReleaseError::VersionRequired)?;

    let tag_name = tag_name.map_or_else(
        || version.clone(),
        |template| {
            template
                .replace("{name}", &name)
                .replace("{version}", &version)
        },
    );

    let date = date.unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());

    let next_version = match next_version {
        Some(next) => next,
        None => guess_next_version(&version)?,
    };

    let changelog_path = changelog::locate_changelog(root)?;
    let changelog_section = changelog::locate_section(&changelog_path, &version)?;

    let test_command = test_command.unwrap_or_else(|| infer_test_command(root).to_string());

    let info = ReleaseInfo {
        root: root.to_path_buf(),
        steps,
        name,
        dev_branch,
        target_branch,
        manifest,
        version_file,
        version,
        tag_name,
        date,
        next_version,
        changelog: changelog_path,
        changelog_section,
        test_command,
        confirmation_required: confirm,
    };

    debug!(steps = ?info.steps, "release steps");
    info!(
        name = %info.name,
        version = %info.version,
        next = %info.next_version,
        tag = %info.tag_name,
        "release planned"
    );
    Ok(info)
}
