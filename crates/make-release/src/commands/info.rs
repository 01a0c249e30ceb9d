//! Info command: show package, config, and resolved release information.

use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use make_release_core::config::{self, Config};
use make_release_core::git::{SystemGit, Vcs};
use make_release_core::release::{self, ReleaseInfo};

use super::release::{ReleaseArgs, release_options};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_config_dir: Option<String>,
    log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_dir: Option<String>,
}

impl ConfigInfo {
    fn from_config(config: &Config, cwd: &camino::Utf8Path) -> Self {
        Self {
            config_file: config::find_project_config(cwd).map(|p| p.to_string()),
            user_config_dir: config::user_config_dir().map(|p| p.to_string()),
            log_level: config.log_level.as_str().to_string(),
            log_dir: config.log_dir.as_ref().map(|p| p.to_string()),
        }
    }
}

/// Resolved release inputs, or why they could not be resolved.
#[derive(Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
enum ReleaseSummary {
    Resolved(Box<ReleaseInfo>),
    Unresolved { error: String, exit_code: i32 },
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest_tag: Option<String>,
    release: ReleaseSummary,
}

/// Print package, configuration, and release information.
///
/// Release inputs are resolved exactly as `release --dry-run` would; a
/// failure is reported, not returned.
#[instrument(name = "cmd_info", skip_all, fields(json_output))]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing info command");

    let git = SystemGit::new(cwd);
    let latest_tag = if git.is_inside_repo().unwrap_or(false) {
        git.latest_tag().ok().flatten()
    } else {
        None
    };

    let options = release_options(ReleaseArgs::default(), config);
    let release = match release::plan_release(cwd, &git, options) {
        Ok(info) => ReleaseSummary::Resolved(Box::new(info)),
        Err(e) => {
            debug!(error = %e, "release inputs unresolved");
            ReleaseSummary::Unresolved {
                exit_code: e.exit_code(),
                error: e.to_string(),
            }
        }
    };

    let full_info = FullInfo {
        package: PackageInfo::new(),
        config: ConfigInfo::from_config(config, cwd),
        latest_tag,
        release,
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&full_info)?);
    } else {
        print_info(&full_info);
    }

    Ok(())
}

fn print_info(full_info: &FullInfo) {
    let package = &full_info.package;
    println!("{} {}", package.name.bold(), package.version.green());
    if !package.description.is_empty() {
        println!("{}", package.description);
    }
    if !package.license.is_empty() {
        println!("{}: {}", "License".dimmed(), package.license);
    }

    println!();
    println!("{}", "Configuration".bold().underline());
    let config = &full_info.config;
    if let Some(ref path) = config.config_file {
        println!("{}: {}", "Config file".dimmed(), path.cyan());
    } else {
        println!("{}: {}", "Config file".dimmed(), "none loaded".yellow());
    }
    if let Some(ref dir) = config.user_config_dir {
        println!("{}: {}", "User config dir".dimmed(), dir);
    }
    println!("{}: {}", "Log level".dimmed(), config.log_level);
    if let Some(ref dir) = config.log_dir {
        println!("{}: {}", "Log directory".dimmed(), dir);
    }

    println!();
    println!("{}", "Release".bold().underline());
    if let Some(ref tag) = full_info.latest_tag {
        println!("{}: {}", "Latest tag".dimmed(), tag);
    }
    match &full_info.release {
        ReleaseSummary::Resolved(info) => {
            println!("{}: {}", "Name".dimmed(), info.name);
            println!("{}: {}", "Version".dimmed(), info.version.green());
            println!("{}: {}", "Next version".dimmed(), info.next_version);
            println!("{}: {}", "Tag".dimmed(), info.tag_name.cyan());
            println!(
                "{}: {} → {}",
                "Branches".dimmed(),
                info.dev_branch,
                info.target_branch
            );
            for source in info.manifest.iter().chain(&info.version_file) {
                println!(
                    "{}: {} ({} = {})",
                    "Version source".dimmed(),
                    source.path,
                    source.name,
                    source.value().unwrap_or("\"\""),
                );
            }
            println!(
                "{}: {} line {}",
                "Changelog".dimmed(),
                info.changelog,
                info.changelog_section.line + 1
            );
            println!("{}: {}", "Test command".dimmed(), info.test_command.cyan());
        }
        ReleaseSummary::Unresolved { error, exit_code } => {
            println!(
                "  {} {} {}",
                "○".yellow(),
                error.yellow(),
                format!("(exit code {exit_code})").dimmed()
            );
        }
    }
}
