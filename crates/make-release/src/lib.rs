//! Library interface for the `make-release` CLI.
//!
//! This crate exposes the CLI's argument parser and command structure as a library,
//! primarily for documentation generation and testing. The actual entry point is
//! in `main.rs`.
//!
//! # Structure
//!
//! - [`Cli`] - The root argument parser (clap derive)
//! - [`Commands`] - Available subcommands
//! - [`commands`] - Command implementations
//! - [`exit_code`] - Process exit code for a failed command

pub mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use make_release_core::release::ReleaseError;
use std::path::PathBuf;

/// Exit code for failures that are not release errors.
pub const EXIT_OTHER: i32 = 70;

/// Color output preference.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect terminal capabilities automatically.
    #[default]
    Auto,
    /// Always emit colors.
    Always,
    /// Never emit colors.
    Never,
}

impl ColorChoice {
    /// Configure global color output based on this choice.
    ///
    /// Call this once at startup to set the color mode.
    pub fn apply(self) {
        match self {
            Self::Auto => {} // owo-colors auto-detects by default
            Self::Always => owo_colors::set_override(true),
            Self::Never => owo_colors::set_override(false),
        }
    }
}

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    RUST_LOG                 Log filter (e.g., debug, make_release_core=trace)
    MAKE_RELEASE_LOG_PATH    Explicit log file path
    MAKE_RELEASE_LOG_DIR     Log directory

EXIT CODES:
    1   dev and target branch are the same, or HEAD is detached
    2   manifest and version file disagree
    3   no version declared or given
    4   version declaration missing
    5   next version cannot be guessed
    6   changelog missing
    7   changelog section is for another release
    8   changelog has no section header
    9   tracked files have uncommitted changes
    10  git or the test command failed
    11  cancelled at a prompt
    12  file format error
    13  I/O error
    70  any other failure
";

/// Command-line interface definition for make-release.
#[derive(Parser)]
#[command(name = "make-release")]
#[command(about = "Test, stamp, merge, tag, and resume a project release", long_about = None)]
#[command(version)]
#[command(after_long_help = ENV_HELP)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Only print errors (suppresses warnings/info)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More detail (repeatable; e.g. -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Colorize output
    #[arg(long, global = true, value_enum, default_value_t)]
    pub color: ColorChoice,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands for the CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the release workflow in the current project
    Release(commands::release::ReleaseArgs),

    /// Print the version that follows VERSION
    NextVersion(commands::next_version::NextVersionArgs),

    /// Show configuration and the release inputs this project resolves to
    Info(commands::info::InfoArgs),
}

/// Returns the clap command for documentation generation
pub fn command() -> clap::Command {
    Cli::command()
}

/// Map a command failure to a process exit code.
///
/// Uses the first [`ReleaseError`] in the error chain, else [`EXIT_OTHER`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ReleaseError>())
        .map_or(EXIT_OTHER, ReleaseError::exit_code)
}
