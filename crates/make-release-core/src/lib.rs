//! Core library for make-release.
//!
//! This crate provides the release workflow and the file edits behind it,
//! used by the `make-release` CLI and any downstream consumers.
//!
//! # Modules
//!
//! - [`changelog`] - Changelog lookup and section editing
//! - [`config`] - Configuration loading and management
//! - [`declaration`] - `version = "..."` declarations and version file search
//! - [`error`] - Error types and result aliases
//! - [`git`] - Git operations for release workflows
//! - [`lines`] - Line-level file edits that preserve line endings
//! - [`release`] - The test/prepare/merge/tag/resume workflow
//! - [`test_command`] - Running the project's test suite
//! - [`version`] - Version parsing and next-version computation
//!
//! # Quick Start
//!
//! ```no_run
//! use camino::Utf8Path;
//! use make_release_core::git::SystemGit;
//! use make_release_core::release::{ReleaseOptions, plan_release};
//!
//! let root = Utf8Path::new(".");
//! let git = SystemGit::new(root);
//! let info = plan_release(root, &git, ReleaseOptions::default())
//!     .expect("Failed to plan release");
//!
//! println!("Releasing {} {}", info.name, info.version);
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod config;

pub mod declaration;

pub mod error;

pub mod git;

pub mod lines;

pub mod release;

pub mod test_command;

pub mod version;

pub use config::{Config, ConfigLoader, LogLevel, ReleaseConfig, StepsConfig};

pub use error::{ConfigError, ConfigResult};

pub use version::{VersionString, next_version};
