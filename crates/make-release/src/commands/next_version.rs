//! Next-version command: print the version that follows a release.

use clap::Args;
use serde::Serialize;
use tracing::{debug, instrument};

use make_release_core::release::ReleaseError;
use make_release_core::version::{dev_version, next_version};

/// Arguments for the `next-version` subcommand.
#[derive(Args, Debug)]
pub struct NextVersionArgs {
    /// Version being released (e.g., "1.2", "1.2.5", "1.0rc1")
    pub version: String,
}

#[derive(Serialize)]
struct NextVersion<'a> {
    version: &'a str,
    next_version: String,
    dev_version: String,
}

/// Print the computed next version.
///
/// Fails with exit code 5 when the version does not start with `major.minor`.
#[instrument(name = "cmd_next_version", skip_all, fields(version = %args.version))]
pub fn cmd_next_version(args: NextVersionArgs, global_json: bool) -> anyhow::Result<()> {
    let next = next_version(&args.version).map_err(ReleaseError::from)?;
    debug!(%next, "computed next version");

    if global_json {
        let report = NextVersion {
            version: &args.version,
            dev_version: dev_version(&next),
            next_version: next,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{next}");
    }
    Ok(())
}
