//! Release command: a thin CLI layer over `make_release_core::release`.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use inquire::{Confirm, InquireError, Text};
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use make_release_core::changelog::SectionStatus;
use make_release_core::config::Config;
use make_release_core::git::SystemGit;
use make_release_core::release::{
    self, DEFAULT_TARGET_BRANCH, Prompter, ReleaseError, ReleaseEvent, ReleaseInfo,
    ReleaseOptions, ReleaseResult, ReleaseState, StepOutcome, Steps,
};
use make_release_core::test_command::ShellTestRunner;

/// Arguments for the `release` subcommand.
#[derive(Args, Debug, Default)]
pub struct ReleaseArgs {
    /// Skip running the test command
    #[arg(long)]
    pub no_test: bool,

    /// Skip stamping the release version and changelog date
    #[arg(long)]
    pub no_prepare: bool,

    /// Skip merging the dev branch into the target branch
    #[arg(long)]
    pub no_merge: bool,

    /// Skip creating the release tag
    #[arg(long)]
    pub no_tag: bool,

    /// Skip bumping to the next development version
    #[arg(long)]
    pub no_resume: bool,

    /// Command that runs the test suite (default: inferred)
    #[arg(long, value_name = "COMMAND")]
    pub test_command: Option<String>,

    /// Release name (default: project directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Version to release (default: the declared version)
    #[arg(long, value_name = "VERSION")]
    pub release_version: Option<String>,

    /// File declaring `__version__`, relative to the project (default: searched for)
    #[arg(long, value_name = "FILE")]
    pub version_file: Option<Utf8PathBuf>,

    /// Release date (default: today, YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Branch to release from (default: current branch)
    #[arg(long, value_name = "BRANCH")]
    pub dev_branch: Option<String>,

    /// Branch to merge into (default: prod)
    #[arg(long, value_name = "BRANCH")]
    pub target_branch: Option<String>,

    /// Tag name; `{name}` and `{version}` are substituted (default: the version)
    #[arg(long, value_name = "TEMPLATE")]
    pub tag_name: Option<String>,

    /// Version development resumes at (default: computed)
    #[arg(long, value_name = "VERSION")]
    pub next_version: Option<String>,

    /// Don't ask before each step
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Release even with uncommitted changes in the working tree
    #[arg(long)]
    pub allow_dirty: bool,

    /// Show the resolved release without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the release command.
#[instrument(name = "cmd_release", skip_all)]
pub fn cmd_release(
    args: ReleaseArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    debug!(
        json_output = global_json,
        dry_run = args.dry_run,
        "executing release command"
    );

    let dry_run = args.dry_run;
    let options = release_options(args, config);

    let git = SystemGit::new(cwd);
    let info = release::plan_release(cwd, &git, options).context("release planning failed")?;

    if dry_run {
        if global_json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            println!("\n{}", "DRY RUN: no changes will be made".yellow().bold());
            print_plan(&info, cwd);
        }
        return Ok(());
    }

    if !global_json {
        print_plan(&info, cwd);
    }

    let tests = ShellTestRunner::new(cwd);
    let outcome = info
        .execute(&git, &tests, &InquirePrompter, |event| {
            if !global_json {
                handle_event(event);
            }
        })
        .context("release failed")?;

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!();
        println!(
            "{} Released {} {} (tag {}); development continues at {}",
            "✓".green().bold(),
            outcome.name.bold(),
            outcome.version.green().bold(),
            outcome.tag_name.cyan(),
            info.dev_version().cyan(),
        );
    }

    Ok(())
}

/// Merge flags over configuration; flags win.
pub(crate) fn release_options(args: ReleaseArgs, config: &Config) -> ReleaseOptions {
    let defaults = config.release.clone().unwrap_or_default();
    let configured = config.steps.clone().unwrap_or_default();

    let steps = Steps {
        test: !args.no_test && configured.test.unwrap_or(true),
        prepare: !args.no_prepare && configured.prepare.unwrap_or(true),
        merge: !args.no_merge && configured.merge.unwrap_or(true),
        tag: !args.no_tag && configured.tag.unwrap_or(true),
        resume: !args.no_resume && configured.resume.unwrap_or(true),
    };

    ReleaseOptions {
        steps,
        name: args.name.or(defaults.name),
        version: args.release_version,
        version_file: args.version_file.or(defaults.version_file),
        date: args.date,
        dev_branch: args.dev_branch.or(defaults.dev_branch),
        target_branch: args
            .target_branch
            .or(defaults.target_branch)
            .unwrap_or_else(|| DEFAULT_TARGET_BRANCH.to_string()),
        tag_name: args.tag_name.or(defaults.tag_name),
        next_version: args.next_version,
        test_command: args.test_command.or(defaults.test_command),
        confirm: !args.yes && config.confirm.unwrap_or(true),
        allow_dirty: args.allow_dirty || defaults.allow_dirty.unwrap_or(false),
    }
}

/// Asks on the terminal.
struct InquirePrompter;

fn is_cancel(err: &InquireError) -> bool {
    matches!(
        err,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

impl Prompter for InquirePrompter {
    fn confirm(&self, message: &str) -> ReleaseResult<bool> {
        match Confirm::new(message).with_default(true).prompt() {
            Ok(answer) => Ok(answer),
            Err(e) if is_cancel(&e) => Ok(false),
            Err(e) => Err(ReleaseError::Prompt(e.to_string())),
        }
    }

    fn commit_message(&self, default: &str) -> ReleaseResult<String> {
        match Text::new("Commit message:")
            .with_initial_value(default)
            .prompt()
        {
            Ok(message) if message.trim().is_empty() => Ok(default.to_string()),
            Ok(message) => Ok(message),
            Err(e) if is_cancel(&e) => Err(ReleaseError::Declined { step: None }),
            Err(e) => Err(ReleaseError::Prompt(e.to_string())),
        }
    }
}

fn print_plan(info: &ReleaseInfo, cwd: &Utf8Path) {
    let relative = |path: &Utf8Path| path.strip_prefix(cwd).unwrap_or(path).to_string();

    println!(
        "\n{}: {} {} {}",
        "Release".bold(),
        info.name.bold(),
        info.version.green().bold(),
        format!("({})", info.date).dimmed(),
    );
    println!(
        "{}: {} → {} | {}: {} | {}: {}",
        "Branches".dimmed(),
        info.dev_branch,
        info.target_branch,
        "Tag".dimmed(),
        info.tag_name.cyan(),
        "Next".dimmed(),
        info.dev_version().cyan(),
    );

    for source in info.manifest.iter().chain(&info.version_file) {
        println!(
            "{}: {} {}",
            "Version file".dimmed(),
            relative(&source.path),
            format!("(line {})", source.declaration.line + 1).dimmed(),
        );
    }

    let section = &info.changelog_section;
    let note = match section.status {
        SectionStatus::Unreleased => String::new(),
        SectionStatus::ReRelease => format!(" re-releasing, dated {}", section.date),
        SectionStatus::ReplacePlaceholder => format!(" replacing {}", section.version),
    };
    println!(
        "{}: {} {}{}",
        "Changelog".dimmed(),
        relative(&info.changelog),
        format!("(line {})", section.line + 1).dimmed(),
        note.yellow(),
    );
    println!("{}: {}", "Test command".dimmed(), info.test_command.cyan());

    let (active, skipped): (Vec<_>, Vec<_>) = release::ReleaseStep::ALL
        .iter()
        .partition(|step| info.steps.enabled(**step));
    let names = |steps: Vec<&release::ReleaseStep>| {
        steps
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    print!("{}: {}", "Steps".dimmed(), names(active).bold());
    if !skipped.is_empty() {
        print!(" {}", format!("(skip: {})", names(skipped)).dimmed());
    }
    println!();
    println!();
}

/// Render a release event for the terminal.
fn handle_event(event: ReleaseEvent) {
    match event {
        ReleaseEvent::StepStarted(step) => {
            debug!(%step, "step started");
        }
        ReleaseEvent::StepCompleted(step, outcome) => match outcome {
            StepOutcome::Completed { message } => {
                println!(
                    "  {} {} {}",
                    "✓".green(),
                    step.to_string().bold(),
                    message.dimmed(),
                );
            }
            StepOutcome::Skipped { reason } => {
                println!(
                    "  {} {} {}",
                    "–".yellow(),
                    step.to_string().bold(),
                    format!("skipped: {reason}").dimmed(),
                );
            }
        },
        ReleaseEvent::Output { step, label, text } => {
            println!("\n{} {}:", step.to_string().bold(), label.underline());
            if text.trim().is_empty() {
                println!("  {}", "(nothing)".dimmed());
            }
            for line in text.lines() {
                println!("  {line}");
            }
            println!();
        }
        ReleaseEvent::Notice(text) => {
            println!("  {} {}", "→".cyan(), text);
        }
        ReleaseEvent::Aborted { step, reached } => {
            let at = step.map(|s| format!(" during {s}")).unwrap_or_default();
            println!(
                "\n{} {}",
                format!("Release stopped{at}.").red().bold(),
                describe_progress(reached),
            );
        }
    }
}

/// What is already committed when a release stops in `state`.
const fn describe_progress(state: ReleaseState) -> &'static str {
    match state {
        ReleaseState::Idle | ReleaseState::Resolving | ReleaseState::Aborted => {
            "Nothing was committed."
        }
        ReleaseState::Prepared => "The prepare commit is on the dev branch.",
        ReleaseState::Merged => "The release is merged into the target branch but not tagged.",
        ReleaseState::Tagged => "The release is tagged; development has not resumed.",
        ReleaseState::ResumedDevelopment | ReleaseState::Done => "Every step completed.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use make_release_core::config::{ReleaseConfig, StepsConfig};

    #[test]
    fn defaults_without_flags_or_config() {
        let options = release_options(ReleaseArgs::default(), &Config::default());

        assert_eq!(options.steps, Steps::default());
        assert_eq!(options.target_branch, "prod");
        assert!(options.confirm);
        assert!(!options.allow_dirty);
        assert!(options.version.is_none());
    }

    #[test]
    fn config_supplies_defaults() {
        let config = Config {
            release: Some(ReleaseConfig {
                target_branch: Some("main".into()),
                tag_name: Some("v{version}".into()),
                allow_dirty: Some(true),
                ..ReleaseConfig::default()
            }),
            steps: Some(StepsConfig {
                merge: Some(false),
                ..StepsConfig::default()
            }),
            confirm: Some(false),
            ..Config::default()
        };

        let options = release_options(ReleaseArgs::default(), &config);

        assert_eq!(options.target_branch, "main");
        assert_eq!(options.tag_name.as_deref(), Some("v{version}"));
        assert!(options.allow_dirty);
        assert!(!options.steps.merge);
        assert!(options.steps.tag);
        assert!(!options.confirm);
    }

    #[test]
    fn flags_override_config() {
        let config = Config {
            release: Some(ReleaseConfig {
                target_branch: Some("main".into()),
                test_command: Some("make test".into()),
                ..ReleaseConfig::default()
            }),
            steps: Some(StepsConfig {
                test: Some(true),
                ..StepsConfig::default()
            }),
            ..Config::default()
        };
        let args = ReleaseArgs {
            no_test: true,
            target_branch: Some("stable".into()),
            test_command: Some("pytest".into()),
            release_version: Some("2.0".into()),
            yes: true,
            ..ReleaseArgs::default()
        };

        let options = release_options(args, &config);

        assert!(!options.steps.test);
        assert_eq!(options.target_branch, "stable");
        assert_eq!(options.test_command.as_deref(), Some("pytest"));
        assert_eq!(options.version.as_deref(), Some("2.0"));
        assert!(!options.confirm);
    }

    #[test]
    fn progress_descriptions_cover_partial_releases() {
        assert_eq!(
            describe_progress(ReleaseState::Resolving),
            "Nothing was committed."
        );
        assert!(describe_progress(ReleaseState::Merged).contains("not tagged"));
    }
}
