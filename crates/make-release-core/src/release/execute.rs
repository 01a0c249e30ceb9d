use camino::Utf8Path;
use tracing::{debug, info, instrument, warn};

use super::{
    Prompter, ReleaseError, ReleaseEvent, ReleaseInfo, ReleaseOutcome, ReleaseResult,
    ReleaseState, ReleaseStep, StepOutcome,
};
use crate::changelog::{header_line, insert_unreleased_section};
use crate::git::Vcs;
use crate::lines::{FileSnapshot, replace_line};
use crate::test_command::TestRunner;

impl ReleaseInfo {
    /// Run every enabled step in order.
    ///
    /// Calls `on_event` at step boundaries and whenever there is something
    /// to show before a confirmation gate. On failure an
    /// [`ReleaseEvent::Aborted`] event reports how far the release got;
    /// steps that already completed are not undone.
    #[instrument(skip_all, fields(name = %self.name, version = %self.version))]
    pub fn execute(
        &self,
        vcs: &dyn Vcs,
        tests: &dyn TestRunner,
        prompter: &dyn Prompter,
        on_event: impl FnMut(ReleaseEvent),
    ) -> ReleaseResult<ReleaseOutcome> {
        let mut runner = Runner {
            info: self,
            vcs,
            tests,
            prompter,
            on_event,
        };
        let mut reached = ReleaseState::Resolving;

        if let Err(e) = runner.confirm_start() {
            runner.emit(ReleaseEvent::Aborted {
                step: None,
                reached,
            });
            return Err(e);
        }

        let mut steps = Vec::new();
        for step in ReleaseStep::ALL {
            runner.emit(ReleaseEvent::StepStarted(step));

            let outcome = if self.steps.enabled(step) {
                match runner.run(step) {
                    Ok(message) => {
                        reached = reached.after(step);
                        StepOutcome::Completed { message }
                    }
                    Err(e) => {
                        warn!(%step, ?reached, error = %e, "release aborted");
                        runner.emit(ReleaseEvent::Aborted {
                            step: Some(step),
                            reached,
                        });
                        return Err(e);
                    }
                }
            } else {
                StepOutcome::Skipped {
                    reason: format!("{step} step disabled"),
                }
            };

            runner.emit(ReleaseEvent::StepCompleted(step, outcome.clone()));
            steps.push((step, outcome));
        }

        info!(tag = %self.tag_name, next = %self.next_version, "release complete");

        Ok(ReleaseOutcome {
            name: self.name.clone(),
            version: self.version.clone(),
            tag_name: self.tag_name.clone(),
            next_version: self.next_version.clone(),
            steps,
            state: ReleaseState::Done,
        })
    }
}

struct Runner<'a, F> {
    info: &'a ReleaseInfo,
    vcs: &'a dyn Vcs,
    tests: &'a dyn TestRunner,
    prompter: &'a dyn Prompter,
    on_event: F,
}

impl<F: FnMut(ReleaseEvent)> Runner<'_, F> {
    fn emit(&mut self, event: ReleaseEvent) {
        (self.on_event)(event);
    }

    fn run(&mut self, step: ReleaseStep) -> ReleaseResult<String> {
        match step {
            ReleaseStep::Test => self.test(),
            ReleaseStep::Prepare => self.prepare(),
            ReleaseStep::Merge => self.merge(),
            ReleaseStep::Tag => self.tag(),
            ReleaseStep::Resume => self.resume(),
        }
    }

    // ──────────────────────────────────────────────
    // Gates
    // ──────────────────────────────────────────────

    fn confirm_start(&mut self) -> ReleaseResult<()> {
        let ReleaseInfo { version, date, .. } = self.info;
        if self.info.confirmation_required {
            if !self
                .prompter
                .confirm(&format!("Continue with release?: {version} - {date}"))?
            {
                return Err(ReleaseError::Declined { step: None });
            }
        } else {
            self.emit(ReleaseEvent::Notice(format!(
                "Continuing with release: {version} - {date}"
            )));
        }
        Ok(())
    }

    /// Ask `question`, or emit `notice` and carry on when unattended.
    fn gate(&mut self, question: &str, notice: &str) -> ReleaseResult<bool> {
        if self.info.confirmation_required {
            self.prompter.confirm(question)
        } else {
            self.emit(ReleaseEvent::Notice(notice.to_string()));
            Ok(true)
        }
    }

    fn require(&mut self, step: ReleaseStep, question: &str, notice: &str) -> ReleaseResult<()> {
        if self.gate(question, notice)? {
            Ok(())
        } else {
            Err(ReleaseError::Declined { step: Some(step) })
        }
    }

    fn commit_message(&self, step: ReleaseStep, default: &str) -> ReleaseResult<String> {
        if self.info.confirmation_required {
            self.prompter
                .commit_message(default)
                .map_err(|e| match e {
                    ReleaseError::Declined { step: None } => {
                        ReleaseError::Declined { step: Some(step) }
                    }
                    other => other,
                })
        } else {
            Ok(default.to_string())
        }
    }

    // ──────────────────────────────────────────────
    // Branch handling
    // ──────────────────────────────────────────────

    fn return_to(&self, branch: Option<&str>) -> ReleaseResult<()> {
        if let Some(branch) = branch {
            self.vcs.checkout(branch)?;
        }
        Ok(())
    }

    /// Best-effort return after a failure; the original error wins.
    fn abandon(&self, branch: Option<&str>) {
        if let Err(e) = self.return_to(branch) {
            warn!(?branch, error = %e, "failed to return to starting branch");
        }
    }

    // ──────────────────────────────────────────────
    // Steps
    // ──────────────────────────────────────────────

    fn test(&mut self) -> ReleaseResult<String> {
        let command = &self.info.test_command;
        let status = self.tests.run(command)?;
        if !status.success() {
            return Err(ReleaseError::TestsFailed {
                command: command.clone(),
                code: status.code,
            });
        }
        Ok(format!("Tests passed ({command})"))
    }

    fn prepare(&mut self) -> ReleaseResult<String> {
        let ReleaseInfo {
            name,
            version,
            date,
            ..
        } = self.info;

        self.edit_and_commit(
            ReleaseStep::Prepare,
            |info| {
                for source in info.manifest.iter().chain(&info.version_file) {
                    source.update(&info.version)?;
                }
                replace_line(
                    &info.changelog,
                    info.changelog_section.line,
                    &header_line(&info.version, &info.date),
                )?;
                Ok(())
            },
            &format!("Prepare {name} release {version}"),
        )?;

        Ok(format!("Prepared {name} {version} ({date})"))
    }

    fn merge(&mut self) -> ReleaseResult<String> {
        let ReleaseInfo {
            name,
            version,
            dev_branch: dev,
            target_branch: target,
            ..
        } = self.info;

        let starting = self.vcs.current_branch()?;

        let log = self.vcs.log_range(target, dev)?;
        self.emit(ReleaseEvent::Output {
            step: ReleaseStep::Merge,
            label: format!("commits on {dev} not on {target}"),
            text: log,
        });

        self.require(
            ReleaseStep::Merge,
            &format!("Merge these changes from {dev} into {target} for release {version}?"),
            &format!("Merging changes from {dev} into {target} for release {version}"),
        )?;
        let message = self.commit_message(
            ReleaseStep::Merge,
            &format!("Merge branch '{dev}' for {name} release {version}"),
        )?;

        self.vcs.checkout(target)?;
        self.vcs.merge_no_ff(dev, &message)?;
        self.return_to(starting.as_deref())?;

        Ok(format!("Merged {dev} into {target}"))
    }

    fn tag(&mut self) -> ReleaseResult<String> {
        let info = self.info;
        let starting = self.vcs.current_branch()?;

        // The release commit is the merge commit when merging, else the
        // prepare commit.
        let branch = if info.steps.merge {
            &info.target_branch
        } else {
            &info.dev_branch
        };
        self.vcs.checkout(branch)?;

        let confirmed = match self.show_and_confirm_tag() {
            Ok(confirmed) => confirmed,
            Err(e) => {
                self.abandon(starting.as_deref());
                return Err(e);
            }
        };

        if confirmed {
            let message = format!("Release {} {}", info.name, info.version);
            if let Err(e) = self.vcs.create_tag(&info.tag_name, &message) {
                self.abandon(starting.as_deref());
                return Err(e.into());
            }
        }
        self.return_to(starting.as_deref())?;

        if !confirmed {
            return Err(ReleaseError::Declined {
                step: Some(ReleaseStep::Tag),
            });
        }
        Ok(format!("Tagged {branch} as {}", info.tag_name))
    }

    fn show_and_confirm_tag(&mut self) -> ReleaseResult<bool> {
        let last = self.vcs.last_commit()?;
        self.emit(ReleaseEvent::Output {
            step: ReleaseStep::Tag,
            label: "commit to tag".to_string(),
            text: last,
        });
        self.gate("Tag this commit?", "Tagging commit")
    }

    fn resume(&mut self) -> ReleaseResult<String> {
        let ReleaseInfo {
            name, next_version, ..
        } = self.info;
        let dev_version = self.info.dev_version();

        self.edit_and_commit(
            ReleaseStep::Resume,
            |info| {
                let dev_version = info.dev_version();
                for source in info.manifest.iter().chain(&info.version_file) {
                    source.update(&dev_version)?;
                }
                insert_unreleased_section(
                    &info.changelog,
                    info.changelog_section.line,
                    &info.next_version,
                )?;
                Ok(())
            },
            &format!("Resume development of {name} at {next_version}"),
        )?;

        Ok(format!("Resumed development at {dev_version}"))
    }

    /// Edit the release files on the dev branch and commit them.
    ///
    /// The files are snapshotted first. If anything after that fails or is
    /// declined, they are restored and the starting branch is checked out
    /// again before the error is returned.
    fn edit_and_commit(
        &mut self,
        step: ReleaseStep,
        edit: impl FnOnce(&ReleaseInfo) -> ReleaseResult<()>,
        default_message: &str,
    ) -> ReleaseResult<()> {
        let info = self.info;
        let starting = self.vcs.current_branch()?;
        self.vcs.checkout(&info.dev_branch)?;

        let files = info.release_files();
        let snapshot = match FileSnapshot::capture(files.iter().copied()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.abandon(starting.as_deref());
                return Err(e.into());
            }
        };

        if let Err(e) = self.edit_diff_commit(step, &files, edit, default_message) {
            debug!(%step, "restoring release files");
            if let Err(restore) = snapshot.restore() {
                warn!(error = %restore, "failed to restore release files");
            }
            self.abandon(starting.as_deref());
            return Err(e);
        }

        self.return_to(starting.as_deref())
    }

    fn edit_diff_commit(
        &mut self,
        step: ReleaseStep,
        files: &[&Utf8Path],
        edit: impl FnOnce(&ReleaseInfo) -> ReleaseResult<()>,
        default_message: &str,
    ) -> ReleaseResult<()> {
        edit(self.info)?;

        let diff = self.vcs.diff(files)?;
        self.emit(ReleaseEvent::Output {
            step,
            label: "diff".to_string(),
            text: diff,
        });

        self.require(step, "Commit these changes?", "Committing changes")?;
        let message = self.commit_message(step, default_message)?;
        self.vcs.commit(files, &message)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::fakes::{
        CHANGELOG, FakeTests, FakeVcs, INIT, PYPROJECT, ScriptedPrompter, project, read,
    };
    use crate::release::{ReleaseOptions, Steps, plan_release};

    fn plan(root: &Utf8Path, options: ReleaseOptions) -> ReleaseInfo {
        let options = ReleaseOptions {
            dev_branch: Some("dev".into()),
            date: Some("2024-05-01".into()),
            ..options
        };
        plan_release(root, &FakeVcs::on_branch("dev"), options).unwrap()
    }

    fn unattended() -> ReleaseOptions {
        ReleaseOptions {
            confirm: false,
            ..ReleaseOptions::default()
        }
    }

    fn assert_untouched(root: &Utf8Path) {
        assert_eq!(read(root, "pyproject.toml"), PYPROJECT);
        assert_eq!(read(root, "demo/__init__.py"), INIT);
        assert_eq!(read(root, "CHANGELOG.md"), CHANGELOG);
    }

    #[test]
    fn unattended_release_runs_every_step() {
        let (_tmp, root) = project();
        let info = plan(&root, unattended());
        let vcs = FakeVcs::on_branch("dev");
        let tests = FakeTests::passing();
        let prompter = ScriptedPrompter::default();
        let mut events = Vec::new();

        let outcome = info
            .execute(&vcs, &tests, &prompter, |e| events.push(e))
            .unwrap();

        assert_eq!(outcome.state, ReleaseState::Done);
        assert_eq!(outcome.tag_name, "1.0");
        assert_eq!(outcome.next_version, "1.1");
        assert!(
            outcome
                .steps
                .iter()
                .all(|(_, o)| matches!(o, StepOutcome::Completed { .. }))
        );

        assert_eq!(*tests.ran.borrow(), ["python -m unittest discover ."]);
        assert!(prompter.questions.borrow().is_empty());
        assert_eq!(prompter.message_prompts.get(), 0);

        let files = "pyproject.toml,__init__.py,CHANGELOG.md";
        let expected = [
            "current_branch".to_string(),
            "checkout dev".into(),
            format!("diff {files}"),
            format!("commit {files}: Prepare demo release 1.0"),
            "checkout dev".into(),
            "current_branch".into(),
            "log prod..dev".into(),
            "checkout prod".into(),
            "merge dev: Merge branch 'dev' for demo release 1.0".into(),
            "checkout dev".into(),
            "current_branch".into(),
            "checkout prod".into(),
            "last_commit".into(),
            "tag 1.0: Release demo 1.0".into(),
            "checkout dev".into(),
            "current_branch".into(),
            "checkout dev".into(),
            format!("diff {files}"),
            format!("commit {files}: Resume development of demo at 1.1"),
            "checkout dev".into(),
        ];
        assert_eq!(vcs.calls(), expected);
        assert_eq!(vcs.branch().as_deref(), Some("dev"));

        assert_eq!(
            read(&root, "pyproject.toml"),
            "[project]\nname = \"demo\"\nversion = \"1.1.dev0\"\n"
        );
        assert_eq!(read(&root, "demo/__init__.py"), "__version__ = '1.1.dev0'\n");
        assert_eq!(
            read(&root, "CHANGELOG.md"),
            "# Changes\n\n## 1.1 - unreleased\n\nIn progress...\n\n\
             ## 1.0 - 2024-05-01\n\n- Add feature\n\n## 0.9 - 2024-01-01\n\n- First\n"
        );

        let notices: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ReleaseEvent::Notice(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            notices,
            [
                "Continuing with release: 1.0 - 2024-05-01",
                "Committing changes",
                "Merging changes from dev into prod for release 1.0",
                "Tagging commit",
                "Committing changes",
            ]
        );
        assert!(!events.iter().any(|e| matches!(e, ReleaseEvent::Aborted { .. })));
    }

    #[test]
    fn failing_tests_touch_nothing() {
        let (_tmp, root) = project();
        let info = plan(&root, unattended());
        let vcs = FakeVcs::on_branch("dev");
        let mut events = Vec::new();

        let err = info
            .execute(
                &vcs,
                &FakeTests::exiting(Some(1)),
                &ScriptedPrompter::default(),
                |e| events.push(e),
            )
            .unwrap_err();

        assert!(matches!(err, ReleaseError::TestsFailed { code: Some(1), .. }));
        assert_eq!(err.exit_code(), 10);
        assert!(vcs.calls().is_empty());
        assert_untouched(&root);
        assert!(matches!(
            events.last(),
            Some(ReleaseEvent::Aborted {
                step: Some(ReleaseStep::Test),
                reached: ReleaseState::Resolving,
            })
        ));
    }

    #[test]
    fn declining_start_runs_nothing() {
        let (_tmp, root) = project();
        let info = plan(&root, ReleaseOptions::default());
        let tests = FakeTests::passing();
        let prompter = ScriptedPrompter::answering(&[false]);
        let mut events = Vec::new();

        let err = info
            .execute(&FakeVcs::on_branch("dev"), &tests, &prompter, |e| {
                events.push(e)
            })
            .unwrap_err();

        assert!(matches!(err, ReleaseError::Declined { step: None }));
        assert_eq!(err.exit_code(), 11);
        assert!(tests.ran.borrow().is_empty());
        assert_eq!(
            *prompter.questions.borrow(),
            ["Continue with release?: 1.0 - 2024-05-01"]
        );
        assert!(matches!(
            events.as_slice(),
            [ReleaseEvent::Aborted {
                step: None,
                reached: ReleaseState::Resolving,
            }]
        ));
    }

    #[test]
    fn declined_commit_restores_files_and_branch() {
        let (_tmp, root) = project();
        let info = plan(&root, ReleaseOptions::default());
        let vcs = FakeVcs::on_branch("main");
        let prompter = ScriptedPrompter::answering(&[true, false]);

        let err = info
            .execute(&vcs, &FakeTests::passing(), &prompter, |_| {})
            .unwrap_err();

        assert!(matches!(
            err,
            ReleaseError::Declined {
                step: Some(ReleaseStep::Prepare)
            }
        ));
        assert_untouched(&root);
        assert_eq!(vcs.branch().as_deref(), Some("main"));
        assert!(!vcs.calls().iter().any(|c| c.starts_with("commit")));
        assert_eq!(prompter.message_prompts.get(), 0);
        assert_eq!(prompter.questions.borrow()[1], "Commit these changes?");
    }

    #[test]
    fn cancelled_commit_message_names_the_step() {
        let (_tmp, root) = project();
        let info = plan(&root, ReleaseOptions::default());
        let vcs = FakeVcs::on_branch("main");
        let prompter = ScriptedPrompter::default().cancelling_messages();

        let err = info
            .execute(&vcs, &FakeTests::passing(), &prompter, |_| {})
            .unwrap_err();

        assert!(matches!(
            err,
            ReleaseError::Declined {
                step: Some(ReleaseStep::Prepare)
            }
        ));
        assert_eq!(err.to_string(), "release cancelled at prepare step");
        assert_eq!(err.exit_code(), 11);
        assert_untouched(&root);
        assert_eq!(vcs.branch().as_deref(), Some("main"));
        assert!(!vcs.calls().iter().any(|c| c.starts_with("commit")));
    }

    #[test]
    fn cancelled_merge_message_stays_on_starting_branch() {
        let (_tmp, root) = project();
        let options = ReleaseOptions {
            steps: Steps {
                test: false,
                prepare: false,
                ..Steps::default()
            },
            ..ReleaseOptions::default()
        };
        let info = plan(&root, options);
        let vcs = FakeVcs::on_branch("dev");
        let prompter = ScriptedPrompter::default().cancelling_messages();

        let err = info
            .execute(&vcs, &FakeTests::passing(), &prompter, |_| {})
            .unwrap_err();

        assert!(matches!(
            err,
            ReleaseError::Declined {
                step: Some(ReleaseStep::Merge)
            }
        ));
        assert!(!vcs.calls().iter().any(|c| c.starts_with("checkout prod")));
        assert_eq!(vcs.branch().as_deref(), Some("dev"));
    }

    #[test]
    fn declined_tag_stops_after_merge() {
        let (_tmp, root) = project();
        let info = plan(&root, ReleaseOptions::default());
        let vcs = FakeVcs::on_branch("dev");
        let prompter = ScriptedPrompter::answering(&[true, true, true, false]);
        let mut events = Vec::new();

        let err = info
            .execute(&vcs, &FakeTests::passing(), &prompter, |e| events.push(e))
            .unwrap_err();

        assert!(matches!(
            err,
            ReleaseError::Declined {
                step: Some(ReleaseStep::Tag)
            }
        ));
        assert_eq!(
            *prompter.questions.borrow(),
            [
                "Continue with release?: 1.0 - 2024-05-01",
                "Commit these changes?",
                "Merge these changes from dev into prod for release 1.0?",
                "Tag this commit?",
            ]
        );
        assert_eq!(prompter.message_prompts.get(), 2);
        assert!(!vcs.calls().iter().any(|c| c.starts_with("tag")));
        assert_eq!(vcs.branch().as_deref(), Some("dev"));
        assert!(matches!(
            events.last(),
            Some(ReleaseEvent::Aborted {
                step: Some(ReleaseStep::Tag),
                reached: ReleaseState::Merged,
            })
        ));
        // The prepare commit stays.
        assert_eq!(
            read(&root, "pyproject.toml"),
            "[project]\nname = \"demo\"\nversion = \"1.0\"\n"
        );
    }

    #[test]
    fn merge_failure_reports_prepared_state() {
        let (_tmp, root) = project();
        let info = plan(&root, unattended());
        let vcs = FakeVcs::on_branch("dev").failing("merge");
        let mut events = Vec::new();

        let err = info
            .execute(
                &vcs,
                &FakeTests::passing(),
                &ScriptedPrompter::default(),
                |e| events.push(e),
            )
            .unwrap_err();

        assert!(matches!(err, ReleaseError::Git(_)));
        assert_eq!(err.exit_code(), 10);
        assert!(matches!(
            events.last(),
            Some(ReleaseEvent::Aborted {
                step: Some(ReleaseStep::Merge),
                reached: ReleaseState::Prepared,
            })
        ));
        assert!(read(&root, "CHANGELOG.md").contains("## 1.0 - 2024-05-01"));
    }

    #[test]
    fn failed_commit_restores_files() {
        let (_tmp, root) = project();
        let info = plan(&root, unattended());
        let vcs = FakeVcs::on_branch("dev").failing("commit");

        let err = info
            .execute(
                &vcs,
                &FakeTests::passing(),
                &ScriptedPrompter::default(),
                |_| {},
            )
            .unwrap_err();

        assert!(matches!(err, ReleaseError::Git(_)));
        assert_untouched(&root);
    }

    #[test]
    fn disabled_steps_are_skipped() {
        let (_tmp, root) = project();
        let steps = Steps {
            prepare: false,
            merge: false,
            resume: false,
            ..Steps::default()
        };
        let info = plan(
            &root,
            ReleaseOptions {
                steps,
                ..unattended()
            },
        );
        let vcs = FakeVcs::on_branch("dev");
        let mut started = Vec::new();

        let outcome = info
            .execute(
                &vcs,
                &FakeTests::passing(),
                &ScriptedPrompter::default(),
                |e| {
                    if let ReleaseEvent::StepStarted(step) = e {
                        started.push(step);
                    }
                },
            )
            .unwrap();

        assert_eq!(started, ReleaseStep::ALL);
        assert_eq!(
            outcome.steps[1],
            (
                ReleaseStep::Prepare,
                StepOutcome::Skipped {
                    reason: "prepare step disabled".into()
                }
            )
        );
        // Without a merge the tag goes on the dev branch.
        assert_eq!(
            vcs.calls(),
            [
                "current_branch",
                "checkout dev",
                "last_commit",
                "tag 1.0: Release demo 1.0",
                "checkout dev",
            ]
        );
        assert_untouched(&root);
    }

    #[test]
    fn outputs_precede_gates() {
        let (_tmp, root) = project();
        let info = plan(&root, unattended());
        let mut labels = Vec::new();

        info.execute(
            &FakeVcs::on_branch("dev"),
            &FakeTests::passing(),
            &ScriptedPrompter::default(),
            |e| {
                if let ReleaseEvent::Output { step, label, .. } = e {
                    labels.push(format!("{step}: {label}"));
                }
            },
        )
        .unwrap();

        assert_eq!(
            labels,
            [
                "prepare: diff",
                "merge: commits on dev not on prod",
                "tag: commit to tag",
                "resume: diff",
            ]
        );
    }
}
