use super::ReleaseResult;

/// Asks the operator to approve gates and edit commit messages.
///
/// Only consulted when a release requires confirmation; unattended runs
/// never call it.
pub trait Prompter {
    /// Ask a yes/no question. `Ok(false)` means the operator declined.
    fn confirm(&self, message: &str) -> ReleaseResult<bool>;

    /// Offer `default` as a commit message and return the operator's edit.
    ///
    /// A cancelled prompt is `Declined { step: None }`; the workflow fills in
    /// the step it was asked from.
    fn commit_message(&self, default: &str) -> ReleaseResult<String>;
}
