use crate::script::Slot;
use mockall::automock;
use thiserror::Error;

/// A check to find the latest commit of a git branch or tag.
pub mod git;
/// A check to find the latest changeset of a mercurial repository.
pub mod hg;
/// A check to find the latest revision of a subversion repository.
pub mod svn;

/// A custom error for describing the error cases for checks.
///
/// None of these are fatal, a failed check means there is no update for this run.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The remote could not be queried: network failure, missing tool or timeout.
    #[error("cannot reach repository: {0}")]
    Unreachable(String),
    /// The remote wants credentials, we never ask for them.
    #[error("authentication required for {0}")]
    AuthenticationRequired(String),
    /// The tool answered, but not in a way we understand.
    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),
    /// There is no branch or tag that we could follow.
    #[error("no matching reference: {0}")]
    NoMatchingRef(String),
    /// Cannot prepare the local directory needed for the query.
    #[error("cannot prepare staging area: {0}")]
    Staging(String),
}

/// A check asks a remote repository for its latest revision.
///
/// Checks are implemented for:
///   - git commits on a branch or matching a tag filter ([git::GitCheck])
///   - subversion revisions ([svn::SvnCheck])
///   - mercurial changesets ([hg::HgCheck])
#[automock]
pub trait Check: Send + Sync {
    /// Return the latest revision of the slot's repository, if it is different from the pinned one.
    fn check(&self, slot: &Slot) -> Result<Option<String>, CheckError>;
}

/// Only report the latest revision if it differs from the current one.
pub(crate) fn changed(current: Option<&str>, latest: String) -> Option<String> {
    if current == Some(latest.as_str()) {
        None
    } else {
        Some(latest)
    }
}

pub(crate) fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_hexdigit())
}

#[cfg(test)]
pub(crate) mod test {
    use crate::{
        command::{CommandError, CommandOutput, Invocation, MockRunner},
        script::{Pin, Slot, Vcs},
    };

    pub fn slot(vcs: Vcs, repo: &str, current: &str) -> Slot {
        Slot {
            index: 1,
            repo: repo.to_string(),
            pin: Some(Pin {
                vcs,
                current: current.to_string(),
            }),
            branch: None,
            tag_filter: None,
        }
    }

    pub fn success(stdout: &str) -> Result<CommandOutput, CommandError> {
        Ok(CommandOutput {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn failure(code: i32, stderr: &str) -> Result<CommandOutput, CommandError> {
        Ok(CommandOutput {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    /// Expect exactly one call where the arguments start with `args`.
    pub fn expect(
        runner: &mut MockRunner,
        program: &'static str,
        args: &'static [&'static str],
        output: fn() -> Result<CommandOutput, CommandError>,
    ) {
        runner
            .expect_run()
            .withf(move |invocation: &Invocation| {
                invocation.program == program
                    && invocation.args.len() >= args.len()
                    && invocation.args.iter().zip(args).all(|(a, b)| a == *b)
            })
            .times(1)
            .returning(move |_| output());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_only_report_changed_revisions() {
        assert_eq!(None, changed(Some("abc"), String::from("abc")));
        assert_eq!(
            Some(String::from("def")),
            changed(Some("abc"), String::from("def"))
        );
        assert_eq!(Some(String::from("def")), changed(None, String::from("def")));
    }

    #[test]
    fn it_should_recognize_hex() {
        assert!(is_hex("51b7f2abdade"));
        assert!(!is_hex(""));
        assert!(!is_hex("v1.2.3"));
    }
}
