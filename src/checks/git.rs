use super::{changed, is_hex, Check, CheckError};
use crate::{
    command::{read, Invocation, Runner},
    script::Slot,
};
use log::debug;
use std::{cmp::Ordering, path::PathBuf, sync::Arc};
use thiserror::Error;

/// `git ls-remote --exit-code` exits with this if no ref matched.
const NO_MATCHING_REFS: i32 = 2;

/// A check to find the latest commit of a remote git repository.
///
/// If the slot has a tag filter, it follows the highest version tag matching the filter,
/// otherwise the head of the branch. Without a recorded branch the default branch of
/// the remote is resolved for every run.
pub struct GitCheck {
    runner: Arc<dyn Runner>,
    directory: PathBuf,
}

/// A custom error describing the error cases for the GitCheck.
#[derive(Debug, Error)]
pub enum GitError {
    /// The remote doesn't tell us its HEAD branch.
    #[error("cannot resolve the default branch of {0}")]
    NoDefaultBranch(String),
    /// The branch doesn't exist on the remote.
    #[error("branch {1} does not exist on {0}")]
    NoSuchBranch(String, String),
    /// There is no tag on the remote matching the filter.
    #[error("no tag matching {1} on {0}")]
    NoMatchingTag(String, String),
    /// Cannot run ls-remote. This can be a network failure, authentication error or many other things.
    #[error("cannot list references of {0} ({1})")]
    ListFailed(String, String),
    /// ls-remote printed something that is not a commit hash.
    #[error("{0} is not a commit hash")]
    InvalidCommit(String),
}

impl From<GitError> for CheckError {
    fn from(value: GitError) -> Self {
        match value {
            GitError::NoDefaultBranch(_)
            | GitError::NoSuchBranch(_, _)
            | GitError::NoMatchingTag(_, _) => CheckError::NoMatchingRef(value.to_string()),
            GitError::ListFailed(_, _) => CheckError::Unreachable(value.to_string()),
            GitError::InvalidCommit(_) => CheckError::UnexpectedOutput(value.to_string()),
        }
    }
}

/// Compare two ref names the way `--sort=v:refname` does: runs of digits are compared as numbers.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x = take_number(&mut a);
                let y = take_number(&mut b);
                let ordering = x.len().cmp(&y.len()).then_with(|| x.cmp(&y));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

/// Consume a run of digits, without leading zeroes.
fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(ch) = chars.next_if(char::is_ascii_digit) {
        digits.push(ch);
    }
    let trimmed = digits.trim_start_matches('0');
    trimmed.to_string()
}

/// Parse a `<commit>\t<ref>` line from ls-remote.
fn parse_ref_line(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    let commit = parts.next()?;
    let name = parts.next()?;
    Some((commit, name))
}

fn validate_commit(commit: &str) -> Result<String, GitError> {
    if (commit.len() == 40 || commit.len() == 64) && is_hex(commit) {
        Ok(commit.to_string())
    } else {
        Err(GitError::InvalidCommit(commit.to_string()))
    }
}

impl GitCheck {
    /// Create a check that runs `git` inside the given directory.
    pub fn new(runner: Arc<dyn Runner>, directory: impl Into<PathBuf>) -> Self {
        GitCheck {
            runner,
            directory: directory.into(),
        }
    }

    fn git<const N: usize>(&self, args: [&str; N]) -> Invocation {
        Invocation::new("git", args).dir(&self.directory)
    }

    /// Run ls-remote with `--exit-code`, separating "nothing matched" from failures.
    fn ls_remote(&self, url: &str, args: Invocation) -> Result<Option<String>, GitError> {
        match self.runner.run(&args) {
            Ok(output) if output.success => Ok(Some(output.stdout)),
            Ok(output) if output.code == Some(NO_MATCHING_REFS) => Ok(None),
            Ok(output) => Err(GitError::ListFailed(
                url.to_string(),
                output.stderr.trim_end().to_string(),
            )),
            Err(err) => Err(GitError::ListFailed(url.to_string(), err.to_string())),
        }
    }

    /// Resolve the HEAD branch of the remote.
    ///
    /// `git remote show` prints it as `HEAD branch: main`. It needs a repository to run in,
    /// so if that fails the symbolic ref is asked for with ls-remote instead.
    pub fn default_branch(&self, url: &str) -> Result<String, GitError> {
        let from_remote_show = read(self.runner.as_ref(), &self.git(["remote", "show", url]))
            .and_then(|stdout| {
                stdout
                    .lines()
                    .find_map(|line| line.trim().strip_prefix("HEAD branch:"))
                    .map(|branch| branch.trim().to_string())
            })
            .filter(|branch| !branch.is_empty() && branch != "(unknown)");
        if let Some(branch) = from_remote_show {
            return Ok(branch);
        }

        debug!("Cannot read HEAD branch of {url} with remote show, trying ls-remote.");
        read(
            self.runner.as_ref(),
            &self.git(["ls-remote", "--symref", url, "HEAD"]),
        )
        .and_then(|stdout| {
            stdout.lines().find_map(|line| {
                let (target, name) = line.strip_prefix("ref:")?.trim().split_once('\t')?;
                if name.trim() != "HEAD" {
                    return None;
                }
                target.trim().strip_prefix("refs/heads/").map(String::from)
            })
        })
        .ok_or_else(|| GitError::NoDefaultBranch(url.to_string()))
    }

    /// The commit at the head of the branch on the remote.
    pub fn branch_head(&self, url: &str, branch: &str) -> Result<String, GitError> {
        let refname = format!("refs/heads/{branch}");
        let stdout = self
            .ls_remote(
                url,
                self.git(["ls-remote", "--exit-code", "--heads", url, &refname]),
            )?
            .ok_or_else(|| GitError::NoSuchBranch(url.to_string(), branch.to_string()))?;

        let commit = stdout
            .lines()
            .filter_map(parse_ref_line)
            .find(|(_, name)| *name == refname)
            .map(|(commit, _)| commit)
            .ok_or_else(|| GitError::NoSuchBranch(url.to_string(), branch.to_string()))?;

        validate_commit(commit)
    }

    /// The commit of the highest version tag matching the filter on the remote.
    pub fn latest_tag(&self, url: &str, filter: &str) -> Result<String, GitError> {
        let pattern = format!("refs/tags/{filter}");
        let stdout = self
            .ls_remote(
                url,
                self.git([
                    "ls-remote",
                    "--exit-code",
                    "--tags",
                    "--refs",
                    "--sort=v:refname",
                    url,
                    &pattern,
                ]),
            )?
            .ok_or_else(|| GitError::NoMatchingTag(url.to_string(), filter.to_string()))?;

        let mut tags: Vec<(&str, &str)> = stdout.lines().filter_map(parse_ref_line).collect();
        tags.sort_by(|(_, a), (_, b)| version_cmp(a, b));

        let (commit, name) = tags
            .last()
            .ok_or_else(|| GitError::NoMatchingTag(url.to_string(), filter.to_string()))?;
        debug!("Latest tag of {url} matching {filter} is {name}.");

        validate_commit(commit)
    }

    fn check_inner(&self, slot: &Slot) -> Result<String, GitError> {
        if let Some(filter) = &slot.tag_filter {
            return self.latest_tag(&slot.repo, filter);
        }

        let branch = match &slot.branch {
            Some(branch) => branch.clone(),
            None => self.default_branch(&slot.repo)?,
        };
        self.branch_head(&slot.repo, &branch)
    }
}

impl Check for GitCheck {
    /// Ask the remote for the latest commit, returns it if it differs from the pinned one.
    fn check(&self, slot: &Slot) -> Result<Option<String>, CheckError> {
        let latest = self.check_inner(slot)?;
        let current = slot.pin.as_ref().map(|pin| pin.current.as_str());

        Ok(changed(current, latest))
    }
}
