use super::{changed, is_hex, Check, CheckError};
use crate::{
    command::{read, Invocation, Runner},
    script::Slot,
};
use std::sync::Arc;
use tempfile::Builder;
use thiserror::Error;

const STAGING_PREFIX: &str = "script-rev-hg-";

/// A check to find the latest changeset of a mercurial repository.
///
/// Mercurial cannot list remote heads without a repository, so every check initializes
/// an empty repository in a temporary directory and asks for the newest incoming changeset.
/// The directory is removed when the check returns.
pub struct HgCheck {
    runner: Arc<dyn Runner>,
}

/// A custom error describing the error cases for the HgCheck.
#[derive(Debug, Error)]
pub enum HgError {
    /// Cannot create the temporary directory.
    #[error("cannot create temporary directory ({0})")]
    TempDir(#[from] std::io::Error),
    /// `hg init` failed, usually because hg is not installed.
    #[error("cannot initialize an empty repository")]
    InitFailed,
    /// `hg incoming` failed.
    #[error("cannot get incoming changesets from {0}")]
    IncomingFailed(String),
    /// `hg incoming` didn't print a changeset.
    #[error("no changeset in the incoming changesets of {0}")]
    NoChangeset(String),
}

impl From<HgError> for CheckError {
    fn from(value: HgError) -> Self {
        match value {
            HgError::TempDir(_) | HgError::InitFailed => CheckError::Staging(value.to_string()),
            HgError::IncomingFailed(_) => CheckError::Unreachable(value.to_string()),
            HgError::NoChangeset(_) => CheckError::UnexpectedOutput(value.to_string()),
        }
    }
}

/// Find the hash in the `changeset:   1234:0123456789ab` line of `hg incoming`.
pub fn parse_changeset(incoming: &str) -> Option<String> {
    incoming
        .lines()
        .find_map(|line| line.strip_prefix("changeset:"))
        .and_then(|changeset| changeset.trim().split(':').nth(1))
        .map(str::trim)
        .filter(|hash| is_hex(hash))
        .map(String::from)
}

impl HgCheck {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        HgCheck { runner }
    }

    pub fn latest_changeset(&self, url: &str) -> Result<String, HgError> {
        let staging = Builder::new().prefix(STAGING_PREFIX).tempdir()?;

        read(
            self.runner.as_ref(),
            &Invocation::new("hg", ["init"]).dir(staging.path()),
        )
        .ok_or(HgError::InitFailed)?;

        let incoming = read(
            self.runner.as_ref(),
            &Invocation::new("hg", ["in", "-f", "-n", "-l", "1", url]).dir(staging.path()),
        )
        .ok_or_else(|| HgError::IncomingFailed(url.to_string()))?;

        parse_changeset(&incoming).ok_or_else(|| HgError::NoChangeset(url.to_string()))
    }
}

impl Check for HgCheck {
    fn check(&self, slot: &Slot) -> Result<Option<String>, CheckError> {
        let latest = self.latest_changeset(&slot.repo)?;
        let current = slot.pin.as_ref().map(|pin| pin.current.as_str());

        Ok(changed(current, latest))
    }
}
