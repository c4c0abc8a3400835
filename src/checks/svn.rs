use super::{changed, Check, CheckError};
use crate::{
    command::{Invocation, Runner},
    script::Slot,
};
use std::sync::Arc;
use thiserror::Error;

/// Phrases in the error output meaning the server wants credentials.
const AUTHENTICATION_PHRASES: [&str; 5] = [
    "Authentication required",
    "Username:",
    "authorization failed",
    "E170001",
    "E215004",
];

/// A check to find the latest revision of a subversion repository.
///
/// The repository is asked anonymously and never interactively: if the server
/// wants credentials, the repository is skipped.
pub struct SvnCheck {
    runner: Arc<dyn Runner>,
}

/// A custom error describing the error cases for the SvnCheck.
#[derive(Debug, Error)]
pub enum SvnError {
    /// The server asked for credentials.
    #[error("{0} requires authentication")]
    AuthenticationRequired(String),
    /// `svn info` failed for any other reason.
    #[error("cannot get info of {0} ({1})")]
    InfoFailed(String, String),
    /// `svn info` didn't print a numeric revision.
    #[error("no revision in the info of {0}")]
    NoRevision(String),
}

impl From<SvnError> for CheckError {
    fn from(value: SvnError) -> Self {
        match value {
            SvnError::AuthenticationRequired(url) => CheckError::AuthenticationRequired(url),
            SvnError::InfoFailed(_, _) => CheckError::Unreachable(value.to_string()),
            SvnError::NoRevision(_) => CheckError::UnexpectedOutput(value.to_string()),
        }
    }
}

pub fn requires_authentication(diagnostics: &str) -> bool {
    AUTHENTICATION_PHRASES
        .iter()
        .any(|phrase| diagnostics.contains(phrase))
}

/// Find the `Revision: 1234` line of `svn info`.
pub fn parse_revision(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("Revision:"))
        .map(str::trim)
        .filter(|revision| {
            !revision.is_empty() && revision.chars().all(|ch| ch.is_ascii_digit())
        })
        .map(String::from)
}

impl SvnCheck {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        SvnCheck { runner }
    }

    pub fn latest_revision(&self, url: &str) -> Result<String, SvnError> {
        let output = self
            .runner
            .run(&Invocation::new(
                "svn",
                ["info", "--non-interactive", "--no-auth-cache", url],
            ))
            .map_err(|err| SvnError::InfoFailed(url.to_string(), err.to_string()))?;

        if requires_authentication(&output.stderr) {
            return Err(SvnError::AuthenticationRequired(url.to_string()));
        }
        if !output.success {
            return Err(SvnError::InfoFailed(
                url.to_string(),
                output.stderr.trim_end().to_string(),
            ));
        }

        parse_revision(&output.stdout).ok_or_else(|| SvnError::NoRevision(url.to_string()))
    }
}

impl Check for SvnCheck {
    fn check(&self, slot: &Slot) -> Result<Option<String>, CheckError> {
        let latest = self.latest_revision(&slot.repo)?;
        let current = slot.pin.as_ref().map(|pin| pin.current.as_str());

        Ok(changed(current, latest))
    }
}
