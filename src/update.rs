use crate::{
    checks::{git::GitCheck, hg::HgCheck, svn::SvnCheck, Check, CheckError},
    command::Runner,
    script::{Marker, Script, Vcs, MAX_SLOTS},
};
use log::{debug, info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

/// Custom error describing why a script could not be processed.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("cannot read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("cannot write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    /// The worker processing the script panicked.
    #[error("processing panicked: {0}")]
    Panicked(String),
}

/// A revision variable that was bumped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub name: String,
    pub old: String,
    pub new: String,
}

/// What happened to a single script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptReport {
    /// The script has the skip variable, nothing was checked.
    pub skipped: bool,
    /// Markers appended in this run.
    pub markers: Vec<Marker>,
    pub changes: Vec<Change>,
}

impl ScriptReport {
    pub fn is_updated(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// The checks for each version control system.
pub struct Checks {
    pub git: Box<dyn Check>,
    pub svn: Box<dyn Check>,
    pub hg: Box<dyn Check>,
}

impl Checks {
    /// The real checks, running every command with the runner inside `directory`.
    pub fn new(runner: Arc<dyn Runner>, directory: &Path) -> Self {
        Checks {
            git: Box::new(GitCheck::new(runner.clone(), directory)),
            svn: Box::new(SvnCheck::new(runner.clone())),
            hg: Box::new(HgCheck::new(runner)),
        }
    }

    fn for_vcs(&self, vcs: Vcs) -> &dyn Check {
        match vcs {
            Vcs::Svn => self.svn.as_ref(),
            Vcs::Hg => self.hg.as_ref(),
            Vcs::Git => self.git.as_ref(),
        }
    }
}

/// Checks every slot of a script and writes back the new revisions.
pub struct Updater {
    checks: Checks,
    dry_run: bool,
}

impl Updater {
    pub fn new(checks: Checks) -> Self {
        Updater {
            checks,
            dry_run: false,
        }
    }

    /// Only report changes, never write to the scripts.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn write(&self, path: &Path, script: &Script) -> Result<(), UpdateError> {
        if self.dry_run {
            debug!("Not writing {} in a dry run.", path.display());
            return Ok(());
        }
        fs::write(path, script.content())
            .map_err(|err| UpdateError::Write(path.to_path_buf(), err))
    }

    /// Append the marker and write it out right away, independent of the revision updates.
    fn mark(
        &self,
        path: &Path,
        script: &mut Script,
        marker: Marker,
        report: &mut ScriptReport,
    ) -> Result<(), UpdateError> {
        if !script.append_marker(marker) {
            debug!("{} is already marked with {marker}.", path.display());
            return Ok(());
        }

        match marker {
            Marker::MissingRepository => info!("{} needs manual check.", path.display()),
            Marker::UnknownLayout => {
                info!("{} has unknown layout, needs manual check.", path.display())
            }
        }
        report.markers.push(marker);
        self.write(path, script)
    }

    /// Process a single script: check every declared slot and update the revisions that changed.
    pub fn process(&self, path: &Path) -> Result<ScriptReport, UpdateError> {
        info!("Processing {}.", path.display());

        let content =
            fs::read_to_string(path).map_err(|err| UpdateError::Read(path.to_path_buf(), err))?;
        let mut script = Script::parse(content);
        let mut report = ScriptReport::default();

        if script.is_skipped() {
            debug!("Skipping {}.", path.display());
            report.skipped = true;
            return Ok(report);
        }

        for index in 1..=MAX_SLOTS {
            let Some(slot) = script.slot(index) else {
                if index == 1 {
                    self.mark(path, &mut script, Marker::MissingRepository, &mut report)?;
                }
                break;
            };
            let (Some(pin), Some(name)) = (&slot.pin, slot.revision_var()) else {
                self.mark(path, &mut script, Marker::UnknownLayout, &mut report)?;
                break;
            };

            info!("Checking {} for {}.", pin.vcs, slot.repo);
            match self.checks.for_vcs(pin.vcs).check(&slot) {
                Ok(Some(latest)) => {
                    info!("Updating {} from {} to {latest}.", name, pin.current);
                    if script.set(&name, &latest) {
                        report.changes.push(Change {
                            name,
                            old: pin.current.clone(),
                            new: latest,
                        });
                    }
                }
                Ok(None) => debug!("{} is up to date.", slot.repo),
                Err(CheckError::AuthenticationRequired(_)) => {
                    warn!("Skipping {}, authentication required.", slot.repo)
                }
                Err(err) => warn!("Cannot check {}: {err}.", slot.repo),
            }
        }

        if report.is_updated() {
            info!("Updating {}.", path.display());
            self.write(path, &script)?;
        }

        Ok(report)
    }
}
