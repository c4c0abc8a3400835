use crate::update::{ScriptReport, UpdateError, Updater};
use log::{debug, error, info};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{mpsc, Mutex},
    thread,
};
use thiserror::Error;
use walkdir::WalkDir;

/// A custom error implementation for the start function
#[derive(Debug, Error)]
pub enum StartError {
    #[error("You have to run at least one job.")]
    NoJobs,
    #[error("The scripts directory {0} does not exist.")]
    MissingScriptsDirectory(PathBuf),
}

/// The outcome of one script, sent back from the workers.
#[derive(Debug)]
pub struct ScriptResult {
    pub path: PathBuf,
    pub result: Result<ScriptReport, UpdateError>,
}

/// Counts of what happened in a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub scanned: usize,
    pub updated: usize,
    pub marked: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, result: &ScriptResult) {
        self.scanned += 1;
        match &result.result {
            Ok(report) => {
                if report.skipped {
                    self.skipped += 1;
                }
                if report.is_updated() {
                    self.updated += 1;
                }
                if !report.markers.is_empty() {
                    self.marked += 1;
                }
            }
            Err(err) => {
                error!("Error processing {}: {err}.", result.path.display());
                self.failed += 1;
            }
        }
    }
}

/// Find every `.sh` file under the directory, in a stable order.
pub fn discover_scripts(directory: &Path) -> Vec<PathBuf> {
    let mut scripts: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|extension| extension == "sh"))
        .collect();
    scripts.sort();
    scripts
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}

/// Process every script in the directory with `jobs` worker threads.
///
/// Each worker takes the next script from a shared queue and sends its result back on a channel,
/// which is collected here. A failing script never stops the others.
pub fn start(updater: &Updater, directory: &Path, jobs: usize) -> Result<Summary, StartError> {
    if jobs == 0 {
        return Err(StartError::NoJobs);
    }
    if !directory.is_dir() {
        return Err(StartError::MissingScriptsDirectory(directory.to_path_buf()));
    }

    let scripts = discover_scripts(directory);
    info!("Found {} scripts in {}.", scripts.len(), directory.display());
    let workers = jobs.min(scripts.len());

    let (job_tx, job_rx) = mpsc::channel::<PathBuf>();
    for script in scripts {
        if job_tx.send(script).is_err() {
            break;
        }
    }
    drop(job_tx);
    let job_rx = Mutex::new(job_rx);

    let (result_tx, result_rx) = mpsc::channel::<ScriptResult>();
    let mut summary = Summary::default();

    thread::scope(|scope| {
        for worker in 0..workers {
            let result_tx = result_tx.clone();
            let job_rx = &job_rx;
            scope.spawn(move || {
                debug!("Worker {worker} started.");
                loop {
                    let next = job_rx.lock().ok().and_then(|rx| rx.recv().ok());
                    let Some(path) = next else {
                        break;
                    };

                    let result = panic::catch_unwind(AssertUnwindSafe(|| updater.process(&path)))
                        .unwrap_or_else(|payload| {
                            Err(UpdateError::Panicked(panic_message(payload)))
                        });
                    if result_tx.send(ScriptResult { path, result }).is_err() {
                        break;
                    }
                }
                debug!("Worker {worker} finished.");
            });
        }
        drop(result_tx);

        for result in result_rx {
            summary.record(&result);
        }
    });

    Ok(summary)
}
