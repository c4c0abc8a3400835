use args::{parse_args, Args};
use log::{debug, error, info, SetLoggerError};
use logger::init_logger;
use script_rev::{
    command::DuctRunner,
    start::{start, StartError, Summary},
    update::{Checks, Updater},
};
use std::{path::PathBuf, process, sync::Arc, time::Duration};
use thiserror::Error;

mod args;
mod logger;

/// A custom error for everything that stops the run before any script is processed.
#[derive(Debug, Error)]
pub enum MainError {
    #[error("Timezone offset cannot be determined for the logs.")]
    FailedLoggerTimezones,
    #[error("Cannot set up the logger: {0}.")]
    FailedLogger(#[from] SetLoggerError),
    #[error("{0}")]
    FailedStart(#[from] StartError),
}

fn run(args: Args) -> Result<Summary, MainError> {
    let directory = PathBuf::from(args.directory.unwrap_or_else(|| String::from(".")));
    let timeout: Duration = args.timeout.into();
    debug!(
        "Checking {} with {} jobs and a timeout of {timeout:?}.",
        directory.display(),
        args.jobs
    );

    // Setup checks, every command runs relative to the base directory.
    let runner = Arc::new(DuctRunner::new(timeout));
    let checks = Checks::new(runner, &directory);
    let updater = Updater::new(checks).dry_run(args.dry_run);

    let summary = start(&updater, &directory.join(&args.scripts_dir), args.jobs)?;
    Ok(summary)
}

fn main() {
    let args = parse_args();

    if args.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = init_logger(&args) {
        eprintln!("{err}");
        process::exit(1);
    }

    match run(args) {
        Ok(summary) => {
            info!(
                "Finished: {} scripts, {} updated, {} marked for manual check, {} skipped, {} failed.",
                summary.scanned, summary.updated, summary.marked, summary.skipped, summary.failed
            );
        }
        Err(err) => {
            error!("{err}");
            process::exit(1);
        }
    }
}
