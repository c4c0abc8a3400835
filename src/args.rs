use duration_string::DurationString;
use gumdrop::Options;

/// Check the repositories pinned in build scripts and update them to the latest revision.
#[derive(Debug, Options)]
pub struct Args {
    /// The directory containing the scripts directory, defaults to the current one.
    #[options(free)]
    pub directory: Option<String>,

    /// The directory to search for .sh scripts, relative to the base directory.
    #[options(no_short, default = "scripts.d")]
    pub scripts_dir: String,

    /// The number of scripts to check in parallel, 1 checks them one by one.
    #[options(default = "8")]
    pub jobs: usize,

    /// Kill external commands running longer than this.
    ///
    /// Can be a number postfixed with s(econd), m(inutes), h(ours), d(ays)
    #[options(default = "2m")]
    pub timeout: DurationString,

    /// Check everything, but don't write to the scripts.
    #[options(short = "n")]
    pub dry_run: bool,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print errors.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn it_should_use_the_defaults() {
        let args = Args::parse_args_default::<&str>(&[]).unwrap();

        assert_eq!(None, args.directory);
        assert_eq!("scripts.d", args.scripts_dir);
        assert_eq!(8, args.jobs);
        assert_eq!(Duration::from_secs(120), Duration::from(args.timeout));
        assert!(!args.dry_run);
    }

    #[test]
    fn it_should_parse_the_flags() {
        let args = Args::parse_args_default(&[
            "-j1",
            "--timeout",
            "30s",
            "--scripts-dir",
            "other.d",
            "-n",
            "-vv",
            "/srv/builds",
        ])
        .unwrap();

        assert_eq!(Some(String::from("/srv/builds")), args.directory);
        assert_eq!("other.d", args.scripts_dir);
        assert_eq!(1, args.jobs);
        assert_eq!(Duration::from_secs(30), Duration::from(args.timeout));
        assert!(args.dry_run);
        assert_eq!(2, args.verbose);
    }
}
