use crate::{args::Args, MainError};
use log::{debug, warn, Level, LevelFilter};
use simplelog::{
    format_description, Color, ColorChoice, ConfigBuilder, LevelPadding, TermLogger, TerminalMode,
};

// RFC 3339 with milliseconds, long runs are easier to follow with exact times
const TIMESTAMP_FORMAT: &[simplelog::FormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory]:[offset_minute]"
);

/// Errors always show, `-v` adds the commands being run, `-vv` their output.
fn level_filter(args: &Args) -> LevelFilter {
    match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

pub fn init_logger(args: &Args) -> Result<(), MainError> {
    TermLogger::init(
        level_filter(args),
        ConfigBuilder::new()
            .set_level_color(Level::Debug, Some(Color::Magenta))
            .set_level_color(Level::Trace, None)
            .set_level_padding(LevelPadding::Right)
            .set_target_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_time_format_custom(TIMESTAMP_FORMAT)
            .set_time_offset_to_local()
            .map_err(|_| MainError::FailedLoggerTimezones)?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    if args.verbose > 2 {
        warn!("Tracing already prints every command output, more -v flags change nothing.");
    }
    if args.dry_run {
        warn!("Dry run, no script will be written.");
    }
    debug!("Logging at {} level.", level_filter(args));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gumdrop::Options;

    #[test]
    fn it_should_map_verbosity_to_levels() {
        let level = |flags: &[&str]| level_filter(&Args::parse_args_default(flags).unwrap());

        assert_eq!(LevelFilter::Info, level(&[]));
        assert_eq!(LevelFilter::Debug, level(&["-v"]));
        assert_eq!(LevelFilter::Trace, level(&["-vvv"]));
        assert_eq!(LevelFilter::Trace, level(&["-vvvv"]));
        assert_eq!(LevelFilter::Error, level(&["-q", "-v"]));
        assert_eq!(LevelFilter::Error, level(&["-q", "-n"]));
    }
}
