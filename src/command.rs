use duct::cmd;
use log::{debug, trace};
use mockall::automock;
use std::{
    path::PathBuf,
    process::Output,
    thread::sleep,
    time::{Duration, Instant},
};
use thiserror::Error;

/// The default time limit for a single external command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Environment that keeps git and ssh from prompting for credentials on the terminal.
const NON_INTERACTIVE_ENV: [(&str, &str); 3] = [
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_ASKPASS", "echo"),
    ("GIT_SSH_COMMAND", "ssh -o BatchMode=yes"),
];

/// A program with its arguments and an optional working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
        }
    }

    /// Run the program inside the given directory.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// The invocation rendered as a shell-quoted command line, for logging.
    pub fn command_line(&self) -> String {
        let words =
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words)
            .unwrap_or_else(|_| format!("{} {}", self.program, self.args.join(" ")))
    }
}

/// Everything a finished command left behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Custom error describing the error cases for running external commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The underlying process creation or waiting failed. The parameter contains the error.
    #[error("the command cannot run: {0}")]
    CommandFailure(#[from] std::io::Error),
    /// The command returned a non-zero exit code. The parameters are the exit code and the error output.
    #[error("the command returned non-zero exit code {0} with message: {1}")]
    NonZeroExitcode(i32, String),
    /// The command was still running after the time limit, so it was killed.
    #[error("the command did not finish in {0:?}")]
    Timeout(Duration),
    /// The command output contains non-UTF8 characters.
    #[error("the command returned invalid characters")]
    NonUtf8Return,
}

impl CommandOutput {
    fn from_output(output: &Output) -> Result<Self, CommandError> {
        let stdout =
            String::from_utf8(output.stdout.clone()).map_err(|_| CommandError::NonUtf8Return)?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout,
            stderr,
        })
    }

    /// Returns the standard output if the command succeeded.
    pub fn into_stdout(self) -> Result<String, CommandError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(CommandError::NonZeroExitcode(
                self.code.unwrap_or(-1),
                self.stderr.trim_end().to_string(),
            ))
        }
    }
}

/// Something that can execute external programs.
///
/// The real implementation is [DuctRunner], the checks are tested with the generated `MockRunner`.
#[automock]
pub trait Runner: Send + Sync {
    /// Run the program to completion and capture its output, even if it fails.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;
}

/// Run the program and return its standard output only if it exited with zero.
///
/// Every other outcome (spawn failure, non-zero exit, timeout) is logged and becomes `None`.
pub fn read(runner: &dyn Runner, invocation: &Invocation) -> Option<String> {
    match runner.run(invocation).and_then(CommandOutput::into_stdout) {
        Ok(stdout) => Some(stdout),
        Err(err) => {
            debug!("Command {} failed: {err}.", invocation.command_line());
            None
        }
    }
}

/// Runs commands with [duct], in the C locale and without standard input.
pub struct DuctRunner {
    timeout: Duration,
}

impl DuctRunner {
    pub fn new(timeout: Duration) -> Self {
        DuctRunner { timeout }
    }
}

impl Default for DuctRunner {
    fn default() -> Self {
        DuctRunner::new(DEFAULT_TIMEOUT)
    }
}

impl Runner for DuctRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        trace!("Running {}.", invocation.command_line());

        let mut expression = cmd(invocation.program.as_str(), invocation.args.iter())
            .env("LC_ALL", "C")
            .env("LANG", "C");
        for (name, value) in NON_INTERACTIVE_ENV {
            expression = expression.env(name, value);
        }
        let mut expression = expression
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        if let Some(dir) = &invocation.dir {
            expression = expression.dir(dir);
        }

        let handle = expression.start()?;
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(output) = handle.try_wait()? {
                let output = CommandOutput::from_output(output)?;
                trace!(
                    "Command {} exited with {:?}.",
                    invocation.command_line(),
                    output.code
                );
                output.stdout.lines().for_each(|line| trace!("{line}"));
                return Ok(output);
            }
            if Instant::now() >= deadline {
                handle.kill()?;
                return Err(CommandError::Timeout(self.timeout));
            }
            sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn it_should_render_the_command_line() {
        let invocation = Invocation::new("git", ["ls-remote", "refs/tags/v1.*", "my repo"]);

        assert_eq!("git ls-remote 'refs/tags/v1.*' 'my repo'", invocation.command_line());
    }

    #[test]
    fn it_should_capture_stdout() -> Result<(), Box<dyn Error>> {
        let runner = DuctRunner::default();

        let output = runner.run(&Invocation::new("echo", ["test"]))?;
        assert!(output.success);
        assert_eq!("test\n", output.stdout);

        Ok(())
    }

    #[test]
    fn it_should_not_fail_on_non_zero_exit() -> Result<(), Box<dyn Error>> {
        let runner = DuctRunner::default();

        let output = runner.run(&Invocation::new("sh", ["-c", "echo oops >&2; exit 3"]))?;
        assert!(!output.success);
        assert_eq!(Some(3), output.code);
        assert_eq!("oops\n", output.stderr);

        Ok(())
    }

    #[test]
    fn it_should_run_in_the_c_locale() -> Result<(), Box<dyn Error>> {
        let runner = DuctRunner::default();

        let output = runner.run(&Invocation::new("sh", ["-c", "echo $LC_ALL"]))?;
        assert_eq!("C\n", output.stdout);

        Ok(())
    }

    #[test]
    fn it_should_never_prompt_for_credentials() -> Result<(), Box<dyn Error>> {
        let runner = DuctRunner::default();

        let output = runner.run(&Invocation::new(
            "sh",
            ["-c", "echo \"$GIT_TERMINAL_PROMPT|$GIT_ASKPASS|$GIT_SSH_COMMAND\""],
        ))?;
        assert_eq!("0|echo|ssh -o BatchMode=yes\n", output.stdout);

        Ok(())
    }

    #[test]
    fn it_should_run_in_the_given_directory() -> Result<(), Box<dyn Error>> {
        let runner = DuctRunner::default();
        let dir = tempfile::tempdir()?;

        let output = runner.run(&Invocation::new("pwd", Vec::<String>::new()).dir(dir.path()))?;
        assert_eq!(
            std::fs::canonicalize(dir.path())?,
            std::fs::canonicalize(output.stdout.trim_end())?
        );

        Ok(())
    }

    #[test]
    fn it_should_kill_commands_after_the_timeout() {
        let runner = DuctRunner::new(Duration::from_millis(100));

        let error = runner.run(&Invocation::new("sleep", ["5"])).err().unwrap();

        assert!(
            matches!(error, CommandError::Timeout(_)),
            "{error:?} should be Timeout"
        );
    }

    #[test]
    fn it_should_read_only_successful_output() {
        let runner = DuctRunner::default();

        assert_eq!(
            Some(String::from("test\n")),
            read(&runner, &Invocation::new("echo", ["test"]))
        );
        assert_eq!(None, read(&runner, &Invocation::new("false", Vec::<String>::new())));
        assert_eq!(
            None,
            read(&runner, &Invocation::new("/path/to/nowhere", Vec::<String>::new()))
        );
    }
}
