//! Running external programs.
//!
//! Everything `mcfg` learns about a build comes from running other tools: the build
//! front-end to describe the environment, and the compilers to describe themselves. All of
//! that goes through a [`ProcessRunner`] so the rest of the system can be exercised without
//! a real toolchain.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;

use futures::future::BoxFuture;
use futures::FutureExt;
use mcfg_types::FilePath;
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(any(test, feature = "testing"))]
mod scripted;

#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedRunner;

/// Errors from running a process.
///
/// A process that runs and exits with a non-zero status is _not_ an error, see
/// [`ProcessOutput::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("invocation has no program to run")]
    EmptyCommand,
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to collect output of '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A program to run, its arguments, and where to run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The program followed by its arguments.
    pub command: Vec<String>,
    /// Working directory, inherited from us when `None`.
    pub cwd: Option<FilePath>,
    /// Extra environment variables layered on top of our own environment.
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(command: Vec<String>) -> Self {
        Invocation {
            command,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: FilePath) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// The program being run, if any.
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command.join(" "))
    }
}

/// What a finished process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code of the process, `-1` if it was killed by a signal.
    pub exit_code: i32,
    /// Lines written to stdout.
    pub stdout: Vec<String>,
    /// Lines written to stdout and stderr, in the order we received them.
    pub output: Vec<String>,
}

impl ProcessOutput {
    /// Output of a process that wrote all of `stdout` before any of `stderr`.
    pub fn new<S: Into<String>>(
        exit_code: i32,
        stdout: impl IntoIterator<Item = S>,
        stderr: impl IntoIterator<Item = S>,
    ) -> Self {
        let stdout: Vec<String> = stdout.into_iter().map(Into::into).collect();
        let output = stdout
            .iter()
            .cloned()
            .chain(stderr.into_iter().map(Into::into))
            .collect();
        ProcessOutput {
            exit_code,
            stdout,
            output,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can run an [`Invocation`].
pub trait ProcessRunner: fmt::Debug + Send + Sync {
    fn run(&self, invocation: Invocation) -> BoxFuture<'static, Result<ProcessOutput, ProcessError>>;
}

/// A [`ProcessRunner`] that spawns real processes on the tokio runtime.
///
/// The child is killed if the returned future is dropped before it completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

impl ProcessRunner for TokioRunner {
    fn run(&self, invocation: Invocation) -> BoxFuture<'static, Result<ProcessOutput, ProcessError>> {
        run_tokio(invocation).boxed()
    }
}

async fn run_tokio(invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
    let Some((program, args)) = invocation.command.split_first() else {
        return Err(ProcessError::EmptyCommand);
    };
    tracing::debug!(%invocation, cwd = ?invocation.cwd, "running process");

    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .envs(&invocation.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &invocation.cwd {
        command.current_dir(cwd.as_path());
    }

    let mut child = command.spawn().map_err(|source| ProcessError::Launch {
        program: program.clone(),
        source,
    })?;
    let io_err = |source| ProcessError::Io {
        program: program.clone(),
        source,
    };

    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");
    let mut stdout_lines = BufReader::new(stdout).split(b'\n');
    let mut stderr_lines = BufReader::new(stderr).split(b'\n');

    let mut output = ProcessOutput::default();
    let (mut stdout_open, mut stderr_open) = (true, true);
    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_lines.next_segment(), if stdout_open => match line.map_err(io_err)? {
                Some(line) => {
                    let line = decode_line(line);
                    output.stdout.push(line.clone());
                    output.output.push(line);
                }
                None => stdout_open = false,
            },
            line = stderr_lines.next_segment(), if stderr_open => match line.map_err(io_err)? {
                Some(line) => output.output.push(decode_line(line)),
                None => stderr_open = false,
            },
        }
    }

    let status = child.wait().await.map_err(io_err)?;
    output.exit_code = status.code().unwrap_or(-1);
    tracing::debug!(%invocation, exit_code = output.exit_code, "process exited");

    Ok(output)
}

/// Lossily decodes a line of output, dropping any trailing `\r`.
fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    match String::from_utf8(line) {
        Ok(line) => line,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let output = TokioRunner
            .run(sh("echo out; echo err 1>&2; echo more"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, vec!["out", "more"]);

        let mut combined = output.output.clone();
        combined.sort();
        assert_eq!(combined, vec!["err", "more", "out"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let output = TokioRunner
            .run(sh(r"printf '#define A 1\r\n /home/caf\351/include\n' 1>&2"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(
            output.output,
            vec!["#define A 1", " /home/caf\u{FFFD}/include"]
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let output = TokioRunner.run(sh("echo nope 1>&2; exit 3")).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(output.output, vec!["nope"]);
    }

    #[tokio::test]
    async fn cwd_and_env() {
        let invocation = sh("pwd; echo $MCFG_PROCESS_TEST")
            .with_cwd(FilePath::new("/"))
            .with_env([("MCFG_PROCESS_TEST".to_string(), "hello".to_string())].into());
        let output = TokioRunner.run(invocation).await.unwrap();
        assert_eq!(output.stdout, vec!["/", "hello"]);
    }

    #[tokio::test]
    async fn launch_failure() {
        let invocation = Invocation::new(vec!["/definitely/not/a/real/binary".to_string()]);
        let err = TokioRunner.run(invocation).await.unwrap_err();
        assert!(matches!(err, ProcessError::Launch { .. }), "{err:?}");

        let err = TokioRunner.run(Invocation::new(vec![])).await.unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }
}
