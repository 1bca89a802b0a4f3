use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt::Write;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::Context;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::core::effects::{Effects, OperationType};
use crate::git::repo::Repo;
use crate::util::{ExitCode, EyreExitOr};

/// Path to the `git` executable on disk to be executed.
#[derive(Clone)]
pub struct GitRunInfo {
    /// The path to the Git executable on disk.
    pub path_to_git: PathBuf,

    /// The working directory that the Git executable should be run in.
    pub working_directory: PathBuf,

    /// The environment variables that should be passed to the Git process.
    pub env: HashMap<OsString, OsString>,
}

impl std::fmt::Debug for GitRunInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<GitRunInfo path_to_git={:?} working_directory={:?} env=not shown>",
            self.path_to_git, self.working_directory
        )
    }
}

/// The result of invoking Git.
#[must_use]
pub struct GitRunResult {
    /// The exit code of the process.
    pub exit_code: ExitCode,

    /// The stdout contents written by the invocation.
    pub stdout: Vec<u8>,

    /// The stderr contents written by the invocation.
    pub stderr: Vec<u8>,
}

impl std::fmt::Debug for GitRunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<GitRunResult exit_code={:?} stdout={:?} stderr={:?}>",
            self.exit_code,
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
        )
    }
}

/// Copy each line read from `stream` to `output` on a separate thread, until
/// the stream is closed.
fn relay_lines(
    stream: Option<impl Read + Send + 'static>,
    mut output: impl Write + Send + 'static,
) -> JoinHandle<eyre::Result<()>> {
    thread::spawn(move || {
        let stream = match stream {
            Some(stream) => stream,
            None => return Ok(()),
        };
        for line in BufReader::new(stream).lines() {
            let line = line.wrap_err("Reading line from Git subprocess")?;
            writeln!(output, "{line}").wrap_err("Relaying line from Git subprocess")?;
        }
        Ok(())
    })
}

impl GitRunInfo {
    /// Build the information needed to run the Git executable at
    /// `path_to_git` from the current directory, inheriting this process's
    /// environment.
    pub fn from_current_env(path_to_git: PathBuf) -> eyre::Result<Self> {
        let working_directory =
            std::env::current_dir().wrap_err("Getting working directory")?;
        Ok(GitRunInfo {
            path_to_git,
            working_directory,
            env: std::env::vars_os().collect(),
        })
    }

    /// Run Git in a subprocess and relay its output to the user, line by line,
    /// as it is produced. The command line is announced first.
    ///
    /// This is for the steps of a shelf which change the repository or talk to
    /// a remote (`add`, `commit`, `fetch`, `push`), so that the user sees
    /// exactly what Git reports. Hooks and credential helpers run as they
    /// normally would, except that stdin is closed.
    ///
    /// Returns the exit code of Git as an `Err` if it was non-zero.
    #[instrument]
    #[must_use = "The return code for `GitRunInfo::run` must be checked"]
    pub fn run<S: AsRef<OsStr> + std::fmt::Debug>(
        &self,
        effects: &Effects,
        args: &[S],
    ) -> EyreExitOr<()> {
        let args_string = args
            .iter()
            .map(|arg| arg.as_ref().to_string_lossy())
            .join(" ");
        let (effects, _progress) = effects.start_operation(OperationType::RunGitCommand(
            Arc::new(format!("git {args_string}")),
        ));
        writeln!(
            effects.get_output_stream(),
            "shelf: running command: {} {args_string}",
            self.path_to_git.to_string_lossy(),
        )?;

        let mut child = Command::new(&self.path_to_git)
            .args(args)
            .current_dir(&self.working_directory)
            .env_clear()
            .envs(self.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err_with(|| format!("Spawning Git subprocess with args {args:?}"))?;

        let stdout_relay = relay_lines(child.stdout.take(), effects.get_output_stream());
        let stderr_relay = relay_lines(child.stderr.take(), effects.get_error_stream());
        let exit_status = child
            .wait()
            .wrap_err("Waiting for Git subprocess to complete")?;
        for relay in [stdout_relay, stderr_relay] {
            match relay.join() {
                Ok(result) => result?,
                Err(_) => eyre::bail!("Thread relaying subprocess output panicked"),
            }
        }

        let exit_code = ExitCode::try_from(exit_status)?;
        Ok(if exit_code.is_success() {
            Ok(())
        } else {
            Err(exit_code)
        })
    }

    /// Returns the working directory for commands run on a given `Repo`: the
    /// working copy if there is one, and the `.git` directory otherwise.
    fn working_directory<'a>(&'a self, repo: &'a Repo) -> &'a Path {
        repo.get_working_copy_path()
            .unwrap_or_else(|| repo.get_path())
    }

    /// Run Git silently, capturing its output instead of showing it to the
    /// user. A non-zero exit code is reported in the result rather than as an
    /// error, so the caller decides what a failure means.
    ///
    /// Whenever possible, use `git2`'s bindings to Git instead, as they're
    /// considerably more lightweight and reliable.
    #[instrument]
    pub fn run_silent<S: AsRef<OsStr> + std::fmt::Debug>(
        &self,
        repo: &Repo,
        args: &[S],
    ) -> eyre::Result<GitRunResult> {
        let GitRunInfo {
            path_to_git,
            working_directory,
            env,
        } = self;

        let output = Command::new(path_to_git)
            .arg("-C")
            .arg(self.working_directory(repo))
            .args(args)
            .current_dir(working_directory)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .output()
            .wrap_err_with(|| format!("Running Git subprocess with args {args:?}"))?;

        let result = GitRunResult {
            exit_code: ExitCode::try_from(output.status)?,
            stdout: output.stdout,
            stderr: output.stderr,
        };
        if !result.exit_code.is_success() {
            debug!(?result, "Git subprocess failed");
        }
        Ok(result)
    }
}
