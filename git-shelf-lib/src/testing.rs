//! Testing utilities.
//!
//! This is inside `src` rather than `tests` since we use this code in the
//! integration tests of several crates.

use std::ffi::OsString;
use std::ops::Deref;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::core::config::env_vars::{get_git_exec_path, get_path_to_git, TEST_GIT};
use crate::git::{GitRunInfo, Repo, GIT_CEILING_DIRECTORIES};

use eyre::Context;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use tempfile::TempDir;
use tracing::instrument;

const DUMMY_NAME: &str = "Testy McTestface";
const DUMMY_EMAIL: &str = "test@example.com";
const DUMMY_DATE: &str = "Wed 29 Oct 12:34:56 2020 PDT";

/// Wrapper around the Git executable, for testing.
#[derive(Clone, Debug)]
pub struct Git {
    /// The path to the repository on disk. The directory itself must exist,
    /// although it might not have a `.git` folder in it. (Use `Git::init_repo`
    /// to initialize it.)
    pub repo_path: PathBuf,

    /// The path to the Git executable on disk.
    pub path_to_git: PathBuf,

    /// The `GIT_EXEC_PATH` environment variable value to use for testing.
    pub git_exec_path: PathBuf,

    /// The directory used as `HOME` (and as the ceiling for repository
    /// discovery), so that the user's own configuration never leaks into
    /// tests.
    pub home_path: PathBuf,
}

/// Options for `Git::init_repo_with_options`.
#[derive(Debug)]
pub struct GitInitOptions {
    /// If `true`, then `init_repo_with_options` makes an initial commit with
    /// some content.
    pub make_initial_commit: bool,
}

impl Default for GitInitOptions {
    fn default() -> Self {
        GitInitOptions {
            make_initial_commit: true,
        }
    }
}

/// Options for `Git::run_with_options`.
#[derive(Debug, Default)]
pub struct GitRunOptions {
    /// The timestamp of the command. Mostly useful for `git commit`. This should
    /// be a number like 0, 1, 2, 3...
    pub time: isize,

    /// The exit code that `Git` should return.
    pub expected_exit_code: i32,
}

impl Git {
    /// Constructor.
    pub fn new(
        path_to_git: PathBuf,
        repo_path: PathBuf,
        git_exec_path: PathBuf,
        home_path: PathBuf,
    ) -> Self {
        Git {
            repo_path,
            path_to_git,
            git_exec_path,
            home_path,
        }
    }

    /// Replace the paths which vary between test runs with placeholders:
    /// `<git-executable>`, `<repo-path>` for this repository, and
    /// `<temp-dir>` for the directory holding it and any remotes.
    pub fn preprocess_output(&self, output: String) -> eyre::Result<String> {
        let path_to_git = self
            .path_to_git
            .to_str()
            .ok_or_else(|| eyre::eyre!("Could not convert path to Git to string"))?;
        let output = output.replace(path_to_git, "<git-executable>");

        // NB: tests which run on Windows are unlikely to succeed due to this
        // `canonicalize` call.
        let repo_path = std::fs::canonicalize(&self.repo_path)?;
        let repo_path = repo_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Could not convert repo path to string"))?;
        let output = output.replace(repo_path, "<repo-path>");

        // Remote URLs are built from the uncanonicalized path (see `get_url`).
        let home_path = self
            .home_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Could not convert temporary directory to string"))?;
        Ok(output.replace(home_path, "<temp-dir>"))
    }

    /// Get the `PATH` environment variable to use for testing.
    pub fn get_path_for_env(&self) -> eyre::Result<OsString> {
        let cargo_bin_path = assert_cmd::cargo::cargo_bin("git-shelf");
        let shelf_path = cargo_bin_path
            .parent()
            .ok_or_else(|| eyre::eyre!("Unable to find git-shelf path parent"))?;
        let path = std::env::join_paths([
            // For Git to be able to launch `git-shelf`.
            shelf_path.as_os_str(),
            // For `git-shelf` to be able to call back into `git`.
            self.git_exec_path.as_os_str(),
        ])
        .wrap_err("Joining paths")?;
        Ok(path)
    }

    /// Get the environment variables needed to run git in the test environment.
    pub fn get_base_env(&self, time: isize) -> eyre::Result<Vec<(OsString, OsString)>> {
        // Required for determinism, as these values will be baked into the commit
        // hash.
        let date: OsString = format!("{DUMMY_DATE} -{time:0>2}").into();

        // Fake "editor" which accepts the default contents of any commit
        // messages.
        //
        // ":" is understood by `git` to skip editing.
        let git_editor = OsString::from(":");

        let new_path = self.get_path_for_env()?;
        let envs = vec![
            ("GIT_CONFIG_NOSYSTEM", OsString::from("1")),
            ("GIT_AUTHOR_DATE", date.clone()),
            ("GIT_COMMITTER_DATE", date),
            ("GIT_EDITOR", git_editor),
            ("GIT_EXEC_PATH", self.git_exec_path.as_os_str().into()),
            ("GIT_TERMINAL_PROMPT", OsString::from("0")),
            (GIT_CEILING_DIRECTORIES, self.home_path.as_os_str().into()),
            ("HOME", self.home_path.as_os_str().into()),
            ("XDG_CONFIG_HOME", self.home_path.join(".config").into()),
            ("PATH", new_path),
            (TEST_GIT, self.path_to_git.as_os_str().into()),
        ];

        Ok(envs
            .into_iter()
            .map(|(key, value)| (OsString::from(key), value))
            .collect())
    }

    #[instrument]
    fn run_with_options_inner(
        &self,
        args: &[&str],
        options: &GitRunOptions,
    ) -> eyre::Result<(String, String)> {
        let GitRunOptions {
            time,
            expected_exit_code,
        } = options;

        let output = Command::new(&self.path_to_git)
            .current_dir(&self.repo_path)
            .args(args)
            .env_clear()
            .envs(self.get_base_env(*time)?)
            .stdin(Stdio::null())
            .output()
            .wrap_err_with(|| format!("Running {:?} with args {args:?}", self.path_to_git))?;

        let stdout = String::from_utf8(output.stdout)?;
        let stderr = String::from_utf8(output.stderr)?;
        let exit_code = output
            .status
            .code()
            .ok_or_else(|| eyre::eyre!("Git process was terminated by a signal: {args:?}"))?;
        if exit_code != *expected_exit_code {
            eyre::bail!(
                "git {args:?} exited with code {exit_code} (expected {expected_exit_code})
stdout:
{stdout}
stderr:
{stderr}"
            );
        }
        Ok((self.preprocess_output(stdout)?, self.preprocess_output(stderr)?))
    }

    /// Run a Git command.
    pub fn run_with_options<S: AsRef<str> + std::fmt::Debug>(
        &self,
        args: &[S],
        options: &GitRunOptions,
    ) -> eyre::Result<(String, String)> {
        self.run_with_options_inner(
            args.iter().map(|arg| arg.as_ref()).collect_vec().as_slice(),
            options,
        )
    }

    /// Run a Git command.
    pub fn run<S: AsRef<str> + std::fmt::Debug>(
        &self,
        args: &[S],
    ) -> eyre::Result<(String, String)> {
        if let Some(first_arg) = args.first() {
            if first_arg.as_ref() == "shelf" {
                eyre::bail!(
                    r#"Refusing to invoke `shelf` via `git.run(&["shelf", ...])`; instead, call `git.shelf(&[...])`"#
                );
            }
        }

        self.run_with_options(args, &Default::default())
    }

    /// Convenience method to call `shelf_with_options` with the default
    /// options.
    #[instrument]
    pub fn shelf(&self, args: &[&str]) -> eyre::Result<(String, String)> {
        self.shelf_with_options(args, &Default::default())
    }

    /// Run `git shelf` with the provided `GitRunOptions`. The `git-shelf`
    /// binary is located through the `PATH` set up by `get_path_for_env`.
    #[instrument]
    pub fn shelf_with_options(
        &self,
        args: &[&str],
        options: &GitRunOptions,
    ) -> eyre::Result<(String, String)> {
        let git_run_args = std::iter::once("shelf")
            .chain(args.iter().copied())
            .collect_vec();
        self.run_with_options(&git_run_args, options)
    }

    /// Set up a Git repo in the directory with a test identity.
    #[instrument]
    pub fn init_repo_with_options(&self, options: &GitInitOptions) -> eyre::Result<()> {
        std::fs::create_dir_all(&self.repo_path)?;
        self.run(&["init", "--initial-branch", "master"])?;
        self.run(&["config", "user.name", DUMMY_NAME])?;
        self.run(&["config", "user.email", DUMMY_EMAIL])?;

        // Disable warnings of the following form on Windows:
        //
        // ```
        // warning: LF will be replaced by CRLF in initial.txt.
        // The file will have its original line endings in your working directory
        // ```
        self.run(&["config", "core.autocrlf", "false"])?;

        if options.make_initial_commit {
            self.commit_file("initial", 0)?;
        }

        Ok(())
    }

    /// Set up a Git repo in the directory with a test identity and an initial
    /// commit.
    pub fn init_repo(&self) -> eyre::Result<()> {
        self.init_repo_with_options(&Default::default())
    }

    /// Set up a bare repository in the directory, suitable for use as a
    /// remote.
    #[instrument]
    pub fn init_bare_repo(&self) -> eyre::Result<()> {
        std::fs::create_dir_all(&self.repo_path)?;
        self.run(&["init", "--bare", "--initial-branch", "master"])?;
        Ok(())
    }

    /// The URL by which this repository can be cloned or added as a remote.
    pub fn get_url(&self) -> eyre::Result<String> {
        let repo_path = self
            .repo_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Could not convert repo path to string"))?;
        Ok(format!("file://{repo_path}"))
    }

    /// Clone this repository into the `target` repository (which must not have
    /// been initialized). The identity used by tests is configured in the
    /// clone.
    pub fn clone_repo_into(&self, target: &Git, additional_args: &[&str]) -> eyre::Result<()> {
        let remote = self.get_url()?;
        let target_path = target
            .repo_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Could not convert target path to string"))?;
        let args = {
            let mut args = vec![
                "clone",
                // For Windows in CI.
                "-c",
                "core.autocrlf=false",
                &remote,
                target_path,
            ];
            args.extend(additional_args.iter());
            args
        };

        let (_stdout, _stderr) = self.run(args.as_slice())?;
        target.run(&["config", "user.name", DUMMY_NAME])?;
        target.run(&["config", "user.email", DUMMY_EMAIL])?;
        Ok(())
    }

    /// Write `contents` to `<name>.txt` in the working copy, creating or
    /// replacing it.
    pub fn write_file_txt(&self, name: &str, contents: &str) -> eyre::Result<()> {
        let path = self.repo_path.join(format!("{name}.txt"));
        std::fs::write(&path, contents).wrap_err_with(|| format!("Writing {path:?}"))?;
        Ok(())
    }

    /// Commit a file named `<name>.txt` containing `<name> contents`. The
    /// `time` argument is used to set the commit timestamp, which is factored
    /// into the commit hash.
    #[instrument]
    pub fn commit_file(&self, name: &str, time: isize) -> eyre::Result<()> {
        self.write_file_txt(name, &format!("{name} contents\n"))?;
        self.run(&["add", "."])?;
        self.run_with_options(
            &["commit", "-m", &format!("create {name}.txt")],
            &GitRunOptions {
                time,
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Detach HEAD, so that no branch is checked out.
    #[instrument]
    pub fn detach_head(&self) -> eyre::Result<()> {
        self.run(&["checkout", "--detach"])?;
        Ok(())
    }

    /// Get a `Repo` object for this repository.
    #[instrument]
    pub fn get_repo(&self) -> eyre::Result<Repo> {
        let repo = Repo::from_dir(&self.repo_path)?;
        Ok(repo)
    }

    /// Get the `GitRunInfo` to use for this repository.
    #[instrument]
    pub fn get_git_run_info(&self) -> eyre::Result<GitRunInfo> {
        Ok(GitRunInfo {
            path_to_git: self.path_to_git.clone(),
            working_directory: self.repo_path.clone(),
            env: self.get_base_env(0)?.into_iter().collect(),
        })
    }

    /// List the branches of this repository, as `<branch> <commit message>`
    /// lines. Useful for inspecting the state of a remote.
    #[instrument]
    pub fn list_branches(&self) -> eyre::Result<String> {
        let (stdout, _stderr) = self.run(&[
            "for-each-ref",
            "--format=%(refname:short) %(subject)",
            "refs/heads/",
        ])?;
        Ok(stdout)
    }

    /// Count the commits reachable from the given revision.
    #[instrument]
    pub fn count_commits(&self, revision: &str) -> eyre::Result<usize> {
        let (stdout, _stderr) = self.run(&["rev-list", "--count", revision])?;
        let count = stdout
            .trim()
            .parse()
            .wrap_err_with(|| format!("Parsing commit count: {stdout:?}"))?;
        Ok(count)
    }
}

/// Wrapper around a `Git` instance which cleans up the repository once dropped.
pub struct GitWrapper {
    _temp_dir: TempDir,
    git: Git,
}

impl Deref for GitWrapper {
    type Target = Git;

    fn deref(&self) -> &Self::Target {
        &self.git
    }
}

static COLOR_EYRE_INSTALL: OnceCell<()> = OnceCell::new();

/// Create a temporary directory for testing and a `Git` instance to use with it.
pub fn make_git() -> eyre::Result<GitWrapper> {
    COLOR_EYRE_INSTALL.get_or_try_init(color_eyre::install)?;

    let temp_dir = tempfile::tempdir()?;
    let home_path = temp_dir.path().to_path_buf();
    let repo_path = home_path.join("repo");
    std::fs::create_dir_all(&repo_path)?;
    let path_to_git = get_path_to_git()?;
    let git_exec_path = get_git_exec_path()?;
    let git = Git::new(path_to_git, repo_path, git_exec_path, home_path);
    Ok(GitWrapper {
        _temp_dir: temp_dir,
        git,
    })
}

/// Represents a pair of directories that will be cleaned up after this value
/// dropped. The two directories need to be `init`ed and `clone`ed by the
/// caller, respectively.
pub struct GitWrapperWithRemoteRepo {
    /// Guard to clean up the containing temporary directory. Make sure to bind
    /// this to a local variable not named `_`.
    pub temp_dir: TempDir,

    /// The wrapper around the original repository.
    pub original_repo: Git,

    /// The wrapper around the cloned repository.
    pub cloned_repo: Git,
}

impl GitWrapperWithRemoteRepo {
    /// Make a `Git` instance for another repository inside the same temporary
    /// directory, such as an additional remote. The directory is not
    /// initialized.
    pub fn make_sibling_repo(&self, name: &str) -> Git {
        Git {
            repo_path: self.temp_dir.path().join(name),
            ..self.original_repo.clone()
        }
    }
}

/// Create a [`GitWrapperWithRemoteRepo`].
pub fn make_git_with_remote_repo() -> eyre::Result<GitWrapperWithRemoteRepo> {
    COLOR_EYRE_INSTALL.get_or_try_init(color_eyre::install)?;

    let path_to_git = get_path_to_git()?;
    let git_exec_path = get_git_exec_path()?;
    let temp_dir = tempfile::tempdir()?;
    let home_path = temp_dir.path().to_path_buf();
    let original_repo_path = temp_dir.path().join("original");
    std::fs::create_dir_all(&original_repo_path)?;
    let original_repo = Git::new(
        path_to_git.clone(),
        original_repo_path,
        git_exec_path.clone(),
        home_path.clone(),
    );
    let cloned_repo_path = temp_dir.path().join("cloned");
    let cloned_repo = Git::new(path_to_git, cloned_repo_path, git_exec_path, home_path);

    Ok(GitWrapperWithRemoteRepo {
        temp_dir,
        original_repo,
        cloned_repo,
    })
}
