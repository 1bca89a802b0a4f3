//! Accesses repo-specific configuration.

use tracing::instrument;

use crate::core::shelf::{ShelfRef, ShelfState};
use crate::git::{ConfigRead, ConfigWrite, Repo};

/// The remote to push shelves to when none is requested on the command line.
pub const DEFAULT_REMOTE_NAME: &str = "origin";

/// The message used for shelf commits when none is configured.
pub const DEFAULT_COMMIT_MESSAGE: &str = "shelf";

/// Get the configured email address of the user, if any.
///
/// An empty value is treated the same as a missing one, since it can't be
/// used to namespace a shelf.
#[instrument]
pub fn get_user_email(repo: &Repo) -> eyre::Result<Option<String>> {
    let email: Option<String> = repo.get_readonly_config()?.get("user.email")?;
    Ok(email
        .map(|email| email.trim().to_owned())
        .filter(|email| !email.is_empty()))
}

/// Get the remote that shelves are pushed to by default.
///
/// The following config values are resolved, in order. The first valid value is returned.
/// - shelf.defaultRemote
/// - finally, default to "origin"
#[instrument]
pub fn get_default_remote_name(repo: &Repo) -> eyre::Result<String> {
    repo.get_readonly_config()?
        .get_or_else("shelf.defaultRemote", || DEFAULT_REMOTE_NAME.to_string())
}

/// Get the message to use for shelf commits.
#[instrument]
pub fn get_shelf_commit_message(repo: &Repo) -> eyre::Result<String> {
    repo.get_readonly_config()?
        .get_or_else("shelf.commitMessage", || DEFAULT_COMMIT_MESSAGE.to_string())
}

/// The config key recording whether the given ref has been shelved before.
pub fn get_shelf_marker_key(shelf_ref: &ShelfRef) -> String {
    format!("branch.{shelf_ref}.shelf")
}

/// Determine whether the given ref has been shelved before, according to the
/// repository-local marker.
#[instrument]
pub fn get_shelf_state(repo: &Repo, shelf_ref: &ShelfRef) -> eyre::Result<ShelfState> {
    let is_shelved = repo
        .get_local_config()?
        .get_or(get_shelf_marker_key(shelf_ref), false)?;
    Ok(if is_shelved {
        ShelfState::Shelved
    } else {
        ShelfState::Unshelved
    })
}

/// Record in the repository-local config that the given ref has been shelved.
#[instrument]
pub fn mark_shelved(repo: &Repo, shelf_ref: &ShelfRef) -> eyre::Result<()> {
    repo.get_local_config()?
        .set_bool(get_shelf_marker_key(shelf_ref), true)?;
    Ok(())
}

/// Environment variables which affect the functioning of `git-shelf`.
pub mod env_vars {
    use std::path::PathBuf;
    use std::process::Command;

    use eyre::Context;
    use tracing::instrument;

    use crate::util::{get_from_path, get_git_exe_name};

    /// Path to the Git executable to shell out to as a subprocess when
    /// appropriate. This may be set during tests.
    pub const TEST_GIT: &str = "TEST_GIT";

    /// "Path to wherever your core Git programs are installed". You can find
    /// the default value by running `git --exec-path`.
    ///
    /// See <https://git-scm.com/docs/git#Documentation/git.txt---exec-pathltpathgt>.
    pub const TEST_GIT_EXEC_PATH: &str = "TEST_GIT_EXEC_PATH";

    /// Locate the Git executable to run. Uses `TEST_GIT` if set, and otherwise
    /// searches `PATH`. Returns `None` if Git isn't available.
    #[instrument]
    pub fn find_path_to_git() -> Option<PathBuf> {
        match std::env::var_os(TEST_GIT) {
            Some(path_to_git) if !path_to_git.is_empty() => Some(PathBuf::from(path_to_git)),
            Some(_) | None => get_from_path(get_git_exe_name()),
        }
    }

    /// Get the path to the Git executable for testing.
    #[instrument]
    pub fn get_path_to_git() -> eyre::Result<PathBuf> {
        find_path_to_git().ok_or_else(|| {
            eyre::eyre!(
                "No path to Git executable was set, and none was found on PATH. \
Try running as: `{0}=$(which git) cargo test ...` \
or set `env.{0}` in your `config.toml` \
(see https://doc.rust-lang.org/cargo/reference/config.html)",
                TEST_GIT,
            )
        })
    }

    /// Get the `GIT_EXEC_PATH` environment variable for testing. Falls back to
    /// asking the Git executable itself.
    #[instrument]
    pub fn get_git_exec_path() -> eyre::Result<PathBuf> {
        if let Some(git_exec_path) = std::env::var_os(TEST_GIT_EXEC_PATH) {
            return Ok(PathBuf::from(git_exec_path));
        }

        let path_to_git = get_path_to_git()?;
        let output = Command::new(&path_to_git)
            .arg("--exec-path")
            .output()
            .wrap_err_with(|| format!("Running {path_to_git:?} --exec-path"))?;
        if !output.status.success() {
            eyre::bail!(
                "No Git exec path was set, and `git --exec-path` failed. \
Try running as: `{0}=$(git --exec-path) cargo test ...`",
                TEST_GIT_EXEC_PATH,
            );
        }
        let git_exec_path =
            String::from_utf8(output.stdout).wrap_err("Decoding output of `git --exec-path`")?;
        Ok(PathBuf::from(git_exec_path.trim_end()))
    }
}
