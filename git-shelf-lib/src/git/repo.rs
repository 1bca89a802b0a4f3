//! Operations on the Git repository. This module exists for a few reasons:
//!
//! - To ensure that every call to a Git operation has an associated error
//!   variant, so that failures can be reported with context.
//! - To improve the interface in some cases. In particular, some operations in
//!   `git2` return an `Error` with code `ENOTFOUND`, but we should really return
//!   an `Option` in those cases.
//! - To make it possible to audit all the Git operations carried out in the
//!   codebase.

use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::core::shelf::ShelfRef;
use crate::git::config::{Config, ConfigRead};
use crate::git::reference::{ReferenceName, RemoteBranch};

/// Environment variable listing directories at which repository discovery
/// should stop, as understood by Git itself.
pub const GIT_CEILING_DIRECTORIES: &str = "GIT_CEILING_DIRECTORIES";

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a Git repository (or any of the parent directories): {path:?}")]
    NotARepository { path: PathBuf },

    #[error("repository at {path:?} is owned by someone else: {source}")]
    UnsafeRepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("could not open repository: {0}")]
    OpenRepo(#[source] git2::Error),

    #[error("could not read config: {0}")]
    ReadConfig(#[source] git2::Error),

    #[error("could not open repository-local config: {0}")]
    OpenLocalConfig(#[source] git2::Error),

    #[error("could not resolve HEAD: {0}")]
    ResolveHead(#[source] git2::Error),

    #[error("HEAD is a symbolic reference to something other than a branch: {target:?}")]
    UnsupportedHead { target: Option<String> },

    #[error("could not calculate short ID for commit: {0}")]
    ShortId(#[source] git2::Error),

    #[error("could not get remote names: {0}")]
    GetRemoteNames(#[source] git2::Error),

    #[error("could not get references: {0}")]
    GetReferences(#[source] git2::Error),

    #[error("could not read reference: {0}")]
    ReadReference(#[source] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Distinguish the ways in which opening a repository can fail. Not finding a
/// repository at all, and finding one which `safe.directory` forbids us from
/// using, both mean that there is no repository to work on.
fn classify_open_error(path: &Path, err: git2::Error) -> Error {
    match err.code() {
        git2::ErrorCode::NotFound => Error::NotARepository {
            path: path.to_owned(),
        },
        git2::ErrorCode::Owner => Error::UnsafeRepository {
            path: path.to_owned(),
            source: err,
        },
        _ => Error::OpenRepo(err),
    }
}

/// Wrapper around `git2::Repository`.
pub struct Repo {
    inner: git2::Repository,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Git repository at: {:?}>", self.get_path())
    }
}

impl Repo {
    /// Get the Git repository associated with the given directory, searching
    /// upwards through its parents. Discovery stops at any directory listed in
    /// `GIT_CEILING_DIRECTORIES`.
    #[instrument]
    pub fn from_dir(path: &Path) -> Result<Self> {
        let ceiling_dirs: Vec<PathBuf> = match std::env::var_os(GIT_CEILING_DIRECTORIES) {
            Some(dirs) => std::env::split_paths(&dirs)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect(),
            None => Vec::new(),
        };
        match git2::Repository::open_ext(path, git2::RepositoryOpenFlags::empty(), &ceiling_dirs)
        {
            Ok(repo) => Ok(Repo { inner: repo }),
            Err(err) => Err(classify_open_error(path, err)),
        }
    }

    /// Get the Git repository associated with the current directory.
    #[instrument]
    pub fn from_current_dir() -> Result<Self> {
        let path = std::env::current_dir().map_err(Error::Io)?;
        Repo::from_dir(&path)
    }

    /// Get the path to the `.git` directory for the repository.
    pub fn get_path(&self) -> &Path {
        self.inner.path()
    }

    /// Get the path to the working copy for this repository. If the repository
    /// is bare (has no working copy), returns `None`.
    pub fn get_working_copy_path(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    /// Get the configuration object for the repository, merged across all
    /// levels (system, global, local and so on).
    #[instrument]
    pub fn get_readonly_config(&self) -> Result<impl ConfigRead> {
        let config = self.inner.config().map_err(Error::ReadConfig)?;
        Ok(Config::from(config))
    }

    /// Get the configuration stored in this repository's own `config` file.
    /// Values set in the user's global config are not visible here, and writes
    /// only affect this repository.
    #[instrument]
    pub fn get_local_config(&self) -> Result<Config> {
        let config = self
            .inner
            .config()
            .map_err(Error::ReadConfig)?
            .open_level(git2::ConfigLevel::Local)
            .map_err(Error::OpenLocalConfig)?;
        Ok(Config::from(config))
    }

    /// Determine the ref that is currently checked out: the short name of the
    /// branch `HEAD` points to, or the abbreviated hash of the commit when
    /// `HEAD` is detached.
    ///
    /// An unborn branch (one without any commits yet) is still reported by
    /// name.
    #[instrument]
    pub fn get_shelf_ref(&self) -> Result<ShelfRef> {
        let head = match self.inner.head() {
            Ok(head) => head,
            Err(err) if err.code() == git2::ErrorCode::UnbornBranch => {
                let head = self
                    .inner
                    .find_reference("HEAD")
                    .map_err(Error::ResolveHead)?;
                let target = head.symbolic_target().map(ToOwned::to_owned);
                return match target
                    .as_deref()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                {
                    Some(branch_name) => Ok(ShelfRef::Branch(branch_name.to_owned())),
                    None => Err(Error::UnsupportedHead { target }),
                };
            }
            Err(err) => return Err(Error::ResolveHead(err)),
        };

        if head.is_branch() {
            if let Some(branch_name) = head
                .name()
                .and_then(|name| name.strip_prefix("refs/heads/"))
            {
                return Ok(ShelfRef::Branch(branch_name.to_owned()));
            }
        }

        let commit = head.peel_to_commit().map_err(Error::ResolveHead)?;
        let short_id = commit.as_object().short_id().map_err(Error::ShortId)?;
        match short_id.as_str() {
            Some(short_id) => Ok(ShelfRef::Detached(short_id.to_owned())),
            None => Ok(ShelfRef::Detached(commit.id().to_string())),
        }
    }

    /// Get a list of all remote names, in sorted order.
    #[instrument]
    pub fn get_all_remote_names(&self) -> Result<Vec<String>> {
        let remotes = self.inner.remotes().map_err(Error::GetRemoteNames)?;
        Ok(remotes
            .into_iter()
            .enumerate()
            .filter_map(|(i, remote_name)| match remote_name {
                Some(remote_name) => Some(remote_name.to_owned()),
                None => {
                    warn!(remote_index = i, "Remote name could not be decoded");
                    None
                }
            })
            .sorted()
            .collect())
    }

    /// Get all branches known through remote-tracking references. This
    /// reflects the state of the remotes as of the last fetch or push.
    #[instrument]
    pub fn get_remote_branches(&self) -> Result<Vec<RemoteBranch>> {
        let remote_names = self.get_all_remote_names()?;
        let glob = format!("{}*", RemoteBranch::PREFIX);
        let mut remote_branches = Vec::new();
        for reference in self
            .inner
            .references_glob(&glob)
            .map_err(Error::GetReferences)?
        {
            let reference = reference.map_err(Error::ReadReference)?;
            let reference_name = match reference.name() {
                Some(name) => ReferenceName::from(name),
                None => {
                    warn!(
                        name = ?String::from_utf8_lossy(reference.name_bytes()),
                        "Reference name could not be decoded"
                    );
                    continue;
                }
            };
            if let Some(remote_branch) = RemoteBranch::parse(&reference_name, &remote_names) {
                remote_branches.push(remote_branch);
            }
        }
        remote_branches.sort();
        Ok(remote_branches)
    }
}
